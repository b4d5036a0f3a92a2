//! Configuration management for the quiz agent.
//!
//! Configuration can be set via environment variables (a `.env` file is
//! loaded first by the binary):
//! - `LLM_API_KEY` - Required. API key for the hosted model (`GEMINI_API_KEY`
//!   and `GOOGLE_API_KEY` are accepted as fallbacks).
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible endpoint base. Defaults to Gemini's.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `gemini-2.5-flash`.
//! - `EMAIL` / `SECRET` - Required. Credentials the quiz server expects in every submission.
//! - `GROQ_API_KEY` - Optional. Needed only by the `transcribe_audio` tool.
//! - `TRANSCRIPTION_URL` / `TRANSCRIPTION_MODEL` - Optional. Speech-to-text endpoint and model.
//! - `PROJECT_ROOT` - Optional. Root for `logs/` and `data/`. Defaults to current directory.
//! - `MAX_ITERATIONS` - Optional. Hard ceiling on loop steps. Defaults to `5000`.
//! - `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_WINDOW_SECS` - Optional. Model call budget. Defaults to 9 per 60s.
//! - `CODE_TIMEOUT_SECS` - Optional. Wall-clock limit for `run_code`. Defaults to `180`.
//! - `RENDER_TIMEOUT_MS` - Optional. Page load limit for `get_rendered_html`. Defaults to `30000`.
//! - `UV_BIN`, `NODE_BIN`, `NPM_BIN`, `TESSERACT_BIN` - Optional. External program names.
//! - `PLAYWRIGHT_NODE_PATH` - Optional. `NODE_PATH` for the renderer. Defaults to `npm root -g`
//!   when Playwright is installed there.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_TRANSCRIPTION_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3-turbo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Fixed directories shared by every tool during a run.
///
/// All of them live under `project_root` so that code executed by `run_code`
/// (which runs from the project root) can use relative `data/...` paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirs {
    pub project_root: PathBuf,
    pub logs: PathBuf,
    pub data: PathBuf,
    pub downloads: PathBuf,
    pub audio: PathBuf,
    pub workspace: PathBuf,
}

impl DataDirs {
    /// Standard layout below `root`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let project_root = root.into();
        let data = project_root.join("data");
        Self {
            logs: project_root.join("logs"),
            downloads: data.join("downloads"),
            audio: data.join("audio"),
            workspace: data.join("workspace"),
            data,
            project_root,
        }
    }

    /// Create every directory that does not exist yet.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            &self.logs,
            &self.data,
            &self.downloads,
            &self.audio,
            &self.workspace,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Express `path` relative to the project root, falling back to the
    /// path itself when it lies elsewhere.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Resolve a tool-supplied path: absolute paths are kept, relative ones
    /// are taken from the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_root.join(p)
        }
    }
}

/// Token bucket parameters for model calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed per window, also the burst size.
    pub requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 9,
            window_secs: 60,
        }
    }
}

/// Settings consumed by the tool implementations.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// API key for the speech-to-text service.
    pub transcription_api_key: Option<String>,

    /// Whisper-compatible `/audio/transcriptions` endpoint.
    pub transcription_url: String,

    pub transcription_model: String,

    /// Wall-clock limit for `run_code`.
    pub code_timeout_secs: u64,

    /// Page load limit for the headless browser.
    pub render_timeout_ms: u64,

    /// Python project manager used for `run_code` and `add_dependencies`.
    pub uv_bin: String,

    /// Node.js binary that drives Playwright.
    pub node_bin: String,

    /// npm binary, asked for the global module root.
    pub npm_bin: String,

    /// Explicit `NODE_PATH` for the renderer; skips the `npm root -g` lookup.
    pub node_path: Option<String>,

    /// Tesseract OCR binary.
    pub tesseract_bin: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            transcription_api_key: None,
            transcription_url: DEFAULT_TRANSCRIPTION_URL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            code_timeout_secs: 180,
            render_timeout_ms: 30_000,
            uv_bin: "uv".to_string(),
            node_bin: "node".to_string(),
            npm_bin: "npm".to_string(),
            node_path: None,
            tesseract_bin: "tesseract".to_string(),
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the hosted model
    pub api_key: String,

    /// OpenAI-compatible base URL (without `/chat/completions`)
    pub llm_base_url: String,

    /// Model identifier
    pub default_model: String,

    /// Identifier the quiz server expects in submissions
    pub email: String,

    /// Shared secret the quiz server expects in submissions
    pub secret: String,

    /// Maximum loop steps (model calls plus tool steps)
    pub max_iterations: usize,

    /// Model call budget
    pub rate_limit: RateLimitConfig,

    /// Directory layout
    pub dirs: DataDirs,

    /// Tool-specific settings
    pub tools: ToolSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the model API key, `EMAIL` or
    /// `SECRET` is not set, and `ConfigError::InvalidValue` for unparseable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = ["LLM_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"]
            .iter()
            .find_map(|k| non_empty_var(k))
            .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;

        let llm_base_url =
            non_empty_var("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());

        let default_model =
            non_empty_var("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let email = non_empty_var("EMAIL")
            .ok_or_else(|| ConfigError::MissingEnvVar("EMAIL".to_string()))?;
        let secret = non_empty_var("SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("SECRET".to_string()))?;

        let project_root = non_empty_var("PROJECT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let max_iterations = parse_var("MAX_ITERATIONS", 5000usize)?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let rate_limit = RateLimitConfig {
            requests: parse_var("RATE_LIMIT_REQUESTS", 9u32)?,
            window_secs: parse_var("RATE_LIMIT_WINDOW_SECS", 60u64)?,
        };
        if rate_limit.requests == 0 || rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_REQUESTS/RATE_LIMIT_WINDOW_SECS".to_string(),
                "must both be positive".to_string(),
            ));
        }

        let defaults = ToolSettings::default();
        let tools = ToolSettings {
            transcription_api_key: non_empty_var("GROQ_API_KEY"),
            transcription_url: non_empty_var("TRANSCRIPTION_URL")
                .unwrap_or(defaults.transcription_url),
            transcription_model: non_empty_var("TRANSCRIPTION_MODEL")
                .unwrap_or(defaults.transcription_model),
            code_timeout_secs: parse_var("CODE_TIMEOUT_SECS", defaults.code_timeout_secs)?,
            render_timeout_ms: parse_var("RENDER_TIMEOUT_MS", defaults.render_timeout_ms)?,
            uv_bin: non_empty_var("UV_BIN").unwrap_or(defaults.uv_bin),
            node_bin: non_empty_var("NODE_BIN").unwrap_or(defaults.node_bin),
            npm_bin: non_empty_var("NPM_BIN").unwrap_or(defaults.npm_bin),
            node_path: non_empty_var("PLAYWRIGHT_NODE_PATH"),
            tesseract_bin: non_empty_var("TESSERACT_BIN").unwrap_or(defaults.tesseract_bin),
        };

        Ok(Self {
            api_key,
            llm_base_url,
            default_model,
            email,
            secret,
            max_iterations,
            rate_limit,
            dirs: DataDirs::under(project_root),
            tools,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, email: String, secret: String, project_root: PathBuf) -> Self {
        Self {
            api_key,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            email,
            secret,
            max_iterations: 5000,
            rate_limit: RateLimitConfig::default(),
            dirs: DataDirs::under(project_root),
            tools: ToolSettings::default(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        Some(v) => v
            .parse()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}
