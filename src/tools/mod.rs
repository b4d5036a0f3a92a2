//! Tools the model can call.
//!
//! Every tool reports failure as a value: `execute` returns a [`ToolOutput`]
//! rather than a `Result`, so one broken tool call can never abort the run.
//! The model sees the error text and decides what to do next.

mod audio;
mod code;
mod dependencies;
mod download;
mod image_analyzer;
mod request;
mod web;

pub use audio::TranscribeAudio;
pub use code::{strip_code_fences, RunCode};
pub use dependencies::AddDependencies;
pub use download::{filename_from_url, DownloadFile};
pub use image_analyzer::AnalyzeImage;
pub use request::{filter_quiz_response, PostRequest, QUIZ_TIME_LIMIT_SECS};
pub use web::RenderPage;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Config, DataDirs, ToolSettings};
use crate::llm::ToolSchema;

/// Result of a tool call: plain text or a structured JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutput::Text(s.into())
    }

    /// Render for the tool-result message.
    pub fn into_content(self) -> String {
        match self {
            ToolOutput::Text(s) => s,
            ToolOutput::Json(v) => v.to_string(),
        }
    }
}

/// Everything a tool may touch: the fixed directories, its settings and a
/// shared HTTP client.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub dirs: DataDirs,
    pub settings: ToolSettings,
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(dirs: DataDirs, settings: ToolSettings) -> Self {
        Self {
            dirs,
            settings,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dirs.clone(), config.tools.clone())
    }
}

/// A tool the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput;
}

/// Name and description, used for the system prompt.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Ordered set of tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with every quiz tool.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RunCode));
        registry.register(Box::new(RenderPage));
        registry.register(Box::new(DownloadFile));
        registry.register(Box::new(PostRequest));
        registry.register(Box::new(AddDependencies));
        registry.register(Box::new(TranscribeAudio));
        registry.register(Box::new(AnalyzeImage));
        registry
    }

    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        tracing::debug!("Registering tool: {}", tool.name());
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Run the named tool with raw JSON argument text.
    ///
    /// Unknown names and malformed arguments come back as error text, like
    /// any other tool failure.
    pub async fn execute(&self, name: &str, raw_args: &str, ctx: &ToolContext) -> ToolOutput {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!("Model requested unknown tool: {}", name);
            return ToolOutput::text(format!(
                "Error: unknown tool '{}'. Available tools: {}",
                name,
                self.tools
                    .iter()
                    .map(|t| t.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        };

        let args = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(raw_args) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Invalid arguments for {}: {}", name, e);
                    return ToolOutput::text(format!(
                        "Error: invalid JSON arguments for '{}': {}",
                        name, e
                    ));
                }
            }
        };

        tool.execute(args, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args[key]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

/// True for `http://` and `https://` sources.
pub(crate) fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Truncate a string for logging purposes, respecting UTF-8 boundaries.
pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut cut = max_len;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &s[..cut])
}
