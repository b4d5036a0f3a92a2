//! Page rendering tool: headless Chromium driven by Node.js + Playwright.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{required_str, Tool, ToolContext, ToolOutput};
use crate::config::ToolSettings;

/// Extensions that are downloads, not pages.
const FILE_EXTENSIONS: &[&str] = &[
    ".csv", ".pdf", ".zip", ".png", ".jpg", ".jpeg", ".gif", ".mp3", ".wav", ".m4a", ".json",
    ".xlsx", ".parquet",
];

/// Stdout is a single JSON object: `{ok, html}` or `{ok: false, error}`.
const RENDER_JS: &str = r#"
const fs = require('fs');

function out(obj) { process.stdout.write(JSON.stringify(obj)); }

async function main() {
  const req = JSON.parse(fs.readFileSync(0, 'utf8'));
  let pw;
  try { pw = require('playwright'); } catch (e) {
    return out({ ok: false, error: 'Playwright is not installed for Node.js. Install it with `npm i -g playwright` and `npx playwright install chromium`, or set PLAYWRIGHT_NODE_PATH.' });
  }
  let browser;
  try {
    browser = await pw.chromium.launch({ headless: true });
    const page = await browser.newPage();
    await page.goto(req.url, { waitUntil: 'networkidle', timeout: req.timeout_ms });
    out({ ok: true, html: await page.content() });
  } catch (e) {
    out({ ok: false, error: String(e && e.message ? e.message : e) });
  } finally {
    try { if (browser) await browser.close(); } catch (_) {}
  }
}

main().catch((e) => out({ ok: false, error: String(e) }));
"#;

#[derive(Debug, Deserialize)]
struct RenderOutcome {
    ok: bool,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Fetch the fully rendered HTML of a page.
pub struct RenderPage;

#[async_trait]
impl Tool for RenderPage {
    fn name(&self) -> &str {
        "get_rendered_html"
    }

    fn description(&self) -> &str {
        "Load a web page in a headless Chromium browser, let its JavaScript run until the network is idle, and return the rendered HTML. Only use this for HTML pages. For direct file links (csv, pdf, zip, png, audio) use download_file instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the web page to render"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        match render(&args, ctx).await {
            Ok(html) => ToolOutput::Text(html),
            Err(e) => {
                let msg = format!("Error fetching/rendering page: {:#}", e);
                tracing::error!("{}", msg);
                ToolOutput::Text(msg)
            }
        }
    }
}

async fn render(args: &Value, ctx: &ToolContext) -> anyhow::Result<String> {
    let url = required_str(args, "url")?;
    tracing::info!("Fetching and rendering URL: {}", url);

    if looks_like_file(url) {
        anyhow::bail!("{} points to a file, not a page; use download_file for it", url);
    }

    let timeout_ms = ctx.settings.render_timeout_ms;
    let request = json!({ "url": url, "timeout_ms": timeout_ms }).to_string();

    tracing::info!("Launching headless Chromium via {}", ctx.settings.node_bin);
    let mut cmd = Command::new(&ctx.settings.node_bin);
    let existing = std::env::var("NODE_PATH").unwrap_or_default();
    if let Some(node_path) = resolve_node_path(&ctx.settings, &existing, &ctx.dirs.project_root).await {
        tracing::debug!("Using NODE_PATH={}", node_path);
        cmd.env("NODE_PATH", node_path);
    }
    let mut child = cmd
        .arg("-e")
        .arg(RENDER_JS)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            anyhow::anyhow!(
                "page rendering requires Node.js ('{}') with the Playwright package: {}",
                ctx.settings.node_bin,
                e
            )
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(request.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    // Page load timeout plus headroom for browser start-up and shutdown.
    let hard_limit = Duration::from_millis(timeout_ms.saturating_add(15_000));
    let output = tokio::time::timeout(hard_limit, child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("renderer did not finish within {:?}", hard_limit))??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let outcome: RenderOutcome = serde_json::from_str(stdout.trim()).map_err(|e| {
        anyhow::anyhow!(
            "renderer produced no result ({}): {}",
            e,
            String::from_utf8_lossy(&output.stderr).trim()
        )
    })?;

    parse_outcome(outcome).map(|html| {
        tracing::info!("Content extracted successfully ({} characters)", html.len());
        html
    })
}

fn parse_outcome(outcome: RenderOutcome) -> anyhow::Result<String> {
    match outcome {
        RenderOutcome {
            ok: true,
            html: Some(html),
            ..
        } => Ok(html),
        RenderOutcome { error, .. } => Err(anyhow::anyhow!(
            error.unwrap_or_else(|| "renderer returned no HTML".to_string())
        )),
    }
}

/// `NODE_PATH` that makes a globally installed Playwright loadable from
/// `node -e`, which does not search the global module root on its own.
///
/// An explicit setting wins. Otherwise nothing is set when `existing`
/// already reaches Playwright, and `npm root -g` is used when Playwright
/// lives there.
async fn resolve_node_path(
    settings: &ToolSettings,
    existing: &str,
    cwd: &Path,
) -> Option<String> {
    if let Some(path) = settings.node_path.as_deref().filter(|p| !p.trim().is_empty()) {
        return Some(path.trim().to_string());
    }
    if std::env::split_paths(existing).any(|dir| has_playwright(&dir)) {
        return None;
    }

    let output = Command::new(&settings.npm_bin)
        .args(["root", "-g"])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    if root.as_os_str().is_empty() || !has_playwright(&root) {
        return None;
    }

    let inherited = std::env::split_paths(existing).filter(|p| !p.as_os_str().is_empty());
    let paths = std::iter::once(root).chain(inherited);
    std::env::join_paths(paths)
        .ok()
        .map(|p| p.to_string_lossy().to_string())
}

fn has_playwright(dir: &Path) -> bool {
    !dir.as_os_str().is_empty() && dir.join("playwright").is_dir()
}

fn looks_like_file(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => return false,
    };
    FILE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataDirs;

    #[test]
    fn detects_file_links() {
        assert!(looks_like_file("https://quiz.test/data/demo.csv?x=1"));
        assert!(looks_like_file("https://quiz.test/A.PDF"));
        assert!(!looks_like_file("https://quiz.test/quiz/1"));
        assert!(!looks_like_file("https://quiz.test/page.html"));
    }

    #[test]
    fn outcome_parsing() {
        let ok: RenderOutcome = serde_json::from_str(r#"{"ok":true,"html":"<html></html>"}"#).unwrap();
        assert_eq!(parse_outcome(ok).unwrap(), "<html></html>");

        let bad: RenderOutcome = serde_json::from_str(r#"{"ok":false,"error":"net::ERR"}"#).unwrap();
        assert_eq!(parse_outcome(bad).unwrap_err().to_string(), "net::ERR");
    }

    #[tokio::test]
    async fn file_url_is_refused() {
        let ctx = ToolContext::new(DataDirs::under("/nonexistent"), ToolSettings::default());
        let out = RenderPage
            .execute(json!({"url": "https://quiz.test/demo.csv"}), &ctx)
            .await
            .into_content();
        assert!(out.starts_with("Error fetching/rendering page:"), "{out}");
        assert!(out.contains("download_file"), "{out}");
    }

    #[tokio::test]
    async fn missing_node_is_reported() {
        let settings = ToolSettings {
            node_bin: "quiz-agent-no-such-node".to_string(),
            ..ToolSettings::default()
        };
        let ctx = ToolContext::new(DataDirs::under("/nonexistent"), settings);
        let out = RenderPage
            .execute(json!({"url": "https://quiz.test/quiz/1"}), &ctx)
            .await
            .into_content();
        assert!(out.contains("requires Node.js"), "{out}");
    }

    /// A global prefix holding a fake `playwright` module that serves fixed HTML.
    fn stub_global_root(tmp: &Path) -> PathBuf {
        let root = tmp.join("lib").join("node_modules");
        let module = root.join("playwright");
        std::fs::create_dir_all(&module).unwrap();
        std::fs::write(
            module.join("index.js"),
            "module.exports = { chromium: { launch: async () => ({\n\
             newPage: async () => ({ goto: async () => {}, content: async () => '<html>stub</html>' }),\n\
             close: async () => {},\n\
             }) } };\n",
        )
        .unwrap();
        root
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn node_path_comes_from_npm_global_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = stub_global_root(tmp.path());
        // `sh root -g` stands in for `npm root -g`.
        std::fs::write(tmp.path().join("root"), format!("echo '{}'\n", root.display())).unwrap();

        let settings = ToolSettings {
            npm_bin: "sh".to_string(),
            ..ToolSettings::default()
        };
        assert_eq!(
            resolve_node_path(&settings, "", tmp.path()).await,
            Some(root.to_string_lossy().to_string())
        );
        // Already reachable through the inherited NODE_PATH.
        assert_eq!(
            resolve_node_path(&settings, &root.to_string_lossy(), tmp.path()).await,
            None
        );

        let explicit = ToolSettings {
            node_path: Some("/opt/node_modules".to_string()),
            ..settings
        };
        assert_eq!(
            resolve_node_path(&explicit, "", tmp.path()).await,
            Some("/opt/node_modules".to_string())
        );
    }

    #[tokio::test]
    async fn missing_npm_leaves_node_path_alone() {
        let settings = ToolSettings {
            npm_bin: "quiz-agent-no-such-npm".to_string(),
            ..ToolSettings::default()
        };
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(resolve_node_path(&settings, "", tmp.path()).await, None);
    }

    #[tokio::test]
    async fn renders_with_globally_installed_playwright() {
        let node_available = Command::new("node")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !node_available {
            return;
        }

        let tmp = tempfile::TempDir::new().unwrap();
        let root = stub_global_root(tmp.path());
        let settings = ToolSettings {
            node_path: Some(root.to_string_lossy().to_string()),
            ..ToolSettings::default()
        };
        let ctx = ToolContext::new(DataDirs::under(tmp.path()), settings);
        let out = RenderPage
            .execute(json!({"url": "https://quiz.test/quiz/1"}), &ctx)
            .await;
        assert_eq!(out, ToolOutput::text("<html>stub</html>"));
    }
}
