//! Python code execution tool.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, truncate_for_log, Tool, ToolContext, ToolOutput};
use crate::pkg_manager::PkgManager;

/// Script file every `run_code` call overwrites.
const RUNNER_FILE: &str = "runner.py";

/// Run Python code with `uv run` from the project root.
pub struct RunCode;

#[async_trait]
impl Tool for RunCode {
    fn name(&self) -> &str {
        "run_code"
    }

    fn description(&self) -> &str {
        "Execute Python code. The code is written to data/workspace/runner.py and run with 'uv run' from the project root, so relative paths like data/downloads/demo.csv or data/audio/audio.m4a work. Returns stdout, stderr and return_code. Read files that were already downloaded instead of fetching them again."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let result = match required_str(&args, "code") {
            Ok(code) => run(code, ctx).await,
            Err(e) => Err(e),
        };

        let (stdout, stderr, return_code) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let msg = format!("{:#}", e);
                tracing::error!("Code execution failed: {}", msg);
                (String::new(), msg, -1)
            }
        };

        ToolOutput::Json(json!({
            "stdout": stdout,
            "stderr": stderr,
            "return_code": return_code,
        }))
    }
}

async fn run(code: &str, ctx: &ToolContext) -> anyhow::Result<(String, String, i32)> {
    tracing::info!("Code execution requested");
    tracing::info!("Code length: {} characters", code.len());

    let filepath = ctx.dirs.workspace.join(RUNNER_FILE);
    tracing::info!("Writing code to: {}", filepath.display());
    tokio::fs::create_dir_all(&ctx.dirs.workspace).await?;
    tokio::fs::write(&filepath, strip_code_fences(code)).await?;

    let uv = PkgManager::new(ctx.settings.uv_bin.as_str());
    let args = uv.run_args(&ctx.dirs.relative(&filepath));
    tracing::info!(
        "Executing code with '{} {}' from {}",
        uv.bin(),
        args.join(" "),
        ctx.dirs.project_root.display()
    );

    let timeout_secs = ctx.settings.code_timeout_secs;
    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        uv.command(&args, &ctx.dirs.project_root).output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Code execution timed out after {} seconds", timeout_secs))?
    .map_err(|e| anyhow::anyhow!("Failed to execute code with '{}': {}", uv.bin(), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let return_code = output.status.code().unwrap_or(-1);

    tracing::info!("Execution complete. Return code: {}", return_code);
    if !stdout.is_empty() {
        tracing::info!("STDOUT ({} chars): {}", stdout.len(), truncate_for_log(&stdout, 200));
    }
    if !stderr.is_empty() {
        tracing::warn!("STDERR: {}", truncate_for_log(&stderr, 200));
    }

    Ok((stdout, stderr, return_code))
}

/// Remove a surrounding Markdown code fence (```` ```python ```` … ```` ``` ````).
pub fn strip_code_fences(code: &str) -> String {
    let mut code = code.trim();
    if code.starts_with("```") {
        code = code.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    }
    if code.ends_with("```") {
        code = code.rsplit_once('\n').map(|(body, _)| body).unwrap_or("");
    }
    code.trim().to_string()
}
