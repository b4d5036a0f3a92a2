//! Python dependency installation tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolOutput};
use crate::pkg_manager::PkgManager;

/// Install packages with `uv add`.
pub struct AddDependencies;

#[async_trait]
impl Tool for AddDependencies {
    fn name(&self) -> &str {
        "add_dependencies"
    }

    fn description(&self) -> &str {
        "Install Python packages into the project environment (uv add) so run_code can import them. Each name must match the package name on PyPI."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dependencies": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Package names to install"
                }
            },
            "required": ["dependencies"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let dependencies: Vec<String> = args["dependencies"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if dependencies.is_empty() {
            return ToolOutput::text("Dependency installation failed.\nError: no package names given.");
        }

        tracing::info!("Installing dependencies: {}", dependencies.join(", "));

        let uv = PkgManager::new(ctx.settings.uv_bin.as_str());
        let output = match uv
            .command(&uv.add_args(&dependencies), &ctx.dirs.project_root)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let msg = format!("Unexpected error while installing dependencies: {}", e);
                tracing::error!("{}", msg);
                return ToolOutput::text(msg);
            }
        };

        if output.status.success() {
            let msg = format!(
                "Successfully installed dependencies: {}",
                dependencies.join(", ")
            );
            tracing::info!("{}", msg);
            ToolOutput::text(msg)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = if stderr.trim().is_empty() {
                "No error output."
            } else {
                stderr.trim()
            };
            let msg = format!(
                "Dependency installation failed.\nExit code: {}\nError: {}",
                output.status.code().unwrap_or(-1),
                stderr
            );
            tracing::error!("{}", msg);
            ToolOutput::text(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataDirs, ToolSettings};

    fn ctx_with(uv_bin: &str, root: &std::path::Path) -> ToolContext {
        ToolContext::new(
            DataDirs::under(root),
            ToolSettings {
                uv_bin: uv_bin.to_string(),
                ..ToolSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn empty_list_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = AddDependencies
            .execute(json!({"dependencies": []}), &ctx_with("uv", tmp.path()))
            .await
            .into_content();
        assert!(out.starts_with("Dependency installation failed."), "{out}");
    }

    #[tokio::test]
    async fn missing_binary_is_unexpected_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = AddDependencies
            .execute(
                json!({"dependencies": ["pandas"]}),
                &ctx_with("quiz-agent-no-such-uv-binary", tmp.path()),
            )
            .await
            .into_content();
        assert!(
            out.starts_with("Unexpected error while installing dependencies:"),
            "{out}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let tmp = tempfile::TempDir::new().unwrap();
        // `sh add pandas` runs the `add` script below with `pandas` as $1.
        std::fs::write(tmp.path().join("add"), "echo \"no such package $1\" >&2\nexit 2\n").unwrap();
        let out = AddDependencies
            .execute(json!({"dependencies": ["pandas"]}), &ctx_with("sh", tmp.path()))
            .await
            .into_content();
        assert_eq!(
            out,
            "Dependency installation failed.\nExit code: 2\nError: no such package pandas"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_lists_packages() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("add"), "exit 0\n").unwrap();
        let out = AddDependencies
            .execute(
                json!({"dependencies": ["pandas", " numpy "]}),
                &ctx_with("sh", tmp.path()),
            )
            .await
            .into_content();
        assert_eq!(out, "Successfully installed dependencies: pandas, numpy");
    }
}
