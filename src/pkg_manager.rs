//! Python project manager helpers (uv).
//!
//! Both code execution and dependency installation go through `uv`, so the
//! argument shapes are defined in one place.

use std::path::Path;

use tokio::process::Command;

/// A `uv` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgManager {
    bin: String,
}

impl PkgManager {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// The binary name used for every invocation.
    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Arguments for adding packages to the project, e.g. `["add", "pandas"]`.
    pub fn add_args(&self, packages: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(packages.len() + 1);
        args.push("add".to_string());
        args.extend(packages.iter().cloned());
        args
    }

    /// Arguments for running a script inside the project environment.
    pub fn run_args(&self, script: &Path) -> Vec<String> {
        vec!["run".to_string(), script.to_string_lossy().to_string()]
    }

    /// A command for `args`, run from `cwd` with captured output.
    pub fn command(&self, args: &[String], cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for PkgManager {
    fn default() -> Self {
        Self::new("uv")
    }
}
