//! Logging setup (console + `logs/log.log`) and the run banners.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DataDirs;

pub const LOG_FILE_NAME: &str = "log.log";

const BANNER_WIDTH: usize = 78;

/// Initialize file and console logging.
///
/// The file layer appends to `logs/log.log` through a non-blocking writer;
/// keep the returned guard alive until exit or buffered lines are lost.
pub fn init_logging(dirs: &DataDirs) -> anyhow::Result<WorkerGuard> {
    // Set up environment filter (can be controlled via RUST_LOG env var)
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quiz_agent=info"));

    std::fs::create_dir_all(&dirs.logs)?;
    let file_appender = tracing_appender::rolling::never(&dirs.logs, LOG_FILE_NAME);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let console_layer = fmt::layer().with_ansi(true).with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        "Logging initialized - logs will be written to {}",
        dirs.logs.join(LOG_FILE_NAME).display()
    );

    Ok(guard)
}

/// Log the directory layout once at startup.
pub fn log_startup(dirs: &DataDirs) {
    tracing::info!("{}", "=".repeat(BANNER_WIDTH));
    tracing::info!("Quiz agent starting");
    tracing::info!("Project root: {}", dirs.project_root.display());
    tracing::info!("Logs directory: {}", dirs.logs.display());
    tracing::info!("Downloads directory: {}", dirs.downloads.display());
    tracing::info!("Audio directory: {}", dirs.audio.display());
    tracing::info!("Workspace directory: {}", dirs.workspace.display());
    tracing::info!("{}", "=".repeat(BANNER_WIDTH));
}

pub fn log_task_start(url: &str, task_number: usize) {
    let lines = banner(&[
        format!("TASK #{} STARTED", task_number),
        format!("Time: {}", timestamp()),
        format!("URL: {}", url),
    ]);
    for line in lines {
        tracing::info!("{}", line);
    }
}

pub fn log_task_end(success: bool, message: &str) {
    let status = if success { "TASK COMPLETED" } else { "TASK FAILED" };
    let mut rows = vec![status.to_string(), format!("Time: {}", timestamp())];
    if !message.is_empty() {
        rows.push(message.to_string());
    }
    for line in banner(&rows) {
        if success {
            tracing::info!("{}", line);
        } else {
            tracing::error!("{}", line);
        }
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Box-drawn banner. Long rows are cut to fit.
fn banner(rows: &[String]) -> Vec<String> {
    let inner = BANNER_WIDTH - 4;
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!("╔{}╗", "═".repeat(BANNER_WIDTH - 2)));
    for row in rows {
        let cell: String = row.chars().take(inner).collect();
        let pad = inner - cell.chars().count();
        lines.push(format!("║ {}{} ║", cell, " ".repeat(pad)));
    }
    lines.push(format!("╚{}╝", "═".repeat(BANNER_WIDTH - 2)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_rows_have_equal_width() {
        let long = "x".repeat(200);
        let lines = banner(&["TASK #1 STARTED".to_string(), long, "é".to_string()]);
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert_eq!(line.chars().count(), BANNER_WIDTH, "{line}");
        }
        assert!(lines[1].contains("TASK #1 STARTED"));
    }
}
