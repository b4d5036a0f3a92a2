//! Quiz Agent - command line entry point.
//!
//! Solves the quiz chain starting at the given URL.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use quiz_agent::{agent::Agent, config::Config, config::DataDirs, logging};
use tracing::info;

const DEFAULT_START_URL: &str = "https://tds-llm-analysis.s-anand.net/project2";

#[derive(Debug, Parser)]
#[command(name = "quiz-agent", about = "Autonomous quiz-solving agent", version)]
struct Args {
    /// Quiz URL to start from
    #[arg(env = "START_URL", default_value = DEFAULT_START_URL)]
    url: String,

    /// Directory holding logs/ and data/ (overrides PROJECT_ROOT)
    #[arg(long)]
    project_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(root) = args.project_root {
        config.dirs = DataDirs::under(root);
    }

    config
        .dirs
        .ensure()
        .context("Failed to create data directories")?;

    // Initialize logging
    let _guard = logging::init_logging(&config.dirs)?;
    logging::log_startup(&config.dirs);
    info!(
        "Loaded configuration: model={}, max_iterations={}",
        config.default_model, config.max_iterations
    );

    let agent = Agent::new(&config);
    match agent.run(&args.url).await {
        Ok(summary) => {
            info!(
                "Run finished: {} task(s), {} steps",
                summary.tasks, summary.steps
            );
            println!("Tasks completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Agent run failed: {:#}", e);
            Err(anyhow::Error::new(e).context(format!("Quiz run starting at {} failed", args.url)))
        }
    }
}
