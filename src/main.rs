use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use proactive::brain::{DEFAULT_MODEL, OpenAiGrouper};
use proactive::{StepGrouper, plan_from_script, telemetry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "proactive", about = "Turn Selenium test scripts into test plans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the test plan extracted from a Python file as JSON.
    Extract {
        file: PathBuf,

        /// Group commands with the LLM (needs OPENAI_API_KEY).
        #[arg(long)]
        llm: bool,

        #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    telemetry::init();

    match Cli::parse().command {
        Commands::Extract { file, llm, model } => {
            let script = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let grouper = if llm {
                match std::env::var("OPENAI_API_KEY") {
                    Ok(key) => StepGrouper::new(Arc::new(OpenAiGrouper::new(key).with_model(model))),
                    Err(_) => {
                        warn!("OPENAI_API_KEY not set, using one step per command");
                        StepGrouper::fallback_only()
                    }
                }
            } else {
                StepGrouper::fallback_only()
            };

            let planned = plan_from_script(&script, &grouper).await?;
            println!("{}", serde_json::to_string_pretty(&planned)?);
        }
    }

    Ok(())
}
