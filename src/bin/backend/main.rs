use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use proactive::backend::{AppState, router};
use proactive::brain::OpenAiGrouper;
use proactive::config::BackendConfig;
use proactive::store::{PlanStore, ResultStore};
use proactive::{StepGrouper, telemetry};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    telemetry::init();
    let config = BackendConfig::parse();

    let data_dir = config.data_dir();
    info!("Storing tests and results under {}", data_dir.display());

    let grouper = match config.openai_api_key.clone().filter(|k| !k.is_empty()) {
        Some(key) => StepGrouper::new(Arc::new(
            OpenAiGrouper::new(key)
                .with_model(config.openai_model.clone())
                .with_base_url(config.openai_base_url.clone()),
        )),
        None => {
            warn!("OPENAI_API_KEY not set, uploads get one step per command");
            StepGrouper::fallback_only()
        }
    };

    if config.internal_secret.is_none() {
        warn!("INTERNAL_SECRET not set, internal routes will refuse every request");
    }

    let state = Arc::new(AppState {
        plans: PlanStore::open(&data_dir).context("Failed to open test store")?,
        results: ResultStore::open(&data_dir).context("Failed to open result store")?,
        grouper,
        internal_secret: config.internal_secret.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Could not bind to port {}", config.port))?;
    info!("Backend listening on http://localhost:{}", config.port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down backend");
        })
        .await?;

    Ok(())
}
