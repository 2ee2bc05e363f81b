use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use proactive::clients::{BackendClient, ExecutorClient};
use proactive::config::TimerConfig;
use proactive::scheduler::{Scheduler, SchedulerConfig};
use proactive::telemetry;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    telemetry::init();
    let config = TimerConfig::parse();

    info!(
        "Timer dispatching tests from {} to {}",
        config.backend_url, config.executor_url
    );

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(BackendClient::new(
            &config.backend_url,
            config.internal_secret.clone(),
        )),
        Arc::new(ExecutorClient::new(&config.executor_url)),
        SchedulerConfig::every_minutes(config.interval_minutes),
    ));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    if let Err(e) = scheduler.run(shutdown_rx).await {
        error!("Failed to start timer service: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
