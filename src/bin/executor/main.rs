mod face;
mod hands;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use proactive::clients::{BackendClient, ResultsClient};
use proactive::config::ExecutorConfig;
use proactive::plan::{ExecutionStatus, TestPlan};
use proactive::store::{NewTestResult, StatusUpdate};
use proactive::telemetry;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    telemetry::init();
    let config = ExecutorConfig::parse();

    info!("[Executor] Starting test executor...");

    // 1. Accept requests right away so the timer sees a live service.
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Could not bind to port {}", config.port))?;
    let mut queue = face::start_server(listener, config.queue);

    // 2. Launch browser in a blocking task (it can take a while)
    let (headless, chrome_path) = (config.headless, config.chrome_path.clone());
    let launch = move || hands::BrowserSession::launch(headless, chrome_path.clone());
    let first = launch.clone();
    let mut session = Some(
        tokio::task::spawn_blocking(first)
            .await
            .map_err(|e| anyhow!("Browser launch panicked: {}", e))??,
    );

    let backend = BackendClient::new(&config.backend_url, config.internal_secret.clone());
    let results = ResultsClient::new(config.results_url());
    info!("[Executor] Ready. Waiting for tests...");

    // 3. Run queued tests one at a time, relaunching the browser when it died
    while let Some(test_id) = queue.recv().await {
        let launch = launch.clone();
        let in_browser = move |current: Option<hands::BrowserSession>,
                               plan: TestPlan|
              -> Result<(hands::BrowserSession, hands::PlanRun)> {
            let session = hands::ready_session(current, launch)?;
            let run = hands::run_plan(&session.tab, &plan);
            Ok((session, run))
        };
        if let Err(e) = run_test(&mut session, &backend, &results, &test_id, in_browser).await {
            error!("[Executor] Test {} not run: {:#}", test_id, e);
        }
    }

    Ok(())
}

/// Runs one plan. `in_browser` gets the current session (if any) and hands
/// back the session to keep for the next plan. Once the plan is marked
/// running, every way out reports a final status.
async fn run_test<S, F>(
    session: &mut Option<S>,
    backend: &BackendClient,
    results: &ResultsClient,
    test_id: &str,
    in_browser: F,
) -> Result<()>
where
    S: Send + 'static,
    F: FnOnce(Option<S>, TestPlan) -> Result<(S, hands::PlanRun)> + Send + 'static,
{
    let plan = backend.get_plan(test_id).await?;
    info!(
        "[Executor] Running test {} ({} steps) from {}",
        test_id,
        plan.steps.len(),
        plan.start_url
    );

    report_status(backend, test_id, ExecutionStatus::Running, None, None).await;

    let execution_time = Utc::now().timestamp_millis();
    let current = session.take();
    let outcome = tokio::task::spawn_blocking(move || in_browser(current, plan))
        .await
        .map_err(|e| anyhow!("Test run panicked: {}", e))
        .and_then(|run| run);

    let run = match outcome {
        Ok((live, run)) => {
            *session = Some(live);
            run
        }
        Err(e) => {
            let message = format!("{:#}", e);
            report_status(backend, test_id, ExecutionStatus::Failed, None, Some(message)).await;
            return Err(e);
        }
    };

    info!(
        "[Executor] Test {} finished: {:?} in {}ms",
        test_id, run.status, run.total_runtime
    );

    let result = NewTestResult {
        test_id: test_id.to_string(),
        status: run.status,
        execution_time,
        total_runtime: run.total_runtime,
        steps: run.steps,
        error: run.error.clone(),
    };
    if let Err(e) = results.record(&result).await {
        error!("[Executor] {:#}", e);
    }

    report_status(
        backend,
        test_id,
        run.status,
        Some(run.total_runtime),
        run.error,
    )
    .await;

    Ok(())
}

async fn report_status(
    backend: &BackendClient,
    test_id: &str,
    status: ExecutionStatus,
    execution_time: Option<u64>,
    error: Option<String>,
) {
    let update = StatusUpdate {
        status,
        execution_time,
        error,
    };
    if let Err(e) = backend.update_status(test_id, &update).await {
        warn!("[Executor] {:#}", e);
    }
}
