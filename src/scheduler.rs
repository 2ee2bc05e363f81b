//! Periodic dispatch of every stored test plan to the executor.
//!
//! At most one tick runs at a time. A trigger that lands while a tick is in
//! progress is dropped, not queued.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::error::SchedulerError;
use crate::plan::PlanSummary;
use crate::retry::RetryPolicy;

#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn fetch_all_test_plans(&self) -> anyhow::Result<Vec<PlanSummary>>;
}

#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute_test_plan(&self, id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub startup: RetryPolicy,
}

impl SchedulerConfig {
    pub fn every_minutes(minutes: u64) -> Self {
        Self {
            interval: Duration::from_secs(minutes.max(1) * 60),
            ..Self::default()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            retry: RetryPolicy::SCHEDULER,
            startup: RetryPolicy::STARTUP,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: Vec<String>,
    pub failed: Vec<String>,
    /// Plans listed without an id.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// The plan list could not be fetched.
    Aborted,
    Completed(TickReport),
}

/// Holds the single-flight flag for the lifetime of one tick.
struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    source: Arc<dyn PlanSource>,
    executor: Arc<dyn PlanExecutor>,
    config: SchedulerConfig,
    ticking: AtomicBool,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn PlanSource>,
        executor: Arc<dyn PlanExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            executor,
            config,
            ticking: AtomicBool::new(false),
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking.load(Ordering::Acquire)
    }

    /// Probes the backend until it answers. Ticking must not start against
    /// an unreachable backend.
    pub async fn wait_until_ready(&self) -> Result<(), SchedulerError> {
        let source = &self.source;
        self.config
            .startup
            .run("Readiness probe", move || source.fetch_all_test_plans())
            .await
            .map_err(|source| SchedulerError::BackendUnavailable {
                attempts: self.config.startup.max_attempts,
                source,
            })?;

        info!("Services are ready");
        Ok(())
    }

    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = TickGuard::acquire(&self.ticking) else {
            warn!("Previous execution still in progress, skipping this interval");
            return TickOutcome::Skipped;
        };

        info!("Starting scheduled test execution");

        let source = &self.source;
        let plans = match self
            .config
            .retry
            .run("Fetch tests", move || source.fetch_all_test_plans())
            .await
        {
            Ok(plans) => plans,
            Err(e) => {
                error!("Failed to fetch tests: {:#}", e);
                return TickOutcome::Aborted;
            }
        };

        info!("Found {} tests to execute", plans.len());
        let mut report = TickReport::default();

        for plan in plans {
            let Some(id) = plan.id.filter(|id| !id.is_empty()) else {
                warn!("Test ID is undefined for test: {:?}", plan.name);
                report.skipped += 1;
                continue;
            };

            let label = format!("Execute test {}", id);
            let executor = &self.executor;
            let target = id.as_str();
            match self
                .config
                .retry
                .run(&label, move || executor.execute_test_plan(target))
                .await
            {
                Ok(()) => {
                    info!("Successfully executed test: {}", id);
                    report.dispatched.push(id);
                }
                Err(e) => {
                    error!("Failed to execute test {}: {:#}", id, e);
                    report.failed.push(id);
                }
            }
        }

        info!(
            "Completed scheduled test execution: {} dispatched, {} failed, {} skipped",
            report.dispatched.len(),
            report.failed.len(),
            report.skipped
        );
        TickOutcome::Completed(report)
    }

    /// Waits for the backend, ticks immediately, then once per interval until
    /// `shutdown` fires. A tick still running at shutdown is allowed to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) -> Result<(), SchedulerError> {
        self.wait_until_ready().await?;

        info!(
            "Starting timer with interval of {} minutes",
            self.config.interval.as_secs() / 60
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Vec<JoinHandle<TickOutcome>> = Vec::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    in_flight.retain(|handle| !handle.is_finished());
                    let scheduler = Arc::clone(&self);
                    in_flight.push(tokio::spawn(async move { scheduler.tick().await }));
                }
                _ = &mut shutdown => break,
            }
        }

        info!("Timer stopped");
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("Scheduled execution task panicked: {}", e);
            }
        }

        Ok(())
    }
}
