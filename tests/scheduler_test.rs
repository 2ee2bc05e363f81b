use anyhow::{Result, anyhow};
use async_trait::async_trait;
use proactive::plan::PlanSummary;
use proactive::scheduler::{PlanExecutor, PlanSource, Scheduler, SchedulerConfig, TickOutcome};
use proactive::SchedulerError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;

fn summary(id: Option<&str>) -> PlanSummary {
    PlanSummary {
        id: id.map(str::to_string),
        name: None,
    }
}

/// Fails the first `failures` fetches, then serves `plans`.
struct MockSource {
    plans: Vec<PlanSummary>,
    failures: u32,
    calls: AtomicU32,
}

impl MockSource {
    fn new(plans: Vec<PlanSummary>, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            plans,
            failures,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanSource for MockSource {
    async fn fetch_all_test_plans(&self) -> Result<Vec<PlanSummary>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.plans.clone())
    }
}

/// Records every execution attempt. Ids listed in `broken` always fail.
/// When `gate` is set every call waits on it first.
#[derive(Default)]
struct MockExecutor {
    broken: Vec<String>,
    attempts: Mutex<HashMap<String, u32>>,
    gate: Option<Arc<Notify>>,
}

impl MockExecutor {
    fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PlanExecutor for MockExecutor {
    async fn execute_test_plan(&self, id: &str) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        *self.attempts.lock().unwrap().entry(id.to_string()).or_default() += 1;
        if self.broken.iter().any(|b| b == id) {
            return Err(anyhow!("executor returned 500"));
        }
        Ok(())
    }
}

fn scheduler(source: Arc<MockSource>, executor: Arc<MockExecutor>) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(source, executor, SchedulerConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn fetch_succeeds_on_third_attempt() {
    let source = MockSource::new(vec![summary(Some("a"))], 2);
    let executor = Arc::new(MockExecutor::default());
    let scheduler = scheduler(source.clone(), executor.clone());

    let started = Instant::now();
    let outcome = scheduler.tick().await;
    let elapsed = started.elapsed();

    assert_eq!(source.calls(), 3);
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    match outcome {
        TickOutcome::Completed(report) => assert_eq!(report.dispatched, vec!["a".to_string()]),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!scheduler.is_ticking());
}

#[tokio::test(start_paused = true)]
async fn exhausted_fetch_aborts_tick_and_releases_flag() {
    let source = MockSource::new(vec![summary(Some("a"))], u32::MAX);
    let executor = Arc::new(MockExecutor::default());
    let scheduler = scheduler(source.clone(), executor.clone());

    assert_eq!(scheduler.tick().await, TickOutcome::Aborted);
    assert_eq!(source.calls(), 3);
    assert_eq!(executor.attempts("a"), 0);
    assert!(!scheduler.is_ticking());
}

#[tokio::test(start_paused = true)]
async fn one_failing_plan_does_not_stop_the_others() {
    let source = MockSource::new(
        vec![summary(Some("a")), summary(None), summary(Some("b")), summary(Some("c"))],
        0,
    );
    let executor = Arc::new(MockExecutor {
        broken: vec!["b".into()],
        ..Default::default()
    });
    let scheduler = scheduler(source, executor.clone());

    let TickOutcome::Completed(report) = scheduler.tick().await else {
        panic!("tick should complete");
    };

    assert_eq!(report.dispatched, vec!["a".to_string(), "c".to_string()]);
    assert_eq!(report.failed, vec!["b".to_string()]);
    assert_eq!(report.skipped, 1);
    assert_eq!(executor.attempts("a"), 1);
    assert_eq!(executor.attempts("b"), 3);
    assert_eq!(executor.attempts("c"), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_tick_is_dropped() {
    let source = MockSource::new(vec![summary(Some("a"))], 0);
    let gate = Arc::new(Notify::new());
    let executor = Arc::new(MockExecutor {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let scheduler = scheduler(source.clone(), executor.clone());

    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.tick().await }
    });

    while !scheduler.is_ticking() || source.calls() == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
    assert_eq!(source.calls(), 1);

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, TickOutcome::Completed(_)));
    assert_eq!(executor.attempts("a"), 1);
    assert!(!scheduler.is_ticking());

    // The flag is free again for the next interval.
    gate.notify_one();
    assert!(matches!(scheduler.tick().await, TickOutcome::Completed(_)));
}

#[tokio::test(start_paused = true)]
async fn startup_probe_gives_up_after_five_attempts() {
    let source = MockSource::new(vec![], u32::MAX);
    let scheduler = scheduler(source.clone(), Arc::new(MockExecutor::default()));

    let err = scheduler.wait_until_ready().await.unwrap_err();
    assert!(matches!(err, SchedulerError::BackendUnavailable { attempts: 5, .. }));
    assert_eq!(source.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn run_fails_fast_when_backend_never_comes_up() {
    let source = MockSource::new(vec![], u32::MAX);
    let executor = Arc::new(MockExecutor::default());
    let scheduler = scheduler(source.clone(), executor.clone());
    let (_tx, rx) = oneshot::channel();

    assert!(scheduler.run(rx).await.is_err());
    assert_eq!(source.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn run_ticks_immediately_then_on_interval() {
    let source = MockSource::new(vec![summary(Some("a"))], 0);
    let executor = Arc::new(MockExecutor::default());
    let scheduler = Arc::new(Scheduler::new(
        source.clone(),
        executor.clone(),
        SchedulerConfig::every_minutes(1),
    ));
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(scheduler.clone().run(rx));

    // Probe plus the immediate tick.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(executor.attempts("a"), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls(), 3);
    assert_eq!(executor.attempts("a"), 2);

    tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
