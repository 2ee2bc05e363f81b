use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Every network call made by a scheduler tick.
    pub const SCHEDULER: Self = Self::fixed(3, Duration::from_secs(5));

    /// Readiness probe run once before the first tick.
    pub const STARTUP: Self = Self::fixed(5, Duration::from_secs(5));

    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Runs `op` until it succeeds or `max_attempts` calls have failed, in
    /// which case the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(
                        "{} failed: {}, retrying in {}s ({} attempts left)",
                        label,
                        e,
                        self.delay.as_secs(),
                        attempts - attempt
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fails_twice_then_succeeds() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<u32, String> = RetryPolicy::SCHEDULER
            .run("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("attempt {}", n)) } else { Ok(n) }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = RetryPolicy::SCHEDULER
            .run("broken", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_does_not_sleep() {
        let started = tokio::time::Instant::now();
        let result: Result<(), String> = RetryPolicy::STARTUP.run("ok", || async { Ok(()) }).await;
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
