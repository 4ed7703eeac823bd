use crate::rate_limit::RateLimiter;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error};

/// Runs [`RateLimiter::sweep`] every `interval` until the task is aborted.
#[must_use]
pub fn spawn(limiter: Arc<dyn RateLimiter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match limiter.sweep().await {
                Ok(removed) => debug!(removed, "Rate limit sweep finished"),
                Err(err) => error!("Rate limit sweep failed: {err}"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::rate_limit::{AttemptDecision, RateLimitAction};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingLimiter {
        sweeps: AtomicU64,
    }

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn check_and_record(&self, _identifier: &str, _action: RateLimitAction) -> Result<AttemptDecision> {
            Ok(AttemptDecision::Allowed { remaining_attempts: 1 })
        }

        async fn record_success(&self, _identifier: &str, _action: RateLimitAction) -> Result<()> {
            Ok(())
        }

        async fn sweep(&self) -> Result<u64> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn sweeps_on_every_tick() {
        let limiter = Arc::new(CountingLimiter::default());
        let handle = spawn(limiter.clone(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(limiter.sweeps.load(Ordering::SeqCst) >= 2);
    }
}
