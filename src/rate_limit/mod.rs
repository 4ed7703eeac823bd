//! Brute-force guard for access-code validation and lookups.
//!
//! Every attempt is counted before the outcome is known (pessimistic), and only
//! a success clears the counter. Scaling: [`InMemoryRateLimiter`] holds state in
//! process memory and is only correct for a single instance; multi-instance
//! deployments use `storage::PgRateLimiter`.

pub mod memory;
pub mod policy;
pub mod state;
pub mod sweeper;

use crate::error::Result;
use async_trait::async_trait;

pub use memory::InMemoryRateLimiter;
pub use policy::{RateLimitAction, RateLimitConfig, RateLimitPolicy};
pub use state::{AttemptDecision, RateLimitEntry};

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Records one attempt for `identifier` and decides whether it may proceed.
    ///
    /// # Errors
    /// Returns `Store` if the backing store fails.
    async fn check_and_record(&self, identifier: &str, action: RateLimitAction) -> Result<AttemptDecision>;

    /// Clears the counter after a successful attempt.
    ///
    /// # Errors
    /// Returns `Store` if the backing store fails.
    async fn record_success(&self, identifier: &str, action: RateLimitAction) -> Result<()>;

    /// Removes entries that would be evaluated as fresh; returns how many.
    ///
    /// # Errors
    /// Returns `Store` if the backing store fails.
    async fn sweep(&self) -> Result<u64>;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check_and_record(&self, _identifier: &str, _action: RateLimitAction) -> Result<AttemptDecision> {
        Ok(AttemptDecision::Allowed {
            remaining_attempts: u32::MAX,
        })
    }

    async fn record_success(&self, _identifier: &str, _action: RateLimitAction) -> Result<()> {
        Ok(())
    }

    async fn sweep(&self) -> Result<u64> {
        Ok(0)
    }
}
