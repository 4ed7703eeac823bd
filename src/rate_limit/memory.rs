use crate::error::{Error, Result};
use crate::rate_limit::{
    RateLimiter,
    policy::{RateLimitAction, RateLimitConfig},
    state::{AttemptDecision, RateLimitEntry},
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, warn};

type Entries = HashMap<(RateLimitAction, String), RateLimitEntry>;

/// Process-local attempt store. Check and increment happen under one lock.
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    entries: Mutex<Entries>,
}

impl InMemoryRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))
    }

    pub(crate) fn check_and_record_at(
        &self,
        identifier: &str,
        action: RateLimitAction,
        now: DateTime<Utc>,
    ) -> Result<AttemptDecision> {
        let policy = self.config.policy(action);
        let mut entries = self.lock()?;
        let key = (action, identifier.to_string());
        let (next, decision) = RateLimitEntry::evaluate(entries.get(&key), &policy, now);
        entries.insert(key, next);

        if let AttemptDecision::Limited { lockout_minutes } = decision {
            warn!(action = %action, lockout_minutes, "Attempts locked out");
        }
        Ok(decision)
    }

    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|(action, _), entry| !entry.is_stale(&self.config.policy(*action), now));
        let removed = u64::try_from(before - entries.len()).unwrap_or(u64::MAX);
        debug!(removed, "Swept rate limit entries");
        Ok(removed)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_record(&self, identifier: &str, action: RateLimitAction) -> Result<AttemptDecision> {
        self.check_and_record_at(identifier, action, Utc::now())
    }

    async fn record_success(&self, identifier: &str, action: RateLimitAction) -> Result<()> {
        self.lock()?.remove(&(action, identifier.to_string()));
        Ok(())
    }

    async fn sweep(&self) -> Result<u64> {
        self.sweep_at(Utc::now())
    }
}
