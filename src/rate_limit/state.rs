//! Attempt counting as a pure state transition.
//!
//! Fresh -> Counting -> Locked -> (lockout elapsed) -> Fresh. Every backend loads
//! the entry, calls [`RateLimitEntry::evaluate`] and stores the result while it
//! still holds the entry exclusively.

use crate::rate_limit::policy::RateLimitPolicy;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Result of one recorded attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "decision")]
pub enum AttemptDecision {
    Allowed { remaining_attempts: u32 },
    Limited { lockout_minutes: u64 },
}

impl AttemptDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

fn after(start: DateTime<Utc>, duration: std::time::Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole minutes until `until`, rounded up, never below one.
#[must_use]
pub fn lockout_minutes(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let seconds = u64::try_from((until - now).num_seconds()).unwrap_or(0);
    seconds.div_ceil(60).max(1)
}

impl RateLimitEntry {
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
            locked_until: None,
        }
    }

    /// Applies one attempt to `entry` and returns the new entry with the decision.
    #[must_use]
    pub fn evaluate(
        entry: Option<&Self>,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> (Self, AttemptDecision) {
        let current = entry.filter(|entry| !entry.is_stale(policy, now));

        let Some(current) = current else {
            let next = Self::fresh(now);
            return Self::decide(next, policy, now);
        };

        if let Some(until) = current.locked_until {
            return (
                current.clone(),
                AttemptDecision::Limited {
                    lockout_minutes: lockout_minutes(until, now),
                },
            );
        }

        let next = Self {
            count: current.count.saturating_add(1),
            window_start: current.window_start,
            locked_until: None,
        };
        Self::decide(next, policy, now)
    }

    fn decide(mut next: Self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> (Self, AttemptDecision) {
        if next.count >= policy.max_attempts {
            let until = after(now, policy.lockout);
            next.locked_until = Some(until);
            return (
                next,
                AttemptDecision::Limited {
                    lockout_minutes: lockout_minutes(until, now),
                },
            );
        }
        let remaining_attempts = policy.max_attempts - next.count;
        (next, AttemptDecision::Allowed { remaining_attempts })
    }

    /// An entry that would be evaluated as fresh: its lock has expired, or it is
    /// unlocked and its window has elapsed.
    #[must_use]
    pub fn is_stale(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(until) => now > until,
            None => now >= after(self.window_start, policy.window),
        }
    }
}
