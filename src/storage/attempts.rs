//! Database-backed brute-force guard.
//!
//! Flow Overview:
//! 1) Make sure a row exists for `(action, identifier)` (placeholder with count 0).
//! 2) Lock it with `SELECT ... FOR UPDATE` so concurrent requests serialize.
//! 3) Apply the shared state transition and write the result back.
//!
//! Scaling: all instances share `rate_limit_entries`, so lockouts hold fleet-wide.

use crate::error::Result;
use crate::rate_limit::{AttemptDecision, RateLimitAction, RateLimitConfig, RateLimitEntry, RateLimiter};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Instrument, debug, warn};

#[derive(Clone, Debug)]
pub struct PgRateLimiter {
    pool: PgPool,
    config: RateLimitConfig,
}

impl PgRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool, config: RateLimitConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl RateLimiter for PgRateLimiter {
    async fn check_and_record(&self, identifier: &str, action: RateLimitAction) -> Result<AttemptDecision> {
        let policy = self.config.policy(action);
        let now = Utc::now();
        let window_seconds = i64::try_from(policy.window.as_secs()).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await.context("begin rate limit transaction")?;

        let query = r"
            INSERT INTO rate_limit_entries (action, identifier, count, window_start, window_seconds)
            VALUES ($1, $2, 0, $3, $4)
            ON CONFLICT (action, identifier) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(action.as_str())
            .bind(identifier)
            .bind(now)
            .bind(window_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to ensure rate limit entry")?;

        let query = r"
            SELECT count, window_start, locked_until
            FROM rate_limit_entries
            WHERE action = $1 AND identifier = $2
            FOR UPDATE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(action.as_str())
            .bind(identifier)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to lock rate limit entry")?;

        let count: i32 = row.get("count");
        let current = (count > 0).then(|| RateLimitEntry {
            count: u32::try_from(count).unwrap_or(0),
            window_start: row.get::<DateTime<Utc>, _>("window_start"),
            locked_until: row.get("locked_until"),
        });
        let (next, decision) = RateLimitEntry::evaluate(current.as_ref(), &policy, now);

        let query = r"
            UPDATE rate_limit_entries
            SET count = $3, window_start = $4, locked_until = $5, window_seconds = $6
            WHERE action = $1 AND identifier = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(action.as_str())
            .bind(identifier)
            .bind(i32::try_from(next.count).unwrap_or(i32::MAX))
            .bind(next.window_start)
            .bind(next.locked_until)
            .bind(window_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to update rate limit entry")?;

        tx.commit().await.context("commit rate limit transaction")?;

        if let AttemptDecision::Limited { lockout_minutes } = decision {
            warn!(action = %action, lockout_minutes, "Attempts locked out");
        }
        Ok(decision)
    }

    async fn record_success(&self, identifier: &str, action: RateLimitAction) -> Result<()> {
        let query = "DELETE FROM rate_limit_entries WHERE action = $1 AND identifier = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(action.as_str())
            .bind(identifier)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear rate limit entry")?;
        Ok(())
    }

    async fn sweep(&self) -> Result<u64> {
        // Same staleness rule as RateLimitEntry::is_stale.
        let query = r"
            DELETE FROM rate_limit_entries
            WHERE (locked_until IS NOT NULL AND locked_until < $1)
               OR (locked_until IS NULL AND window_start + window_seconds * INTERVAL '1 second' <= $1)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let removed = sqlx::query(query)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to sweep rate limit entries")?
            .rows_affected();
        debug!(removed, "Swept rate limit entries");
        Ok(removed)
    }
}
