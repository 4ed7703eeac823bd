use crate::audit::{AuditEvent, AuditSink};
use crate::error::Result;
use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::Instrument;

/// Appends events to `access_audit_log`.
#[derive(Clone, Debug)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let query = r"
            INSERT INTO access_audit_log
                (identifier, code_redacted, outcome, reason, diagnostic, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&event.identifier)
            .bind(&event.code)
            .bind(event.outcome.as_str())
            .bind(event.reason.as_deref())
            .bind(event.diagnostic.as_deref())
            .bind(event.timestamp)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert audit event")?;
        Ok(())
    }
}
