//! Audit trail of access decisions.
//!
//! Events carry the precise deny reason and identity diagnostics that callers
//! never see. Codes are redacted before an event is built.

use crate::error::{Error, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Granted,
    Denied,
    RateLimited,
}

impl AuditOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::RateLimited => "rate_limited",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub identifier: String,
    /// Redacted, see [`redact_code`].
    pub code: String,
    pub outcome: AuditOutcome,
    pub reason: Option<String>,
    pub diagnostic: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(identifier: &str, raw_code: &str, outcome: AuditOutcome) -> Self {
        Self {
            identifier: identifier.to_string(),
            code: redact_code(raw_code),
            outcome,
            reason: None,
            diagnostic: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

const REDACTED_MAX_LEN: usize = 12;

/// Keeps the first three characters and masks the rest, never longer than the
/// longest valid code. Inputs of three characters or fewer are masked entirely.
#[must_use]
pub fn redact_code(code: &str) -> String {
    let code = code.trim();
    let len = code.chars().count().min(REDACTED_MAX_LEN);
    if len <= 3 {
        return "*".repeat(len);
    }
    code.chars()
        .take(len)
        .enumerate()
        .map(|(index, ch)| if index < 3 { ch.to_ascii_uppercase() } else { '*' })
        .collect()
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// # Errors
    /// Returns `Store` if the event could not be persisted.
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Writes events to the `carekey::audit` tracing target.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        info!(
            target: "carekey::audit",
            identifier = %event.identifier,
            code = %event.code,
            outcome = event.outcome.as_str(),
            reason = event.reason.as_deref().unwrap_or("-"),
            diagnostic = event.diagnostic.as_deref().unwrap_or("-"),
            "Access decision"
        );
        Ok(())
    }
}

/// Collects events in memory, for tests and local tooling.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))?
            .push(event.clone());
        Ok(())
    }
}

/// Front of the audit sink. A failing sink never fails the request it describes.
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl AuditEmitter {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn emit(&self, event: AuditEvent) {
        if event.outcome == AuditOutcome::RateLimited {
            warn!(identifier = %event.identifier, "Access attempts rate limited");
        }
        if let Err(err) = self.sink.record(&event).await {
            error!(
                outcome = event.outcome.as_str(),
                "Failed to record audit event: {err}"
            );
        }
    }
}

impl Default for AuditEmitter {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: &AuditEvent) -> Result<()> {
            Err(Error::Store(anyhow!("audit table unavailable")))
        }
    }

    #[test]
    fn redact_code_keeps_prefix() {
        assert_eq!(redact_code("7Q2K9XAB"), "7Q2*****");
        assert_eq!(redact_code(" 7q2k9xab "), "7Q2*****");
        assert_eq!(redact_code("ABC"), "***");
        assert_eq!(redact_code(""), "");
    }

    #[test]
    fn redact_code_is_bounded() {
        let redacted = redact_code(&"x".repeat(10_000));
        assert_eq!(redacted, "XXX*********");
        assert_eq!(redact_code("ABCDEFGHIJKLM").len(), 12);
    }

    #[tokio::test]
    async fn emitter_records_events() {
        let sink = Arc::new(MemoryAuditSink::new());
        let emitter = AuditEmitter::new(sink.clone());
        emitter
            .emit(
                AuditEvent::new("203.0.113.7", "7Q2K9XAB", AuditOutcome::Denied)
                    .with_reason("identity_mismatch")
                    .with_diagnostic("lastName=ok firstName=ok birthDate=mismatch"),
            )
            .await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, "7Q2*****");
        assert_eq!(events[0].reason.as_deref(), Some("identity_mismatch"));
    }

    #[tokio::test]
    async fn emitter_swallows_sink_errors() {
        let emitter = AuditEmitter::new(Arc::new(FailingSink));
        emitter
            .emit(AuditEvent::new("203.0.113.7", "7Q2K9XAB", AuditOutcome::Granted))
            .await;
    }
}
