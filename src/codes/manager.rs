//! Access code lifecycle and the validation pipeline.
//!
//! Flow Overview:
//! 1) Count the attempt against the caller (fail fast when locked out).
//! 2) Normalize the code, load its rows, reject inactive or expired ones.
//! 3) When identity fields are supplied, match them against the owner's profile.
//! 4) Grant bumps usage and clears the counter; every outcome is audited.
//!
//! Denied callers only ever learn `invalid_or_expired` or `rate_limited`.

use crate::audit::{AuditEmitter, AuditEvent, AuditOutcome, redact_code};
use crate::codes::{
    config::AccessConfig,
    generator::{generate_code, normalize_code},
    model::{AccessCode, CodeScope, GenerateOptions, RegenerateOptions},
    store::{CodeStore, InsertOutcome},
};
use crate::error::{Error, Result};
use crate::identity::{IdentityInput, ValidatedIdentity, match_any, match_identity};
use crate::profile::{Profile, ProfileStore};
use crate::rate_limit::{AttemptDecision, RateLimitAction, RateLimiter};
use anyhow::anyhow;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const PUBLIC_DENY_REASON: &str = "invalid_or_expired";
pub const PUBLIC_RATE_LIMITED_REASON: &str = "rate_limited";

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationRequest {
    pub code: String,
    pub identity: IdentityInput,
    /// Usually the client IP, used as the attempt counter key.
    pub client_identifier: String,
}

/// Precise cause of a denial. Only reaches the audit sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    InvalidFormat,
    NotFound,
    Expired,
    Inactive,
    IdentityMismatch,
    AmbiguousIdentity,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::Inactive => "inactive",
            Self::IdentityMismatch => "identity_mismatch",
            Self::AmbiguousIdentity => "ambiguous_identity",
        }
    }

    /// Library error for callers that prefer `Result`.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::InvalidFormat => Error::InvalidInput("malformed code or identity".into()),
            Self::NotFound => Error::NotFound,
            Self::Expired => Error::Expired,
            Self::Inactive => Error::Inactive,
            Self::IdentityMismatch => Error::IdentityMismatch,
            Self::AmbiguousIdentity => Error::AmbiguousIdentity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub code_id: Uuid,
    pub owner_id: Uuid,
    pub scope: CodeScope,
    pub document_ref: Option<Uuid>,
}

impl From<&AccessCode> for AccessGrant {
    fn from(code: &AccessCode) -> Self {
        Self {
            code_id: code.id,
            owner_id: code.owner_id,
            scope: code.scope,
            document_ref: code.document_ref,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Granted(AccessGrant),
    Denied {
        reason: DenyReason,
        remaining_attempts: u32,
    },
    RateLimited {
        lockout_minutes: u64,
    },
}

impl ValidationOutcome {
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// The only reason a denied caller may see.
    #[must_use]
    pub fn public_reason(&self) -> Option<&'static str> {
        match self {
            Self::Granted(_) => None,
            Self::Denied { .. } => Some(PUBLIC_DENY_REASON),
            Self::RateLimited { .. } => Some(PUBLIC_RATE_LIMITED_REASON),
        }
    }

    /// # Errors
    /// Returns the error matching the deny reason, or `RateLimited`.
    pub fn into_result(self) -> Result<AccessGrant> {
        match self {
            Self::Granted(grant) => Ok(grant),
            Self::Denied { reason, .. } => Err(reason.into_error()),
            Self::RateLimited { lockout_minutes } => Err(Error::RateLimited { lockout_minutes }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupRequest {
    pub identity: IdentityInput,
    pub client_identifier: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Found { owner_id: Uuid },
    NotFound { remaining_attempts: u32 },
    RateLimited { lockout_minutes: u64 },
}

enum Verdict {
    Grant(AccessCode),
    Deny {
        reason: DenyReason,
        diagnostic: Option<String>,
    },
}

impl Verdict {
    fn deny(reason: DenyReason) -> Self {
        Self::Deny {
            reason,
            diagnostic: None,
        }
    }

    fn deny_with(reason: DenyReason, diagnostic: impl Into<String>) -> Self {
        Self::Deny {
            reason,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

fn add_days(base: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| base.checked_add_signed(delta))
        .ok_or_else(|| Error::InvalidInput(format!("{days} days is out of range")))
}

fn invalid_code() -> Error {
    Error::InvalidInput("access code must match ^[A-Z0-9]{6,12}$".into())
}

fn client_key(client_identifier: &str) -> &str {
    let client = client_identifier.trim();
    if client.is_empty() { UNKNOWN_CLIENT } else { client }
}

/// Issues, validates and administers access codes.
#[derive(Clone)]
pub struct AccessCodeManager {
    codes: Arc<dyn CodeStore>,
    profiles: Arc<dyn ProfileStore>,
    limiter: Arc<dyn RateLimiter>,
    audit: AuditEmitter,
    config: AccessConfig,
}

impl AccessCodeManager {
    #[must_use]
    pub fn new(
        codes: Arc<dyn CodeStore>,
        profiles: Arc<dyn ProfileStore>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            codes,
            profiles,
            limiter,
            audit: AuditEmitter::default(),
            config: AccessConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AccessConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditEmitter) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Issues a new code for `owner_id`.
    ///
    /// Personal codes are idempotent: an existing active one is returned as-is.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an Institution code without a document or with an
    /// expiry above the maximum, `Store` if no unique code could be drawn.
    #[instrument(skip(self, options))]
    pub async fn generate(
        &self,
        owner_id: Uuid,
        scope: CodeScope,
        options: &GenerateOptions,
    ) -> Result<AccessCode> {
        if scope == CodeScope::Personal
            && let Some(existing) = self.codes.find_active_personal(owner_id).await?
        {
            debug!("Returning existing personal code");
            return Ok(existing);
        }
        if scope == CodeScope::Institution && options.document_ref.is_none() {
            return Err(Error::InvalidInput(
                "institution codes require a document reference".into(),
            ));
        }

        let expires_at = self.expiry_for(scope, options.valid_for_days, Utc::now())?;
        for attempt in 1..=self.config.max_generation_attempts() {
            let candidate = AccessCode::new(
                generate_code(self.config.code_length()),
                owner_id,
                scope,
                options.document_ref,
                expires_at,
            );
            match self.codes.insert(&candidate).await? {
                InsertOutcome::Inserted => {
                    info!(code = %redact_code(&candidate.code), "Access code issued");
                    return Ok(candidate);
                }
                InsertOutcome::CodeTaken => debug!(attempt, "Generated code collided, retrying"),
                InsertOutcome::PersonalExists => {
                    if let Some(existing) = self.codes.find_active_personal(owner_id).await? {
                        return Ok(existing);
                    }
                }
            }
        }
        Err(self.exhausted())
    }

    /// Runs the full validation pipeline.
    ///
    /// Denials are outcomes, not errors. `Err` means a store failed.
    ///
    /// # Errors
    /// Returns `Store` if the limiter, code store or profile store fails.
    #[instrument(skip_all)]
    pub async fn validate(&self, request: &ValidationRequest) -> Result<ValidationOutcome> {
        let client = client_key(&request.client_identifier);
        let remaining_attempts = match self
            .limiter
            .check_and_record(client, RateLimitAction::AccessCode)
            .await?
        {
            AttemptDecision::Allowed { remaining_attempts } => remaining_attempts,
            AttemptDecision::Limited { lockout_minutes } => {
                self.audit
                    .emit(
                        AuditEvent::new(client, &request.code, AuditOutcome::RateLimited)
                            .with_reason(PUBLIC_RATE_LIMITED_REASON)
                            .with_diagnostic(format!("lockout {lockout_minutes} min")),
                    )
                    .await;
                return Ok(ValidationOutcome::RateLimited { lockout_minutes });
            }
        };

        let now = Utc::now();
        match self.inspect(&request.code, &request.identity, now).await? {
            Verdict::Grant(code) => {
                if let Err(err) = self.codes.record_usage(code.id, now).await {
                    warn!("Failed to record access code usage: {err}");
                }
                self.limiter
                    .record_success(client, RateLimitAction::AccessCode)
                    .await?;
                self.audit
                    .emit(AuditEvent::new(client, &code.code, AuditOutcome::Granted))
                    .await;
                Ok(ValidationOutcome::Granted(AccessGrant::from(&code)))
            }
            Verdict::Deny { reason, diagnostic } => {
                let mut event = AuditEvent::new(client, &request.code, AuditOutcome::Denied)
                    .with_reason(reason.as_str());
                if let Some(diagnostic) = diagnostic {
                    event = event.with_diagnostic(diagnostic);
                }
                self.audit.emit(event).await;
                Ok(ValidationOutcome::Denied {
                    reason,
                    remaining_attempts,
                })
            }
        }
    }

    async fn inspect(
        &self,
        raw_code: &str,
        identity: &IdentityInput,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        let Some(code) = normalize_code(raw_code) else {
            return Ok(Verdict::deny_with(DenyReason::InvalidFormat, "code format"));
        };
        let identity = if identity.is_empty() {
            None
        } else {
            match identity.validate(now.date_naive()) {
                Ok(identity) => Some(identity),
                Err(err) => return Ok(Verdict::deny_with(DenyReason::InvalidFormat, err.to_string())),
            }
        };

        let rows = self.codes.find_by_code(&code).await?;
        if rows.is_empty() {
            return Ok(Verdict::deny(DenyReason::NotFound));
        }
        let usable: Vec<AccessCode> = rows
            .iter()
            .filter(|row| row.ensure_usable(now).is_ok())
            .cloned()
            .collect();
        if usable.is_empty() {
            let reason = if rows.iter().any(|row| row.active) {
                DenyReason::Expired
            } else {
                DenyReason::Inactive
            };
            return Ok(Verdict::deny(reason));
        }

        match identity {
            Some(identity) => self.match_owner(usable, &identity).await,
            None if usable.len() > 1 => {
                warn!(rows = usable.len(), "Several active rows share one access code");
                Ok(Verdict::deny_with(
                    DenyReason::AmbiguousIdentity,
                    format!("{} active rows share the code", usable.len()),
                ))
            }
            None => Ok(usable
                .into_iter()
                .next()
                .map_or(Verdict::deny(DenyReason::NotFound), Verdict::Grant)),
        }
    }

    async fn match_owner(&self, usable: Vec<AccessCode>, identity: &ValidatedIdentity) -> Result<Verdict> {
        let mut profiles: Vec<Profile> = Vec::with_capacity(usable.len());
        for row in &usable {
            if profiles.iter().any(|profile| profile.owner_id == row.owner_id) {
                continue;
            }
            if let Some(profile) = self.profiles.get_profile(row.owner_id).await? {
                profiles.push(profile);
            }
        }
        if profiles.is_empty() {
            return Ok(Verdict::deny_with(DenyReason::IdentityMismatch, "owner profile missing"));
        }

        match match_any(identity, &profiles) {
            Ok(Some(profile)) => {
                let owner_id = profile.owner_id;
                Ok(usable
                    .into_iter()
                    .find(|row| row.owner_id == owner_id)
                    .map_or(Verdict::deny(DenyReason::NotFound), Verdict::Grant))
            }
            Ok(None) => {
                let diagnostic = match profiles.as_slice() {
                    [profile] => {
                        let result = match_identity(identity, profile);
                        format!("{} match: {}", result.verdict().as_str(), result.diagnostic())
                    }
                    candidates => format!("no match among {} owners", candidates.len()),
                };
                Ok(Verdict::deny_with(DenyReason::IdentityMismatch, diagnostic))
            }
            Err(Error::AmbiguousIdentity) => Ok(Verdict::deny_with(
                DenyReason::AmbiguousIdentity,
                format!("identity fully matches {} owners", profiles.len()),
            )),
            Err(err) => Err(err),
        }
    }

    /// Public lookup of an owner by name and birth date, rate limited separately
    /// from code validation.
    ///
    /// # Errors
    /// Returns `Store` if the limiter or profile store fails.
    #[instrument(skip_all)]
    pub async fn lookup_owner(&self, request: &LookupRequest) -> Result<LookupOutcome> {
        let client = client_key(&request.client_identifier);
        let remaining_attempts = match self
            .limiter
            .check_and_record(client, RateLimitAction::DirectoryLookup)
            .await?
        {
            AttemptDecision::Allowed { remaining_attempts } => remaining_attempts,
            AttemptDecision::Limited { lockout_minutes } => {
                self.audit
                    .emit(
                        AuditEvent::new(client, "", AuditOutcome::RateLimited)
                            .with_reason("directory_lookup"),
                    )
                    .await;
                return Ok(LookupOutcome::RateLimited { lockout_minutes });
            }
        };

        let found = match request.identity.validate(Utc::now().date_naive()) {
            Ok(identity) => {
                let candidates = self.profiles.find_by_birth_date(identity.birth_date).await?;
                match match_any(&identity, &candidates) {
                    Ok(found) => found.map(|profile| profile.owner_id),
                    Err(Error::AmbiguousIdentity) => None,
                    Err(err) => return Err(err),
                }
            }
            Err(_) => None,
        };

        match found {
            Some(owner_id) => {
                self.limiter
                    .record_success(client, RateLimitAction::DirectoryLookup)
                    .await?;
                self.audit
                    .emit(
                        AuditEvent::new(client, "", AuditOutcome::Granted)
                            .with_reason("directory_lookup"),
                    )
                    .await;
                Ok(LookupOutcome::Found { owner_id })
            }
            None => {
                self.audit
                    .emit(
                        AuditEvent::new(client, "", AuditOutcome::Denied)
                            .with_reason("directory_lookup"),
                    )
                    .await;
                Ok(LookupOutcome::NotFound { remaining_attempts })
            }
        }
    }

    /// Pushes the expiry of a Temporary or Institution code `additional_days`
    /// further, counting from now if it already lapsed.
    ///
    /// # Errors
    /// Returns `UnsupportedScope` for Personal codes, `Inactive` for revoked codes,
    /// `NotFound` for unknown codes and `InvalidInput` past the institution maximum.
    #[instrument(skip(self, raw_code))]
    pub async fn extend(&self, raw_code: &str, additional_days: u32) -> Result<DateTime<Utc>> {
        if additional_days == 0 {
            return Err(Error::InvalidInput("additional days must be positive".into()));
        }
        let row = self.active_row(raw_code).await?;
        if row.scope == CodeScope::Personal {
            return Err(Error::UnsupportedScope(row.scope));
        }

        let now = Utc::now();
        let base = row.expires_at.map_or(now, |expires_at| expires_at.max(now));
        let expires_at = add_days(base, additional_days)?;
        if row.scope == CodeScope::Institution {
            let cap = add_days(now, self.config.institution_max_days())?;
            if expires_at > cap {
                return Err(Error::InvalidInput(format!(
                    "institution codes expire at most {} days ahead",
                    self.config.institution_max_days()
                )));
            }
        }

        self.codes.set_expiry(row.id, Some(expires_at)).await?;
        info!(code = %redact_code(&row.code), %expires_at, "Access code extended");
        Ok(expires_at)
    }

    /// Replaces a code with a fresh one for the same owner and document. The old
    /// code stops validating in the same store operation.
    ///
    /// # Errors
    /// Returns `NotFound`/`Inactive` for unusable sources, `InvalidInput` for bad
    /// expiry options, `Store` if no unique code could be drawn.
    #[instrument(skip_all)]
    pub async fn regenerate(&self, raw_code: &str, options: &RegenerateOptions) -> Result<AccessCode> {
        let old = self.active_row(raw_code).await?;
        let expires_at = self.expiry_for(old.scope, options.valid_for_days, Utc::now())?;

        for attempt in 1..=self.config.max_generation_attempts() {
            let replacement = AccessCode::new(
                generate_code(self.config.code_length()),
                old.owner_id,
                old.scope,
                old.document_ref,
                expires_at,
            );
            match self.codes.replace(old.id, &replacement).await? {
                InsertOutcome::Inserted => {
                    info!(
                        old = %redact_code(&old.code),
                        new = %redact_code(&replacement.code),
                        "Access code regenerated"
                    );
                    return Ok(replacement);
                }
                InsertOutcome::CodeTaken | InsertOutcome::PersonalExists => {
                    debug!(attempt, "Replacement code collided, retrying");
                }
            }
        }
        Err(self.exhausted())
    }

    /// Deactivates every active row carrying the code. Revoking twice is a no-op.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown codes.
    #[instrument(skip_all)]
    pub async fn revoke(&self, raw_code: &str) -> Result<()> {
        let code = normalize_code(raw_code).ok_or_else(invalid_code)?;
        let rows = self.codes.find_by_code(&code).await?;
        if rows.is_empty() {
            return Err(Error::NotFound);
        }

        let mut revoked = 0_u32;
        for row in rows.iter().filter(|row| row.active) {
            if self.codes.deactivate(row.id).await? {
                revoked += 1;
            }
        }
        info!(code = %redact_code(&code), revoked, "Access code revoked");
        Ok(())
    }

    /// Codes of one owner, optionally filtered by scope.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    pub async fn list_for_owner(&self, owner_id: Uuid, scope: Option<CodeScope>) -> Result<Vec<AccessCode>> {
        self.codes.list_for_owner(owner_id, scope).await
    }

    async fn active_row(&self, raw_code: &str) -> Result<AccessCode> {
        let code = normalize_code(raw_code).ok_or_else(invalid_code)?;
        let rows = self.codes.find_by_code(&code).await?;
        if rows.is_empty() {
            return Err(Error::NotFound);
        }
        rows.into_iter().find(|row| row.active).ok_or(Error::Inactive)
    }

    fn expiry_for(
        &self,
        scope: CodeScope,
        days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let days = match scope {
            CodeScope::Personal => return Ok(None),
            CodeScope::Temporary => days.unwrap_or(self.config.temporary_days()),
            CodeScope::Institution => {
                let days = days.unwrap_or(self.config.institution_days());
                if days > self.config.institution_max_days() {
                    return Err(Error::InvalidInput(format!(
                        "institution codes expire at most {} days ahead",
                        self.config.institution_max_days()
                    )));
                }
                days
            }
        };
        if days == 0 {
            return Err(Error::InvalidInput("expiry must be at least one day".into()));
        }
        add_days(now, days).map(Some)
    }

    fn exhausted(&self) -> Error {
        Error::Store(anyhow!(
            "could not draw a unique access code in {} attempts",
            self.config.max_generation_attempts()
        ))
    }
}
