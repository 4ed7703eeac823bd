use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Determines expiry and uniqueness rules of an access code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeScope {
    /// One active code per owner, never expires.
    Personal,
    Temporary,
    /// Bound to a single document, expiry capped.
    Institution,
}

impl CodeScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Temporary => "temporary",
            Self::Institution => "institution",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "personal" => Some(Self::Personal),
            "temporary" => Some(Self::Temporary),
            "institution" => Some(Self::Institution),
            _ => None,
        }
    }
}

impl fmt::Display for CodeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCode {
    pub id: Uuid,
    pub code: String,
    pub owner_id: Uuid,
    pub scope: CodeScope,
    /// `None` grants the owner's whole accessible set.
    pub document_ref: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccessCode {
    #[must_use]
    pub fn new(
        code: String,
        owner_id: Uuid,
        scope: CodeScope,
        document_ref: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            code,
            owner_id,
            scope,
            document_ref,
            expires_at,
            active: true,
            usage_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// # Errors
    /// Returns `Inactive` for revoked or replaced codes, `Expired` past `expires_at`.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.active {
            return Err(Error::Inactive);
        }
        if self.is_expired(now) {
            return Err(Error::Expired);
        }
        Ok(())
    }
}

/// Options for [`crate::codes::AccessCodeManager::generate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub document_ref: Option<Uuid>,
    /// Days until expiry; the scope default applies when absent. Ignored for Personal.
    pub valid_for_days: Option<u32>,
}

impl GenerateOptions {
    #[must_use]
    pub fn for_document(document_ref: Uuid) -> Self {
        Self {
            document_ref: Some(document_ref),
            valid_for_days: None,
        }
    }

    #[must_use]
    pub fn with_valid_for_days(mut self, days: u32) -> Self {
        self.valid_for_days = Some(days);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegenerateOptions {
    pub valid_for_days: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn scope_round_trips_through_db_value() {
        for scope in [CodeScope::Personal, CodeScope::Temporary, CodeScope::Institution] {
            assert_eq!(CodeScope::from_db(scope.as_str()), Some(scope));
        }
        assert_eq!(CodeScope::from_db("admin"), None);
    }

    #[test]
    fn usability_checks_active_before_expiry() {
        let now = Utc::now();
        let mut code = AccessCode::new(
            "7Q2K9XAB".into(),
            Uuid::new_v4(),
            CodeScope::Temporary,
            None,
            Some(now - TimeDelta::days(1)),
        );
        assert!(matches!(code.ensure_usable(now), Err(Error::Expired)));

        code.active = false;
        assert!(matches!(code.ensure_usable(now), Err(Error::Inactive)));
    }

    #[test]
    fn personal_codes_never_expire() {
        let code = AccessCode::new("ABCDEF12".into(), Uuid::new_v4(), CodeScope::Personal, None, None);
        assert!(code.ensure_usable(Utc::now() + TimeDelta::days(36_500)).is_ok());
    }
}
