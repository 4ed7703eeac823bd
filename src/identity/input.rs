use crate::error::{Error, Result};
use crate::identity::normalize::{normalize_birth_date, normalize_name};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

/// Identity fields as a caller submits them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityInput {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub birth_date: Option<String>,
}

/// Identity fields that passed format validation, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    pub last_name: String,
    pub first_name: String,
    pub birth_date: NaiveDate,
}

pub(crate) fn valid_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-zÀ-ÿ\s\-']{1,50}$").is_ok_and(|regex| regex.is_match(name))
}

fn earliest_birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

impl IdentityInput {
    #[must_use]
    pub fn new(
        last_name: impl Into<String>,
        first_name: impl Into<String>,
        birth_date: impl Into<String>,
    ) -> Self {
        Self {
            last_name: Some(last_name.into()),
            first_name: Some(first_name.into()),
            birth_date: Some(birth_date.into()),
        }
    }

    /// True when no field carries any non-blank content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.last_name, &self.first_name, &self.birth_date]
            .iter()
            .all(|field| field.as_deref().is_none_or(|value| value.trim().is_empty()))
    }

    /// Checks field formats and returns the normalized identity.
    ///
    /// All three fields are required together. Birth dates must fall within
    /// `1900-01-01..=today`.
    ///
    /// # Errors
    /// Returns `InvalidInput` naming the first offending field.
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedIdentity> {
        let last_name = required_name(self.last_name.as_deref(), "lastName")?;
        let first_name = required_name(self.first_name.as_deref(), "firstName")?;

        let raw_birth = self
            .birth_date
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::InvalidInput("birthDate is required".into()))?;
        let birth_date = normalize_birth_date(raw_birth)
            .filter(|_| raw_birth.len() == 10)
            .ok_or_else(|| Error::InvalidInput("birthDate must be YYYY-MM-DD".into()))?;
        if birth_date < earliest_birth_date() || birth_date > today {
            return Err(Error::InvalidInput("birthDate is out of range".into()));
        }

        Ok(ValidatedIdentity {
            last_name,
            first_name,
            birth_date,
        })
    }
}

fn required_name(value: Option<&str>, field: &str) -> Result<String> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("{field} is required")))?;
    if !valid_name(value) {
        return Err(Error::InvalidInput(format!("{field} has an invalid format")));
    }
    let normalized = normalize_name(value);
    if normalized.is_empty() {
        return Err(Error::InvalidInput(format!("{field} has an invalid format")));
    }
    Ok(normalized)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn validate_normalizes_fields() {
        let identity = IdentityInput::new("Martínez", "  José ", "1963-08-13")
            .validate(today())
            .unwrap();
        assert_eq!(identity.last_name, "martinez");
        assert_eq!(identity.first_name, "jose");
        assert_eq!(identity.birth_date, NaiveDate::from_ymd_opt(1963, 8, 13).unwrap());
    }

    #[test]
    fn validate_accepts_hyphens_and_apostrophes() {
        assert!(IdentityInput::new("O'Brien-Lévy", "Anne Marie", "1980-01-01")
            .validate(today())
            .is_ok());
    }

    #[test]
    fn validate_rejects_bad_names() {
        for name in ["R2D2", "<script>", &"a".repeat(51), "   "] {
            let result = IdentityInput::new(name, "Jose", "1963-08-13").validate(today());
            assert!(matches!(result, Err(Error::InvalidInput(_))), "name: {name}");
        }
    }

    #[test]
    fn validate_rejects_bad_birth_dates() {
        for date in ["1899-12-31", "2026-10-20", "13/08/1963", "1963-08-13T00:00:00Z", ""] {
            let result = IdentityInput::new("Martinez", "Jose", date).validate(today());
            assert!(matches!(result, Err(Error::InvalidInput(_))), "date: {date}");
        }
    }

    #[test]
    fn validate_requires_every_field() {
        let input = IdentityInput {
            last_name: Some("Martinez".into()),
            first_name: None,
            birth_date: Some("1963-08-13".into()),
        };
        assert!(matches!(input.validate(today()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn is_empty_ignores_blank_fields() {
        assert!(IdentityInput::default().is_empty());
        let blank = IdentityInput {
            last_name: Some("  ".into()),
            ..IdentityInput::default()
        };
        assert!(blank.is_empty());
        assert!(!IdentityInput::new("a", "", "").is_empty());
    }
}
