use crate::error::{Error, Result};
use crate::identity::{input::ValidatedIdentity, normalize::normalize_name};
use crate::profile::Profile;
use serde::Serialize;
use tracing::warn;

/// Per-field comparison of a submitted identity against a stored profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMatchResult {
    pub last_name_match: bool,
    pub first_name_match: bool,
    pub birth_date_match: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchVerdict {
    Full,
    Partial,
    None,
}

impl MatchVerdict {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::None => "none",
        }
    }
}

impl IdentityMatchResult {
    #[must_use]
    pub fn all_match(&self) -> bool {
        self.last_name_match && self.first_name_match && self.birth_date_match
    }

    #[must_use]
    pub fn verdict(&self) -> MatchVerdict {
        let matched = [
            self.last_name_match,
            self.first_name_match,
            self.birth_date_match,
        ]
        .into_iter()
        .filter(|field| *field)
        .count();
        match matched {
            3 => MatchVerdict::Full,
            0 => MatchVerdict::None,
            _ => MatchVerdict::Partial,
        }
    }

    /// Operator-facing summary such as `lastName=ok firstName=ok birthDate=mismatch`.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let flag = |matched: bool| if matched { "ok" } else { "mismatch" };
        format!(
            "lastName={} firstName={} birthDate={}",
            flag(self.last_name_match),
            flag(self.first_name_match),
            flag(self.birth_date_match)
        )
    }
}

/// Compare two names after normalization.
///
/// Exact equality wins. Otherwise every input token must be a substring of, or
/// contain, some profile token, which tolerates middle names and partial
/// compound surnames. An empty input never matches.
#[must_use]
pub fn names_match(input: &str, stored: &str) -> bool {
    let input = normalize_name(input);
    let stored = normalize_name(stored);
    if input.is_empty() || stored.is_empty() {
        return false;
    }
    if input == stored {
        return true;
    }

    let stored_tokens: Vec<&str> = stored.split(' ').collect();
    input.split(' ').all(|token| {
        stored_tokens
            .iter()
            .any(|candidate| candidate.contains(token) || token.contains(candidate))
    })
}

#[must_use]
pub fn match_identity(input: &ValidatedIdentity, profile: &Profile) -> IdentityMatchResult {
    IdentityMatchResult {
        last_name_match: names_match(&input.last_name, &profile.last_name),
        first_name_match: names_match(&input.first_name, &profile.first_name),
        birth_date_match: input.birth_date == profile.birth_date,
    }
}

/// Find the single profile that fully matches `input`.
///
/// # Errors
/// Returns `AmbiguousIdentity` when more than one profile fully matches.
pub fn match_any<'a>(input: &ValidatedIdentity, profiles: &'a [Profile]) -> Result<Option<&'a Profile>> {
    let mut full = profiles
        .iter()
        .filter(|profile| match_identity(input, profile).all_match());

    let first = full.next();
    if first.is_some() && full.next().is_some() {
        warn!("Identity fully matches more than one profile");
        return Err(Error::AmbiguousIdentity);
    }
    Ok(first)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn profile(last: &str, first: &str, birth: (i32, u32, u32)) -> Profile {
        Profile {
            owner_id: Uuid::new_v4(),
            last_name: last.to_string(),
            first_name: first.to_string(),
            birth_date: NaiveDate::from_ymd_opt(birth.0, birth.1, birth.2).unwrap(),
        }
    }

    fn identity(last: &str, first: &str, birth: (i32, u32, u32)) -> ValidatedIdentity {
        ValidatedIdentity {
            last_name: normalize_name(last),
            first_name: normalize_name(first),
            birth_date: NaiveDate::from_ymd_opt(birth.0, birth.1, birth.2).unwrap(),
        }
    }

    #[test]
    fn accents_and_spacing_are_ignored() {
        assert!(names_match("jose   martinez", "José Martínez"));
        assert!(names_match("MARTINEZ", "martínez"));
    }

    #[test]
    fn token_rule_is_permissive() {
        assert!(names_match("Jean", "Jean-Pierre"));
        assert!(names_match("Garcia", "García Lopez"));
        assert!(!names_match("Garcia Lopez", "García"));
        assert!(names_match("Mari", "Maria Luisa"));
        assert!(!names_match("Pedro", "Maria Luisa"));
        assert!(!names_match("Maria Pedro", "Maria Luisa"));
    }

    #[test]
    fn empty_input_never_matches() {
        assert!(!names_match("", "Martinez"));
        assert!(!names_match("   ", ""));
    }

    #[test]
    fn verdicts() {
        let stored = profile("Martínez", "José", (1963, 8, 13));

        let full = match_identity(&identity("martinez", "jose", (1963, 8, 13)), &stored);
        assert!(full.all_match());
        assert_eq!(full.verdict(), MatchVerdict::Full);

        let partial = match_identity(&identity("martinez", "jose", (1964, 1, 1)), &stored);
        assert!(!partial.all_match());
        assert_eq!(partial.verdict(), MatchVerdict::Partial);
        assert_eq!(
            partial.diagnostic(),
            "lastName=ok firstName=ok birthDate=mismatch"
        );

        let none = match_identity(&identity("smith", "anna", (1990, 2, 2)), &stored);
        assert_eq!(none.verdict(), MatchVerdict::None);
    }

    #[test]
    fn match_any_finds_single_owner() {
        let profiles = vec![
            profile("Smith", "Anna", (1990, 2, 2)),
            profile("Martínez", "José", (1963, 8, 13)),
        ];
        let found = match_any(&identity("martinez", "jose", (1963, 8, 13)), &profiles).unwrap();
        assert_eq!(found.map(|p| p.owner_id), Some(profiles[1].owner_id));

        let missing = match_any(&identity("doe", "jane", (1970, 1, 1)), &profiles).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn match_any_surfaces_duplicates() {
        let profiles = vec![
            profile("Martínez", "José", (1963, 8, 13)),
            profile("Martinez", "Jose", (1963, 8, 13)),
        ];
        let result = match_any(&identity("martinez", "jose", (1963, 8, 13)), &profiles);
        assert!(matches!(result, Err(Error::AmbiguousIdentity)));
    }
}
