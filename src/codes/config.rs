use crate::error::{Error, Result};

pub const MIN_CODE_LENGTH: usize = 6;
pub const MAX_CODE_LENGTH: usize = 12;
pub const DEFAULT_CODE_LENGTH: usize = 8;
pub const DEFAULT_TEMPORARY_DAYS: u32 = 7;
pub const DEFAULT_INSTITUTION_DAYS: u32 = 30;
pub const DEFAULT_INSTITUTION_MAX_DAYS: u32 = 90;
pub const DEFAULT_MAX_GENERATION_ATTEMPTS: u32 = 16;

/// Code lifecycle policy.
#[derive(Clone, Debug)]
pub struct AccessConfig {
    code_length: usize,
    temporary_days: u32,
    institution_days: u32,
    institution_max_days: u32,
    max_generation_attempts: u32,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            temporary_days: DEFAULT_TEMPORARY_DAYS,
            institution_days: DEFAULT_INSTITUTION_DAYS,
            institution_max_days: DEFAULT_INSTITUTION_MAX_DAYS,
            max_generation_attempts: DEFAULT_MAX_GENERATION_ATTEMPTS,
        }
    }
}

impl AccessConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    #[must_use]
    pub fn with_temporary_days(mut self, days: u32) -> Self {
        self.temporary_days = days;
        self
    }

    #[must_use]
    pub fn with_institution_days(mut self, days: u32) -> Self {
        self.institution_days = days;
        self
    }

    #[must_use]
    pub fn with_institution_max_days(mut self, days: u32) -> Self {
        self.institution_max_days = days;
        self
    }

    #[must_use]
    pub fn with_max_generation_attempts(mut self, attempts: u32) -> Self {
        self.max_generation_attempts = attempts;
        self
    }

    #[must_use]
    pub fn code_length(&self) -> usize {
        self.code_length
    }

    #[must_use]
    pub fn temporary_days(&self) -> u32 {
        self.temporary_days
    }

    #[must_use]
    pub fn institution_days(&self) -> u32 {
        self.institution_days
    }

    #[must_use]
    pub fn institution_max_days(&self) -> u32 {
        self.institution_max_days
    }

    #[must_use]
    pub fn max_generation_attempts(&self) -> u32 {
        self.max_generation_attempts
    }

    /// # Errors
    /// Returns `Configuration` for a code length outside 6..=12, zero-day expiries,
    /// an institution default above the maximum or zero generation attempts.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&self.code_length) {
            return Err(Error::Configuration(format!(
                "code length must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}, got {}",
                self.code_length
            )));
        }
        if self.temporary_days == 0 || self.institution_days == 0 {
            return Err(Error::Configuration("default expiry must be at least one day".into()));
        }
        if self.institution_days > self.institution_max_days {
            return Err(Error::Configuration(format!(
                "institution default ({} days) exceeds the maximum ({} days)",
                self.institution_days, self.institution_max_days
            )));
        }
        if self.max_generation_attempts == 0 {
            return Err(Error::Configuration(
                "max generation attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AccessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.code_length(), 8);
        assert_eq!(config.institution_max_days(), 90);
    }

    #[test]
    fn rejects_out_of_range_length() {
        assert!(AccessConfig::new().with_code_length(5).validate().is_err());
        assert!(AccessConfig::new().with_code_length(13).validate().is_err());
        assert!(AccessConfig::new().with_code_length(12).validate().is_ok());
    }

    #[test]
    fn rejects_institution_default_above_max() {
        let config = AccessConfig::new()
            .with_institution_days(120)
            .with_institution_max_days(90);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }
}
