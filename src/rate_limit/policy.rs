use serde::Serialize;
use std::{fmt, time::Duration};

const MINUTE: u64 = 60;

/// Attempt class. Each class has its own policy and its own counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    Login,
    AccessCode,
    DirectoryLookup,
}

impl RateLimitAction {
    pub const ALL: [Self; 3] = [Self::Login, Self::AccessCode, Self::DirectoryLookup];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::AccessCode => "access_code",
            Self::DirectoryLookup => "directory_lookup",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value)
    }

    /// Storage key for an identifier within this class.
    #[must_use]
    pub fn key(self, identifier: &str) -> String {
        format!("{}:{identifier}", self.as_str())
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, window: Duration, lockout: Duration) -> Self {
        Self {
            max_attempts,
            window,
            lockout,
        }
    }
}

pub const DEFAULT_LOGIN_POLICY: RateLimitPolicy = RateLimitPolicy::new(
    5,
    Duration::from_secs(15 * MINUTE),
    Duration::from_secs(15 * MINUTE),
);
pub const DEFAULT_ACCESS_CODE_POLICY: RateLimitPolicy = RateLimitPolicy::new(
    5,
    Duration::from_secs(15 * MINUTE),
    Duration::from_secs(30 * MINUTE),
);
pub const DEFAULT_DIRECTORY_LOOKUP_POLICY: RateLimitPolicy = RateLimitPolicy::new(
    5,
    Duration::from_secs(15 * MINUTE),
    Duration::from_secs(30 * MINUTE),
);

/// Policies per action class.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    login: RateLimitPolicy,
    access_code: RateLimitPolicy,
    directory_lookup: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: DEFAULT_LOGIN_POLICY,
            access_code: DEFAULT_ACCESS_CODE_POLICY,
            directory_lookup: DEFAULT_DIRECTORY_LOOKUP_POLICY,
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_login(mut self, policy: RateLimitPolicy) -> Self {
        self.login = policy;
        self
    }

    #[must_use]
    pub fn with_access_code(mut self, policy: RateLimitPolicy) -> Self {
        self.access_code = policy;
        self
    }

    #[must_use]
    pub fn with_directory_lookup(mut self, policy: RateLimitPolicy) -> Self {
        self.directory_lookup = policy;
        self
    }

    #[must_use]
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        match action {
            RateLimitAction::Login => self.login,
            RateLimitAction::AccessCode => self.access_code,
            RateLimitAction::DirectoryLookup => self.directory_lookup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_per_action() {
        let config = RateLimitConfig::default();
        let login = config.policy(RateLimitAction::Login);
        assert_eq!(login.max_attempts, 5);
        assert_eq!(login.lockout, Duration::from_secs(900));

        let code = config.policy(RateLimitAction::AccessCode);
        assert_eq!(code.window, Duration::from_secs(900));
        assert_eq!(code.lockout, Duration::from_secs(1800));

        let lookup = config.policy(RateLimitAction::DirectoryLookup);
        assert_eq!(lookup.lockout, Duration::from_secs(1800));
    }

    #[test]
    fn builder_overrides_one_action() {
        let strict = RateLimitPolicy::new(2, Duration::from_secs(60), Duration::from_secs(60));
        let config = RateLimitConfig::new().with_access_code(strict);
        assert_eq!(config.policy(RateLimitAction::AccessCode), strict);
        assert_eq!(config.policy(RateLimitAction::Login), DEFAULT_LOGIN_POLICY);
    }

    #[test]
    fn action_keys_are_prefixed() {
        assert_eq!(RateLimitAction::AccessCode.key("10.0.0.1"), "access_code:10.0.0.1");
        assert_eq!(
            RateLimitAction::from_db("directory_lookup"),
            Some(RateLimitAction::DirectoryLookup)
        );
        assert_eq!(RateLimitAction::from_db("signup"), None);
    }
}
