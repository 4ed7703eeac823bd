use crate::codes::{AccessConfig, config};
use crate::rate_limit::{RateLimitPolicy, policy::DEFAULT_ACCESS_CODE_POLICY};
use clap::{Arg, ArgMatches, Command, builder::PossibleValuesParser};
use std::time::Duration;

pub const ARG_CODE_LENGTH: &str = "code-length";
pub const ARG_TEMPORARY_DAYS: &str = "temporary-days";
pub const ARG_INSTITUTION_DAYS: &str = "institution-days";
pub const ARG_INSTITUTION_MAX_DAYS: &str = "institution-max-days";
pub const ARG_MAX_ATTEMPTS: &str = "max-attempts";
pub const ARG_LOCKOUT_MINUTES: &str = "lockout-minutes";
pub const ARG_RATE_LIMIT_STORE: &str = "rate-limit-store";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitStore {
    Memory,
    Postgres,
}

/// Code issuance and brute-force settings.
#[derive(Debug)]
pub struct Options {
    pub access: AccessConfig,
    pub access_code_policy: RateLimitPolicy,
    /// `None` picks Postgres when a DSN is configured.
    pub rate_limit_store: Option<RateLimitStore>,
    pub sweep_interval: Duration,
}

impl Options {
    /// Parse policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the resulting access configuration is invalid.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let access = AccessConfig::new()
            .with_code_length(
                matches
                    .get_one::<usize>(ARG_CODE_LENGTH)
                    .copied()
                    .unwrap_or(config::DEFAULT_CODE_LENGTH),
            )
            .with_temporary_days(
                matches
                    .get_one::<u32>(ARG_TEMPORARY_DAYS)
                    .copied()
                    .unwrap_or(config::DEFAULT_TEMPORARY_DAYS),
            )
            .with_institution_days(
                matches
                    .get_one::<u32>(ARG_INSTITUTION_DAYS)
                    .copied()
                    .unwrap_or(config::DEFAULT_INSTITUTION_DAYS),
            )
            .with_institution_max_days(
                matches
                    .get_one::<u32>(ARG_INSTITUTION_MAX_DAYS)
                    .copied()
                    .unwrap_or(config::DEFAULT_INSTITUTION_MAX_DAYS),
            );
        access.validate()?;

        let max_attempts = matches
            .get_one::<u32>(ARG_MAX_ATTEMPTS)
            .copied()
            .unwrap_or(DEFAULT_ACCESS_CODE_POLICY.max_attempts);
        let lockout = matches
            .get_one::<u64>(ARG_LOCKOUT_MINUTES)
            .map_or(DEFAULT_ACCESS_CODE_POLICY.lockout, |minutes| {
                Duration::from_secs(minutes.saturating_mul(60))
            });
        let access_code_policy =
            RateLimitPolicy::new(max_attempts, DEFAULT_ACCESS_CODE_POLICY.window, lockout);

        let rate_limit_store = matches
            .get_one::<String>(ARG_RATE_LIMIT_STORE)
            .map(|store| match store.as_str() {
                "postgres" => RateLimitStore::Postgres,
                _ => RateLimitStore::Memory,
            });

        let sweep_interval = Duration::from_secs(
            matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(300),
        );

        Ok(Self {
            access,
            access_code_policy,
            rate_limit_store,
            sweep_interval,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CODE_LENGTH)
                .long(ARG_CODE_LENGTH)
                .help("Length of generated access codes (6-12)")
                .env("CAREKEY_CODE_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_TEMPORARY_DAYS)
                .long(ARG_TEMPORARY_DAYS)
                .help("Default lifetime of temporary codes in days")
                .env("CAREKEY_TEMPORARY_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_INSTITUTION_DAYS)
                .long(ARG_INSTITUTION_DAYS)
                .help("Default lifetime of institution codes in days")
                .env("CAREKEY_INSTITUTION_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_INSTITUTION_MAX_DAYS)
                .long(ARG_INSTITUTION_MAX_DAYS)
                .help("Upper bound on institution code lifetime in days")
                .env("CAREKEY_INSTITUTION_MAX_DAYS")
                .default_value("90")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Failed validations allowed per client within 15 minutes")
                .env("CAREKEY_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_MINUTES)
                .long(ARG_LOCKOUT_MINUTES)
                .help("Lockout after too many failed validations, in minutes")
                .env("CAREKEY_LOCKOUT_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_STORE)
                .long(ARG_RATE_LIMIT_STORE)
                .help("Where attempt counters live; memory is only safe for a single instance")
                .env("CAREKEY_RATE_LIMIT_STORE")
                .value_parser(PossibleValuesParser::new(["memory", "postgres"])),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("How often stale attempt counters are purged")
                .env("CAREKEY_SWEEP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
