//! Maps parsed CLI matches to the action the binary runs.

use crate::cli::actions::{Action, keygen, server};
use crate::cli::commands::{ARG_KEY_ID, CMD_KEYGEN, keys, policy};
use anyhow::{Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub_m) = matches.subcommand_matches(CMD_KEYGEN) {
        let key_id = sub_m
            .get_one::<String>(ARG_KEY_ID)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .context("missing required argument: --key-id")?;
        return Ok(Action::Keygen(keygen::Args { key_id }));
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());

    let keys = keys::Options::parse(matches)?;
    let policy = policy::Options::parse(matches)?;

    if policy.rate_limit_store == Some(policy::RateLimitStore::Postgres) && dsn.is_none() {
        anyhow::bail!("--rate-limit-store postgres requires --dsn");
    }

    Ok(Action::Server(server::Args {
        port,
        dsn,
        encryption_keys: keys.specs,
        active_key_id: keys.active_key_id,
        legacy_key: keys.legacy_key,
        access: policy.access,
        access_code_policy: policy.access_code_policy,
        rate_limit_store: policy.rate_limit_store,
        sweep_interval: policy.sweep_interval,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    const KEY_SPEC: &str = "2026-10:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn keygen_dispatches_without_server_args() {
        let matches =
            commands::new().get_matches_from(vec!["carekey", "keygen", "--key-id", "2026-10"]);
        let action = handler(&matches);
        assert!(matches!(action, Ok(Action::Keygen(ref args)) if args.key_id == "2026-10"));
    }

    #[test]
    fn server_without_dsn_uses_memory() {
        temp_env::with_vars(
            [
                ("CAREKEY_DSN", None::<&str>),
                ("CAREKEY_RATE_LIMIT_STORE", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "carekey",
                    "--encryption-key",
                    KEY_SPEC,
                    "--active-key-id",
                    "2026-10",
                ]);
                match handler(&matches) {
                    Ok(Action::Server(args)) => {
                        assert!(args.dsn.is_none());
                        assert_eq!(args.port, 8080);
                        assert_eq!(args.active_key_id, "2026-10");
                    }
                    other => panic!("unexpected dispatch: {other:?}"),
                }
            },
        );
    }

    #[test]
    fn postgres_limiter_requires_dsn() {
        temp_env::with_vars([("CAREKEY_DSN", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "carekey",
                "--encryption-key",
                KEY_SPEC,
                "--active-key-id",
                "2026-10",
                "--rate-limit-store",
                "postgres",
            ]);
            assert!(handler(&matches).is_err());
        });
    }
}
