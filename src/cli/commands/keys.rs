use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ENCRYPTION_KEY: &str = "encryption-key";
pub const ARG_ACTIVE_KEY_ID: &str = "active-key-id";
pub const ARG_LEGACY_KEY: &str = "legacy-key";

/// Key material for the encryption key ring.
#[derive(Debug)]
pub struct Options {
    /// `id:base64` specs, one per key ever used.
    pub specs: Vec<SecretString>,
    pub active_key_id: String,
    pub legacy_key: Option<SecretString>,
}

impl Options {
    /// Parse key ring arguments from matches.
    ///
    /// # Errors
    /// Returns an error if no key or no active key id was supplied.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let specs: Vec<SecretString> = matches
            .get_many::<String>(ARG_ENCRYPTION_KEY)
            .into_iter()
            .flatten()
            .map(|spec| spec.trim())
            .filter(|spec| !spec.is_empty())
            .map(SecretString::from)
            .collect();
        if specs.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_ENCRYPTION_KEY}");
        }

        let active_key_id = match matches.get_one::<String>(ARG_ACTIVE_KEY_ID) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_ACTIVE_KEY_ID}"),
        };

        let legacy_key = matches
            .get_one::<String>(ARG_LEGACY_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(SecretString::from);

        Ok(Self {
            specs,
            active_key_id,
            legacy_key,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENCRYPTION_KEY)
                .short('k')
                .long(ARG_ENCRYPTION_KEY)
                .help("Encryption key as id:base64, repeat for every key still needed to decrypt")
                .env("CAREKEY_ENCRYPTION_KEYS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACTIVE_KEY_ID)
                .long(ARG_ACTIVE_KEY_ID)
                .help("Id of the key used for new encryptions")
                .env("CAREKEY_ACTIVE_KEY_ID"),
        )
        .arg(
            Arg::new(ARG_LEGACY_KEY)
                .long(ARG_LEGACY_KEY)
                .help("Base64 key for ciphertexts written before versioned envelopes")
                .env("CAREKEY_LEGACY_KEY")
                .hide_env_values(true),
        )
}
