//! Error taxonomy shared by every component.
//!
//! `NotFound`, `Expired`, `Inactive` and `IdentityMismatch` are expected and
//! user-recoverable. `KeyNotFound` and `DecryptionFailed` are data-integrity errors
//! for operators. `Configuration` is fatal and must stop startup.

use crate::codes::CodeScope;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("access code not found")]
    NotFound,
    #[error("access code expired")]
    Expired,
    #[error("access code inactive")]
    Inactive,
    #[error("identity does not match the code owner")]
    IdentityMismatch,
    #[error("rate limited, retry in {lockout_minutes} minute(s)")]
    RateLimited { lockout_minutes: u64 },
    #[error("unknown encryption key: {0}")]
    KeyNotFound(String),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation not supported for {0} codes")]
    UnsupportedScope(CodeScope),
    #[error("more than one profile fully matches the supplied identity")]
    AmbiguousIdentity,
    #[error("datastore error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    /// Errors that mean stored content cannot be recovered and need an operator.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::KeyNotFound(_) | Self::DecryptionFailed)
    }
}
