//! # Carekey (Access Codes & Protected Content)
//!
//! `carekey` decides one question per request: does this access code, together with
//! the identity fields the caller supplied, currently grant access to a person's
//! directive documents? It also owns the lifecycle of those codes and of the keys
//! that encrypt the documents at rest.
//!
//! ## Validation Pipeline
//!
//! 1. The brute-force guard is consulted first and records the attempt.
//! 2. The code is normalized (`[A-Z0-9]{6,12}`), looked up and checked for
//!    revocation and expiry.
//! 3. If a name / birth date triple was supplied it is compared against the owner's
//!    profile (diacritic-insensitive, token tolerant).
//! 4. Success clears the attempt counter; every denial has already been counted.
//!
//! Denied callers always see the same generic reason. Rate limiting is the only
//! outcome reported in detail because it reveals nothing about the data. The precise
//! cause (e.g. "name matched, birth date did not") only reaches the audit sink.
//!
//! ## Access Code Scopes
//!
//! - **Personal:** one active code per owner, never expires.
//! - **Temporary:** explicit expiry.
//! - **Institution:** bound to one document, expiry capped by configuration.
//!
//! Codes are never edited in place. Regeneration deactivates the old row and inserts
//! a new one in the same transaction.
//!
//! ## Encryption At Rest
//!
//! Payloads are sealed with `ChaCha20-Poly1305` under the active key of a key ring
//! and wrapped in a versioned envelope naming the key. Retired keys keep decrypting
//! forever. Bare ciphertexts written before envelopes existed decrypt with the
//! grandfathered legacy key.
//!
//! ## Scaling
//!
//! The in-memory attempt store is only correct for a single instance. Deployments
//! with more than one instance must use the Postgres-backed limiter so the lockout
//! holds across the fleet.

pub mod api;
pub mod audit;
pub mod cli;
pub mod codes;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod profile;
pub mod rate_limit;
pub mod storage;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
