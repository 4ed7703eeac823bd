//! Encryption of protected content at rest.
//!
//! ## Key Rotation
//!
//! The key ring holds every key that stored data may still reference. Exactly one
//! key is active and used for new envelopes; rotation demotes it to retired but
//! keeps its material, so older envelopes keep decrypting. Migrations call
//! `reencrypt_with_active_key` and persist the replacement envelope.
//!
//! > **Warning:** Never drop a retired key from configuration while any stored
//! > envelope still names it. That content becomes unrecoverable (`KeyNotFound`).

pub mod cipher;
pub mod envelope;
pub mod keyring;
pub mod service;

pub use envelope::{EncryptedPayload, FORMAT_VERSION, StoredPayload};
pub use keyring::{EncryptionKey, KeyInfo, KeyRing, KeyStatus, LEGACY_KEY_ID, generate_key_spec};
pub use service::{Decrypted, EncryptionService, Plaintext};
