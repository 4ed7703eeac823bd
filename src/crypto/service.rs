use crate::crypto::{
    cipher,
    envelope::{EncryptedPayload, FORMAT_VERSION, StoredPayload},
    keyring::{KeyRing, LEGACY_KEY_ID},
};
use crate::error::{Error, Result};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, instrument, warn};

/// Input accepted by [`EncryptionService::encrypt`].
#[derive(Debug, Clone, PartialEq)]
pub enum Plaintext {
    Text(String),
    Structured(Value),
}

impl From<&str> for Plaintext {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Plaintext {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for Plaintext {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Output of [`EncryptionService::decrypt`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decrypted {
    Text(String),
    Structured(Value),
}

impl Decrypted {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) => Value::String(text),
            Self::Structured(value) => value,
        }
    }
}

/// Symmetric encryption of protected document content under the key ring.
#[derive(Clone)]
pub struct EncryptionService {
    keys: Arc<KeyRing>,
}

impl EncryptionService {
    #[must_use]
    pub fn new(keys: Arc<KeyRing>) -> Self {
        Self { keys }
    }

    #[must_use]
    pub fn key_ring(&self) -> &KeyRing {
        &self.keys
    }

    /// Encrypts under the active key and wraps the result in an envelope.
    ///
    /// # Errors
    /// Returns `Configuration` if no key is active, `EncryptionFailed` on cipher failure.
    #[instrument(skip_all)]
    pub fn encrypt(&self, plaintext: &Plaintext) -> Result<EncryptedPayload> {
        let bytes = match plaintext {
            Plaintext::Text(text) => text.as_bytes().to_vec(),
            Plaintext::Structured(value) => {
                serde_json::to_vec(value).map_err(|_| Error::EncryptionFailed)?
            }
        };
        self.encrypt_bytes(&bytes)
    }

    /// Serializes any value to JSON and encrypts it.
    ///
    /// # Errors
    /// Same as [`Self::encrypt`].
    pub fn encrypt_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncryptedPayload> {
        let bytes = serde_json::to_vec(value).map_err(|_| Error::EncryptionFailed)?;
        self.encrypt_bytes(&bytes)
    }

    /// Decrypts an envelope or a legacy ciphertext.
    ///
    /// With `as_structured`, the plaintext is parsed as JSON; text that does not parse
    /// is returned as-is rather than failing the decryption.
    ///
    /// # Errors
    /// Returns `KeyNotFound` if the named key is unknown, `DecryptionFailed` if the
    /// ciphertext does not authenticate or is not UTF-8.
    #[instrument(skip_all, fields(key_id = payload.key_id().unwrap_or(LEGACY_KEY_ID)))]
    pub fn decrypt(&self, payload: &StoredPayload, as_structured: bool) -> Result<Decrypted> {
        let bytes = self.decrypt_bytes(payload)?;
        let text = String::from_utf8(bytes).map_err(|_| Error::DecryptionFailed)?;
        if as_structured {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => return Ok(Decrypted::Structured(value)),
                Err(err) => warn!("Decrypted payload is not structured, returning text: {err}"),
            }
        }
        Ok(Decrypted::Text(text))
    }

    /// Classifies a raw stored column value and decrypts it; blank input yields `None`.
    ///
    /// # Errors
    /// Same as [`Self::decrypt`].
    pub fn decrypt_raw(&self, raw: &str, as_structured: bool) -> Result<Option<Decrypted>> {
        match StoredPayload::parse(raw) {
            Some(payload) => self.decrypt(&payload, as_structured).map(Some),
            None => Ok(None),
        }
    }

    /// Decrypts `payload` and seals the same bytes under the active key. The caller
    /// persists the returned envelope in place of the old one.
    ///
    /// # Errors
    /// Returns `DecryptionFailed` if the source cannot be decrypted for any reason.
    #[instrument(skip_all, fields(key_id = payload.key_id().unwrap_or(LEGACY_KEY_ID)))]
    pub fn reencrypt_with_active_key(&self, payload: &StoredPayload) -> Result<EncryptedPayload> {
        let bytes = self.decrypt_bytes(payload).map_err(|err| {
            error!("Re-encryption source could not be decrypted: {err}");
            Error::DecryptionFailed
        })?;
        self.encrypt_bytes(&bytes)
    }

    fn encrypt_bytes(&self, bytes: &[u8]) -> Result<EncryptedPayload> {
        let key = self.keys.active()?;
        let sealed = cipher::seal(key.secret(), bytes, &cipher::envelope_aad(key.id()))?;
        Ok(EncryptedPayload::new(key.id(), &sealed, Utc::now()))
    }

    fn decrypt_bytes(&self, payload: &StoredPayload) -> Result<Vec<u8>> {
        match payload {
            StoredPayload::Envelope(envelope) => {
                if envelope.format_version != FORMAT_VERSION {
                    error!(
                        format_version = envelope.format_version,
                        "Unsupported envelope format version"
                    );
                    return Err(Error::DecryptionFailed);
                }
                let key = self
                    .keys
                    .get(&envelope.key_id)?
                    .ok_or_else(|| Error::KeyNotFound(envelope.key_id.clone()))?;
                let sealed = envelope.sealed_bytes()?;
                cipher::open(key.secret(), &sealed, &cipher::envelope_aad(key.id()))
            }
            StoredPayload::Legacy(ciphertext) => {
                let key = self
                    .keys
                    .legacy()?
                    .ok_or_else(|| Error::KeyNotFound(LEGACY_KEY_ID.to_string()))?;
                let sealed = Base64::decode_vec(ciphertext).map_err(|_| Error::DecryptionFailed)?;
                cipher::open(key.secret(), &sealed, &[])
            }
        }
    }
}
