//! Stored forms of encrypted content.
//!
//! Current payloads are JSON envelopes naming the key that sealed them. Content
//! written before key rotation existed is a bare base64 string with no metadata.

use crate::error::{Error, Result};
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u8 = 1;

/// Envelope written for every new encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub key_id: String,
    /// Base64 of `nonce || ciphertext`.
    pub ciphertext: String,
    #[serde(alias = "version")]
    pub format_version: u8,
    pub timestamp: DateTime<Utc>,
}

impl EncryptedPayload {
    pub(crate) fn new(key_id: &str, sealed: &[u8], timestamp: DateTime<Utc>) -> Self {
        Self {
            key_id: key_id.to_string(),
            ciphertext: Base64::encode_string(sealed),
            format_version: FORMAT_VERSION,
            timestamp,
        }
    }

    /// Serialize for persistence.
    ///
    /// # Errors
    /// Returns `EncryptionFailed` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|_| Error::EncryptionFailed)
    }

    pub(crate) fn sealed_bytes(&self) -> Result<Vec<u8>> {
        Base64::decode_vec(&self.ciphertext).map_err(|_| Error::DecryptionFailed)
    }
}

/// Any value found in a protected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    Envelope(EncryptedPayload),
    /// Bare base64 ciphertext sealed with the legacy key and no AAD.
    Legacy(String),
}

impl StoredPayload {
    /// Classify a raw stored value. Anything that does not parse as an envelope is
    /// legacy; returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if raw.starts_with('{')
            && let Ok(envelope) = serde_json::from_str::<EncryptedPayload>(raw)
        {
            return Some(Self::Envelope(envelope));
        }

        Some(Self::Legacy(raw.to_string()))
    }

    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Envelope(envelope) => Some(&envelope.key_id),
            Self::Legacy(_) => None,
        }
    }
}

impl From<EncryptedPayload> for StoredPayload {
    fn from(envelope: EncryptedPayload) -> Self {
        Self::Envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn envelope_json_uses_camel_case() {
        let envelope = EncryptedPayload::new("v1", b"sealed", Utc::now());
        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"keyId\":\"v1\""));
        assert!(json.contains("\"formatVersion\":1"));

        assert_eq!(
            StoredPayload::parse(&json),
            Some(StoredPayload::Envelope(envelope))
        );
    }

    #[test]
    fn version_alias_is_accepted() {
        let json = r#"{"keyId":"v2","ciphertext":"AAAA","version":1,"timestamp":"2024-05-01T10:00:00Z"}"#;
        let parsed = StoredPayload::parse(json);
        assert_eq!(parsed.as_ref().and_then(StoredPayload::key_id), Some("v2"));
    }

    #[test]
    fn malformed_envelope_is_legacy() {
        assert_eq!(
            StoredPayload::parse("{\"keyId\": broken"),
            Some(StoredPayload::Legacy("{\"keyId\": broken".to_string()))
        );
        assert_eq!(
            StoredPayload::parse("  c2VhbGVk  "),
            Some(StoredPayload::Legacy("c2VhbGVk".to_string()))
        );
    }

    #[test]
    fn blank_input_is_none() {
        assert_eq!(StoredPayload::parse("   "), None);
    }
}
