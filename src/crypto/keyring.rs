use crate::crypto::cipher::KEY_LEN;
use crate::error::{Error, Result};
use anyhow::anyhow;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tracing::{info, instrument};
use zeroize::Zeroize;

/// Key id reported for payloads that predate envelopes.
pub const LEGACY_KEY_ID: &str = "legacy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Retired,
}

/// Symmetric key material plus its validity window. The secret never leaves the
/// crypto module.
#[derive(Debug)]
pub struct EncryptionKey {
    id: String,
    secret: SecretBox<[u8; KEY_LEN]>,
    status: KeyStatus,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
}

impl EncryptionKey {
    #[must_use]
    pub fn active(id: impl Into<String>, mut secret: [u8; KEY_LEN]) -> Self {
        let key = Self {
            id: id.into(),
            secret: SecretBox::new(Box::new(secret)),
            status: KeyStatus::Active,
            valid_from: Utc::now(),
            valid_until: None,
        };
        secret.zeroize();
        key
    }

    #[must_use]
    pub fn retired(id: impl Into<String>, secret: [u8; KEY_LEN]) -> Self {
        let mut key = Self::active(id, secret);
        key.status = KeyStatus::Retired;
        key
    }

    /// Parse an `id:base64` key spec into a retired key.
    ///
    /// # Errors
    /// Returns `Configuration` if the id is empty or the material is not 32 bytes of base64.
    pub fn from_spec(spec: &str) -> Result<Self> {
        let (id, material) = spec
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::Configuration("key spec must look like id:base64".into()))?;
        let id = id.trim();
        if id.is_empty() || id == LEGACY_KEY_ID {
            return Err(Error::Configuration(format!("invalid key id: {id:?}")));
        }
        let secret = decode_key_material(material)?;
        Ok(Self::retired(id, secret))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    #[must_use]
    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    #[must_use]
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    pub(crate) fn secret(&self) -> &[u8; KEY_LEN] {
        self.secret.expose_secret()
    }

    fn retire(&self, at: DateTime<Utc>) -> Self {
        Self {
            id: self.id.clone(),
            secret: SecretBox::new(Box::new(*self.secret.expose_secret())),
            status: KeyStatus::Retired,
            valid_from: self.valid_from,
            valid_until: Some(at),
        }
    }
}

/// Public view of a key, safe to log or return to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    pub id: String,
    pub status: KeyStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

struct KeyRingInner {
    keys: HashMap<String, Arc<EncryptionKey>>,
    active_id: String,
    legacy: Option<Arc<EncryptionKey>>,
}

/// Every key that may still be referenced by stored data, with exactly one active.
/// Keys are never removed; rotation only demotes.
pub struct KeyRing {
    inner: RwLock<KeyRingInner>,
}

impl KeyRing {
    /// # Errors
    /// Returns `Configuration` on duplicate ids or unless exactly one key is active.
    pub fn new(keys: Vec<EncryptionKey>, legacy: Option<EncryptionKey>) -> Result<Self> {
        let mut map = HashMap::with_capacity(keys.len());
        let mut active = Vec::new();

        for key in keys {
            if key.status == KeyStatus::Active {
                active.push(key.id.clone());
            }
            let id = key.id.clone();
            if map.insert(id.clone(), Arc::new(key)).is_some() {
                return Err(Error::Configuration(format!("duplicate key id: {id}")));
            }
        }

        let active_id = match active.as_slice() {
            [id] => id.clone(),
            [] => return Err(Error::Configuration("no active encryption key".into())),
            _ => {
                return Err(Error::Configuration(format!(
                    "more than one active encryption key: {}",
                    active.join(", ")
                )));
            }
        };

        Ok(Self {
            inner: RwLock::new(KeyRingInner {
                keys: map,
                active_id,
                legacy: legacy.map(Arc::new),
            }),
        })
    }

    /// Build a ring from `id:base64` specs, activating `active_id`.
    ///
    /// # Errors
    /// Returns `Configuration` if a spec is malformed or `active_id` is not among the specs.
    pub fn from_specs(specs: &[String], active_id: &str, legacy: Option<&str>) -> Result<Self> {
        let mut keys = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut key = EncryptionKey::from_spec(spec)?;
            if key.id == active_id {
                key.status = KeyStatus::Active;
            }
            keys.push(key);
        }

        if !keys.iter().any(|key| key.id == active_id) {
            return Err(Error::Configuration(format!(
                "active key id {active_id:?} not found among configured keys"
            )));
        }

        let legacy = legacy
            .map(|material| {
                decode_key_material(material).map(|secret| EncryptionKey::retired(LEGACY_KEY_ID, secret))
            })
            .transpose()?;

        Self::new(keys, legacy)
    }

    /// The key used for every new encryption.
    ///
    /// # Errors
    /// Returns an error if the ring lock is poisoned or the active key is missing.
    pub fn active(&self) -> Result<Arc<EncryptionKey>> {
        let inner = self.read()?;
        inner
            .keys
            .get(&inner.active_id)
            .cloned()
            .ok_or_else(|| Error::Configuration("no active encryption key".into()))
    }

    /// # Errors
    /// Returns an error if the ring lock is poisoned.
    pub fn active_key_id(&self) -> Result<String> {
        Ok(self.read()?.active_id.clone())
    }

    /// Look up any key, active or retired.
    ///
    /// # Errors
    /// Returns an error if the ring lock is poisoned.
    pub fn get(&self, key_id: &str) -> Result<Option<Arc<EncryptionKey>>> {
        Ok(self.read()?.keys.get(key_id).cloned())
    }

    /// # Errors
    /// Returns an error if the ring lock is poisoned.
    pub fn legacy(&self) -> Result<Option<Arc<EncryptionKey>>> {
        Ok(self.read()?.legacy.clone())
    }

    /// Ids of every key in the ring, oldest first.
    ///
    /// # Errors
    /// Returns an error if the ring lock is poisoned.
    pub fn key_ids(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.into_iter().map(|info| info.id).collect())
    }

    /// # Errors
    /// Returns an error if the ring lock is poisoned.
    pub fn snapshot(&self) -> Result<Vec<KeyInfo>> {
        let inner = self.read()?;
        let mut keys: Vec<KeyInfo> = inner
            .keys
            .values()
            .map(|key| KeyInfo {
                id: key.id.clone(),
                status: key.status,
                valid_from: key.valid_from,
                valid_until: key.valid_until,
            })
            .collect();
        keys.sort_by(|a, b| a.valid_from.cmp(&b.valid_from).then(a.id.cmp(&b.id)));
        Ok(keys)
    }

    /// Activates `new_key` and demotes the current active key to retired.
    ///
    /// # Errors
    /// Returns `Configuration` if the id is already present.
    #[instrument(skip(self, new_key), fields(new_key_id = %new_key.id))]
    pub fn rotate(&self, mut new_key: EncryptionKey) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))?;

        if inner.keys.contains_key(&new_key.id) {
            return Err(Error::Configuration(format!(
                "key id already exists: {}",
                new_key.id
            )));
        }

        let now = Utc::now();
        let previous_id = inner.active_id.clone();
        if let Some(previous) = inner.keys.get(&previous_id).cloned() {
            inner
                .keys
                .insert(previous_id.clone(), Arc::new(previous.retire(now)));
        }

        new_key.status = KeyStatus::Active;
        new_key.valid_from = now;
        new_key.valid_until = None;
        let new_id = new_key.id.clone();
        inner.keys.insert(new_id.clone(), Arc::new(new_key));
        inner.active_id = new_id;

        info!(previous_key_id = %previous_id, "Encryption key rotated");
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, KeyRingInner>> {
        self.inner
            .read()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))
    }
}

fn decode_key_material(material: &str) -> Result<[u8; KEY_LEN]> {
    let mut bytes = Base64::decode_vec(material.trim())
        .map_err(|_| Error::Configuration("key material is not valid base64".into()))?;
    let secret = <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        Error::Configuration(format!("key material must be {KEY_LEN} bytes"))
    });
    bytes.zeroize();
    secret
}

/// Fresh random key material formatted as an `id:base64` spec.
#[must_use]
pub fn generate_key_spec(key_id: &str) -> String {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    let spec = format!("{key_id}:{}", Base64::encode_string(&bytes));
    bytes.zeroize();
    spec
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spec(id: &str, byte: u8) -> String {
        format!("{id}:{}", Base64::encode_string(&[byte; KEY_LEN]))
    }

    #[test]
    fn new_requires_exactly_one_active_key() {
        let none = KeyRing::new(vec![EncryptionKey::retired("v1", [1; KEY_LEN])], None);
        assert!(matches!(none, Err(Error::Configuration(_))));

        let two = KeyRing::new(
            vec![
                EncryptionKey::active("v1", [1; KEY_LEN]),
                EncryptionKey::active("v2", [2; KEY_LEN]),
            ],
            None,
        );
        assert!(matches!(two, Err(Error::Configuration(_))));

        let one = KeyRing::new(vec![EncryptionKey::active("v1", [1; KEY_LEN])], None).unwrap();
        assert_eq!(one.active_key_id().unwrap(), "v1");
    }

    #[test]
    fn new_rejects_duplicate_ids() {
        let ring = KeyRing::new(
            vec![
                EncryptionKey::active("v1", [1; KEY_LEN]),
                EncryptionKey::retired("v1", [2; KEY_LEN]),
            ],
            None,
        );
        assert!(matches!(ring, Err(Error::Configuration(_))));
    }

    #[test]
    fn from_specs_activates_requested_key() {
        let ring = KeyRing::from_specs(&[spec("v1", 1), spec("v2", 2)], "v2", None).unwrap();
        assert_eq!(ring.active_key_id().unwrap(), "v2");
        assert_eq!(
            ring.get("v1").unwrap().map(|key| key.status()),
            Some(KeyStatus::Retired)
        );
        assert!(ring.legacy().unwrap().is_none());
    }

    #[test]
    fn from_specs_rejects_unknown_active_id() {
        let ring = KeyRing::from_specs(&[spec("v1", 1)], "v9", None);
        assert!(matches!(ring, Err(Error::Configuration(_))));
    }

    #[test]
    fn from_spec_rejects_bad_material() {
        assert!(EncryptionKey::from_spec("v1").is_err());
        assert!(EncryptionKey::from_spec("v1:not base64!").is_err());
        assert!(EncryptionKey::from_spec(&format!("v1:{}", Base64::encode_string(&[1; 16]))).is_err());
        assert!(EncryptionKey::from_spec(&spec(LEGACY_KEY_ID, 1)).is_err());
    }

    #[test]
    fn rotate_demotes_previous_key() {
        let ring = KeyRing::new(vec![EncryptionKey::active("v1", [1; KEY_LEN])], None).unwrap();
        ring.rotate(EncryptionKey::retired("v2", [2; KEY_LEN])).unwrap();

        assert_eq!(ring.active_key_id().unwrap(), "v2");
        let v1 = ring.get("v1").unwrap().unwrap();
        assert_eq!(v1.status(), KeyStatus::Retired);
        assert!(v1.valid_until().is_some());
        assert_eq!(ring.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn rotate_rejects_existing_id() {
        let ring = KeyRing::new(vec![EncryptionKey::active("v1", [1; KEY_LEN])], None).unwrap();
        assert!(ring.rotate(EncryptionKey::active("v1", [3; KEY_LEN])).is_err());
        assert_eq!(ring.active_key_id().unwrap(), "v1");
    }

    #[test]
    fn generated_spec_parses() {
        let spec = generate_key_spec("2026-10");
        let key = EncryptionKey::from_spec(&spec).unwrap();
        assert_eq!(key.id(), "2026-10");
    }

    #[test]
    fn debug_output_redacts_secret() {
        let key = EncryptionKey::active("v1", [0xAB; KEY_LEN]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("171, 171"));
    }
}
