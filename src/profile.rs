//! Identity records owned by the person a code belongs to.

use crate::error::{Error, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::{collections::HashMap, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub owner_id: Uuid,
    pub last_name: String,
    pub first_name: String,
    pub birth_date: NaiveDate,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// # Errors
    /// Returns `Store` on backend failure.
    async fn get_profile(&self, owner_id: Uuid) -> Result<Option<Profile>>;

    /// Candidates for a public lookup; matching on names happens in the caller.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    async fn find_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<Profile>>;
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl InMemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `Store` if the lock is poisoned.
    pub fn upsert(&self, profile: Profile) -> Result<()> {
        self.profiles
            .write()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))?
            .insert(profile.owner_id, profile);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, owner_id: Uuid) -> Result<Option<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))?;
        Ok(profiles.get(&owner_id).cloned())
    }

    async fn find_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))?;
        Ok(profiles
            .values()
            .filter(|profile| profile.birth_date == birth_date)
            .cloned()
            .collect())
    }
}
