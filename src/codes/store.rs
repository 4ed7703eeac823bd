//! Persistence seam for access codes.

use crate::codes::model::{AccessCode, CodeScope};
use crate::error::{Error, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another active row already uses the code string.
    CodeTaken,
    /// The owner already has an active Personal code.
    PersonalExists,
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// # Errors
    /// Returns `Store` on backend failure. Uniqueness conflicts are outcomes, not errors.
    async fn insert(&self, code: &AccessCode) -> Result<InsertOutcome>;

    /// Deactivates `old_id` and inserts `replacement` as one unit. Nothing changes
    /// unless the outcome is `Inserted`.
    ///
    /// # Errors
    /// Returns `Inactive` if `old_id` is no longer active, `NotFound` if it does not exist.
    async fn replace(&self, old_id: Uuid, replacement: &AccessCode) -> Result<InsertOutcome>;

    /// Every row carrying `code`, active rows first.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    async fn find_by_code(&self, code: &str) -> Result<Vec<AccessCode>>;

    /// # Errors
    /// Returns `Store` on backend failure.
    async fn find_active_personal(&self, owner_id: Uuid) -> Result<Option<AccessCode>>;

    /// Codes of one owner, optionally restricted to a scope, newest first.
    ///
    /// # Errors
    /// Returns `Store` on backend failure.
    async fn list_for_owner(&self, owner_id: Uuid, scope: Option<CodeScope>) -> Result<Vec<AccessCode>>;

    /// # Errors
    /// Returns `NotFound` if the row does not exist.
    async fn set_expiry(&self, id: Uuid, expires_at: Option<DateTime<Utc>>) -> Result<()>;

    /// Returns `true` if the row was active before the call.
    ///
    /// # Errors
    /// Returns `NotFound` if the row does not exist.
    async fn deactivate(&self, id: Uuid) -> Result<bool>;

    /// # Errors
    /// Returns `Store` on backend failure.
    async fn record_usage(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// Store kept in process memory with the same uniqueness rules as the database.
#[derive(Default)]
pub struct InMemoryCodeStore {
    rows: Mutex<Vec<AccessCode>>,
}

impl InMemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<AccessCode>>> {
        self.rows
            .lock()
            .map_err(|_| Error::Store(anyhow!("Poisoned lock")))
    }

    fn conflict(rows: &[AccessCode], code: &AccessCode) -> Option<InsertOutcome> {
        let active = rows.iter().filter(|row| row.active && row.id != code.id);
        for row in active {
            if row.code == code.code {
                return Some(InsertOutcome::CodeTaken);
            }
            if code.scope == CodeScope::Personal
                && row.scope == CodeScope::Personal
                && row.owner_id == code.owner_id
            {
                return Some(InsertOutcome::PersonalExists);
            }
        }
        None
    }

    fn position(rows: &[AccessCode], id: Uuid) -> Result<usize> {
        rows.iter()
            .position(|row| row.id == id)
            .ok_or(Error::NotFound)
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn insert(&self, code: &AccessCode) -> Result<InsertOutcome> {
        let mut rows = self.lock()?;
        if let Some(outcome) = Self::conflict(&rows, code) {
            return Ok(outcome);
        }
        rows.push(code.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn replace(&self, old_id: Uuid, replacement: &AccessCode) -> Result<InsertOutcome> {
        let mut rows = self.lock()?;
        let index = Self::position(&rows, old_id)?;
        if !rows[index].active {
            return Err(Error::Inactive);
        }

        rows[index].active = false;
        if let Some(outcome) = Self::conflict(&rows, replacement) {
            rows[index].active = true;
            return Ok(outcome);
        }
        rows.push(replacement.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find_by_code(&self, code: &str) -> Result<Vec<AccessCode>> {
        let rows = self.lock()?;
        let mut found: Vec<AccessCode> = rows.iter().filter(|row| row.code == code).cloned().collect();
        found.sort_by_key(|row| (!row.active, std::cmp::Reverse(row.created_at)));
        Ok(found)
    }

    async fn find_active_personal(&self, owner_id: Uuid) -> Result<Option<AccessCode>> {
        let rows = self.lock()?;
        Ok(rows
            .iter()
            .find(|row| row.active && row.scope == CodeScope::Personal && row.owner_id == owner_id)
            .cloned())
    }

    async fn list_for_owner(&self, owner_id: Uuid, scope: Option<CodeScope>) -> Result<Vec<AccessCode>> {
        let rows = self.lock()?;
        let mut found: Vec<AccessCode> = rows
            .iter()
            .filter(|row| row.owner_id == owner_id && scope.is_none_or(|scope| row.scope == scope))
            .cloned()
            .collect();
        found.sort_by_key(|row| std::cmp::Reverse(row.created_at));
        Ok(found)
    }

    async fn set_expiry(&self, id: Uuid, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut rows = self.lock()?;
        let index = Self::position(&rows, id)?;
        rows[index].expires_at = expires_at;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.lock()?;
        let index = Self::position(&rows, id)?;
        let was_active = rows[index].active;
        rows[index].active = false;
        Ok(was_active)
    }

    async fn record_usage(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.lock()?;
        let index = Self::position(&rows, id)?;
        rows[index].usage_count += 1;
        rows[index].last_used_at = Some(at);
        Ok(())
    }
}
