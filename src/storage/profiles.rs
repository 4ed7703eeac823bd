use crate::error::Result;
use crate::profile::{Profile, ProfileStore};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

impl<'r> FromRow<'r, PgRow> for Profile {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            owner_id: row.try_get("owner_id")?,
            last_name: row.try_get("last_name")?,
            first_name: row.try_get("first_name")?,
            birth_date: row.try_get("birth_date")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get_profile(&self, owner_id: Uuid) -> Result<Option<Profile>> {
        let query = "SELECT owner_id, last_name, first_name, birth_date FROM profiles WHERE owner_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let profile = sqlx::query_as::<_, Profile>(query)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch profile")?;
        Ok(profile)
    }

    async fn find_by_birth_date(&self, birth_date: NaiveDate) -> Result<Vec<Profile>> {
        let query = "SELECT owner_id, last_name, first_name, birth_date FROM profiles WHERE birth_date = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let profiles = sqlx::query_as::<_, Profile>(query)
            .bind(birth_date)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch profiles by birth date")?;
        Ok(profiles)
    }
}
