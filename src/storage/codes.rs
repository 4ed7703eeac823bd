use crate::codes::{AccessCode, CodeScope, CodeStore, InsertOutcome};
use crate::error::{Error, Result};
use crate::storage::{is_unique_violation, violated_constraint};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

const PERSONAL_INDEX: &str = "access_codes_active_personal_key";

fn scope_from_db(value: &str) -> Result<CodeScope, sqlx::Error> {
    CodeScope::from_db(value).ok_or_else(|| {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid access_codes.scope value: {value}"),
        )))
    })
}

impl<'r> FromRow<'r, PgRow> for AccessCode {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let scope: String = row.try_get("scope")?;
        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            owner_id: row.try_get("owner_id")?,
            scope: scope_from_db(&scope)?,
            document_ref: row.try_get("document_ref")?,
            expires_at: row.try_get("expires_at")?,
            active: row.try_get("active")?,
            usage_count: row.try_get("usage_count")?,
            last_used_at: row.try_get("last_used_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Unique violations are expected outcomes; the index name tells which one.
fn conflict_outcome(err: &sqlx::Error) -> InsertOutcome {
    if violated_constraint(err) == Some(PERSONAL_INDEX) {
        InsertOutcome::PersonalExists
    } else {
        InsertOutcome::CodeTaken
    }
}

async fn insert_row<'e, E: PgExecutor<'e>>(executor: E, code: &AccessCode) -> Result<(), sqlx::Error> {
    let query = r"
        INSERT INTO access_codes
            (id, code, owner_id, scope, document_ref, expires_at, active, usage_count, last_used_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(code.id)
        .bind(&code.code)
        .bind(code.owner_id)
        .bind(code.scope.as_str())
        .bind(code.document_ref)
        .bind(code.expires_at)
        .bind(code.active)
        .bind(code.usage_count)
        .bind(code.last_used_at)
        .bind(code.created_at)
        .execute(executor)
        .instrument(span)
        .await?;
    Ok(())
}

/// Document store for access codes, backed by `access_codes`.
#[derive(Clone, Debug)]
pub struct PgCodeStore {
    pool: PgPool,
}

impl PgCodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let query = "SELECT 1 FROM access_codes WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check access code")?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn insert(&self, code: &AccessCode) -> Result<InsertOutcome> {
        match insert_row(&self.pool, code).await {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(conflict_outcome(&err)),
            Err(err) => Err(Error::Store(anyhow!(err).context("failed to insert access code"))),
        }
    }

    async fn replace(&self, old_id: Uuid, replacement: &AccessCode) -> Result<InsertOutcome> {
        // Deactivation and insert commit together so two codes are never live at once.
        let mut tx = self.pool.begin().await.context("begin replace transaction")?;

        let query = "UPDATE access_codes SET active = FALSE WHERE id = $1 AND active";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let deactivated = sqlx::query(query)
            .bind(old_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to deactivate access code")?
            .rows_affected();
        if deactivated == 0 {
            let _ = tx.rollback().await;
            return Err(if self.exists(old_id).await? {
                Error::Inactive
            } else {
                Error::NotFound
            });
        }

        match insert_row(&mut *tx, replacement).await {
            Ok(()) => {
                tx.commit().await.context("commit replace transaction")?;
                Ok(InsertOutcome::Inserted)
            }
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
                Ok(conflict_outcome(&err))
            }
            Err(err) => Err(Error::Store(anyhow!(err).context("failed to insert replacement code"))),
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Vec<AccessCode>> {
        let query = r"
            SELECT * FROM access_codes
            WHERE code = $1
            ORDER BY active DESC, created_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query_as::<_, AccessCode>(query)
            .bind(code)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch access code")?;
        Ok(rows)
    }

    async fn find_active_personal(&self, owner_id: Uuid) -> Result<Option<AccessCode>> {
        let query = r"
            SELECT * FROM access_codes
            WHERE owner_id = $1 AND scope = 'personal' AND active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query_as::<_, AccessCode>(query)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch personal code")?;
        Ok(row)
    }

    async fn list_for_owner(&self, owner_id: Uuid, scope: Option<CodeScope>) -> Result<Vec<AccessCode>> {
        let query = r"
            SELECT * FROM access_codes
            WHERE owner_id = $1 AND ($2::text IS NULL OR scope = $2)
            ORDER BY created_at DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query_as::<_, AccessCode>(query)
            .bind(owner_id)
            .bind(scope.map(CodeScope::as_str))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list access codes")?;
        Ok(rows)
    }

    async fn set_expiry(&self, id: Uuid, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let query = "UPDATE access_codes SET expires_at = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let updated = sqlx::query(query)
            .bind(id)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update access code expiry")?
            .rows_affected();
        if updated == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE access_codes SET active = FALSE WHERE id = $1 AND active";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let updated = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to deactivate access code")?
            .rows_affected();
        if updated > 0 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(Error::NotFound)
        }
    }

    async fn record_usage(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE access_codes
            SET usage_count = usage_count + 1, last_used_at = $2
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record access code usage")?;
        Ok(())
    }
}
