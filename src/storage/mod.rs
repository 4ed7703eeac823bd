//! Postgres adapters for the store traits.
//!
//! Queries are built at runtime and mapped by hand; every statement runs inside a
//! `db.query` span. Adapter internals use `anyhow` and enter the library as
//! `Error::Store`.

pub mod attempts;
pub mod audit;
pub mod codes;
pub mod profiles;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::Instrument;

pub use attempts::PgRateLimiter;
pub use audit::PgAuditSink;
pub use codes::PgCodeStore;
pub use profiles::PgProfileStore;

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/01_carekey.sql"));

/// Open the connection pool.
///
/// # Errors
/// Returns an error if the database is unreachable.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Apply the bundled schema. Statements are idempotent.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let span = tracing::info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Name of the violated constraint or unique index, if the driver reports one.
pub(crate) fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        constraint: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
            constraint: Some("access_codes_active_code_key"),
        }));
        assert!(is_unique_violation(&err));
        assert_eq!(violated_constraint(&err), Some("access_codes_active_code_key"));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
            constraint: None,
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
        assert_eq!(violated_constraint(&err), None);
    }

    #[test]
    fn schema_declares_partial_unique_indexes() {
        assert!(SCHEMA_SQL.contains("access_codes_active_code_key"));
        assert!(SCHEMA_SQL.contains("access_codes_active_personal_key"));
        assert!(SCHEMA_SQL.contains("rate_limit_entries"));
    }
}
