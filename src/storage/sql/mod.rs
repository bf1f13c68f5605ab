//! Unified SQL storage implementations.
//!
//! This module provides the shared `LedgerStore` implementation for SQL-based
//! storage backends (PostgreSQL, SQLite). The implementation is parameterized
//! by database type using the `SqlDatabase` trait.

mod ledger_store;
mod query;

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

pub use ledger_store::SqlLedgerStore;
pub use query::SqlDatabase;

/// Open a pool, retrying transient connection failures with exponential backoff.
async fn connect_with_retry<P, F, Fut>(backend: &str, connect: F) -> crate::storage::Result<P>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<P, sqlx::Error>>,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(10);

    let pool = connect
        .retry(backoff)
        .when(|e| matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut))
        .notify(|e, delay| {
            warn!(
                backend = %backend,
                error = %e,
                ?delay,
                "Ledger database not reachable, retrying"
            );
        })
        .await?;

    Ok(pool)
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sqlx::PgPool;
    use tracing::info;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    /// PostgreSQL ledger store.
    pub type PostgresLedgerStore = super::SqlLedgerStore<Postgres>;

    impl PostgresLedgerStore {
        /// Connect, run migrations and return a ready store.
        pub async fn connect(uri: &str, retention: Option<usize>) -> crate::storage::Result<Self> {
            let pool = super::connect_with_retry("postgres", || PgPool::connect(uri)).await?;
            let store = Self::new(pool).with_retention(retention);
            store.migrate().await?;
            info!("PostgreSQL ledger store ready");
            Ok(store)
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sqlx::SqlitePool;
    use tracing::info;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    /// SQLite ledger store.
    pub type SqliteLedgerStore = super::SqlLedgerStore<Sqlite>;

    impl SqliteLedgerStore {
        /// Open (creating if needed) the database file, run migrations and
        /// return a ready store.
        pub async fn connect(path: &str, retention: Option<usize>) -> crate::storage::Result<Self> {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        crate::storage::StorageError::Unavailable(format!(
                            "cannot create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let url = format!("sqlite:{}?mode=rwc", path);
            let pool = super::connect_with_retry("sqlite", || SqlitePool::connect(&url)).await?;
            let store = Self::new(pool).with_retention(retention);
            store.migrate().await?;
            info!(path = %path, "SQLite ledger store ready");
            Ok(store)
        }
    }
}
