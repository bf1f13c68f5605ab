//! Ledger storage.
//!
//! This module contains:
//! - `LedgerStore` trait: durable balances, ledger entries and idempotency markers
//! - Implementations: SQLite, PostgreSQL (shared SQL implementation), Mock
//!
//! Every mutating operation is atomic in the backend. Callers never read a
//! value and write it back; the store performs conditional writes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::config::StorageConfig;
use crate::ledger::{
    CreditAccount, CreditTransaction, CreditType, OrderId, ProcessingRecord, TransactionSource,
    UnknownVariant, UserId,
};

pub mod mock;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod schema;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use mock::MockLedgerStore;
#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresLedgerStore;
#[cfg(feature = "sqlite")]
pub use sql::sqlite::SqliteLedgerStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("Storage type '{0}' is not available in this build")]
    Unsupported(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<UnknownVariant> for StorageError {
    fn from(err: UnknownVariant) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

/// A balance increase to apply atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditEntry {
    pub user_id: UserId,
    pub credit_type: CreditType,
    /// Non-negative amount; callers validate.
    pub amount: i64,
    pub source: TransactionSource,
    pub order_id: Option<OrderId>,
}

/// Result of an atomic compare-and-decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebitOutcome {
    /// False when the balance was insufficient; nothing changed.
    pub ok: bool,
    /// Balance after the operation (unchanged when `ok` is false).
    pub balance: i64,
}

/// Interface for ledger persistence.
///
/// # Keys
///
/// - Accounts are keyed by `user_id`.
/// - Processing records are keyed by `(user_id, order_id)`; the key is unique
///   and its insertion is the idempotency reservation.
/// - Transactions are appended per `(user_id, credit_type)` and may be pruned
///   to a configured retention.
///
/// # Implementations
///
/// - `SqliteLedgerStore`: SQLite storage
/// - `PostgresLedgerStore`: PostgreSQL storage
/// - `MockLedgerStore`: In-memory mock for testing
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read an account. Returns `None` if the user has never been touched.
    async fn account(&self, user_id: UserId) -> Result<Option<CreditAccount>>;

    /// List every user that has an account, ascending.
    async fn list_accounts(&self) -> Result<Vec<UserId>>;

    /// Increment a balance and append the matching ledger entry.
    ///
    /// `DailyReward` entries also increment the free-credit counter.
    /// Returns the resulting balance.
    async fn credit(&self, entry: CreditEntry) -> Result<i64>;

    /// Decrement a balance only if it covers `amount`, appending a `Usage`
    /// entry on success.
    async fn debit(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        amount: i64,
    ) -> Result<DebitOutcome>;

    /// Set `last_reward_date` to `date` unless it already equals `date`.
    ///
    /// Returns `true` if this call performed the write.
    async fn claim_reward_day(&self, user_id: UserId, date: NaiveDate) -> Result<bool>;

    /// Insert the processing record if absent.
    ///
    /// Returns `true` if this call created it, `false` if it already existed.
    async fn reserve_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete a processing record. Returns `true` if one was removed.
    async fn release_order(&self, user_id: UserId, order_id: OrderId) -> Result<bool>;

    /// Read a processing record.
    async fn processing_record(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<ProcessingRecord>>;

    /// Newest-first ledger entries for a user, at most `limit`.
    async fn transactions(&self, user_id: UserId, limit: usize) -> Result<Vec<CreditTransaction>>;
}

/// Initialize the ledger store based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn LedgerStore>> {
    info!(
        storage_type = %config.storage_type,
        retention = ?config.transaction_retention,
        "Initializing ledger storage"
    );

    match config.storage_type.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let store =
                SqliteLedgerStore::connect(&config.sqlite.path, config.transaction_retention)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let store =
                PostgresLedgerStore::connect(&config.postgres.uri, config.transaction_retention)
                    .await?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MockLedgerStore::with_retention(config.transaction_retention))),
        other => Err(StorageError::Unsupported(other.to_string())),
    }
}
