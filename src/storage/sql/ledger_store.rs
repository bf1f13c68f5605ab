//! Unified SQL LedgerStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.
//!
//! Atomicity: every balance change is a single conditional `UPDATE ...
//! RETURNING` executed inside the same transaction as its ledger entry, and
//! the order reservation is a unique-key `INSERT ... ON CONFLICT DO NOTHING`.

use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, Utc};

use super::SqlDatabase;
use crate::ledger::{CreditTransaction, OrderId, UserId};
use crate::storage::{Result, StorageError};

/// SQL-based implementation of LedgerStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlLedgerStore<DB: SqlDatabase> {
    pool: DB::Pool,
    retention: Option<usize>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlLedgerStore<DB> {
    /// Create a new SQL ledger store with the given pool.
    ///
    /// The schema must already be migrated; see `migrate`.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            retention: None,
            _marker: PhantomData,
        }
    }

    /// Keep only the newest `retention` ledger entries per user and credit type.
    pub fn with_retention(mut self, retention: Option<usize>) -> Self {
        self.retention = retention;
        self
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

fn db_id(id: u64) -> i64 {
    id as i64
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| StorageError::Corrupt(format!("last_reward_date '{text}': {e}")))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{text}': {e}")))
}

fn decode_transaction(
    user_id: i64,
    credit_type: &str,
    delta: i64,
    source: &str,
    resulting_balance: i64,
    created_at: &str,
    order_id: Option<i64>,
) -> Result<CreditTransaction> {
    Ok(CreditTransaction {
        user_id: UserId(user_id as u64),
        credit_type: credit_type.parse()?,
        delta,
        source: source.parse()?,
        resulting_balance,
        timestamp: parse_timestamp(created_at)?,
        order_id: order_id.map(|id| OrderId(id as u64)),
    })
}

/// Macro to implement LedgerStore for a specific SQL backend.
///
/// `$sqlx_db` is the sqlx database driver, `$migrations` the migration
/// directory applied by `migrate`.
macro_rules! impl_ledger_store {
    ($db_type:ty, $sqlx_db:ty, $feature:literal, $migrations:literal) => {
        #[cfg(feature = $feature)]
        impl SqlLedgerStore<$db_type> {
            /// Apply pending schema migrations.
            pub async fn migrate(&self) -> Result<()> {
                sqlx::migrate!($migrations).run(&self.pool).await?;
                Ok(())
            }

            /// Create the account row if it does not exist yet.
            async fn ensure_account(
                conn: &mut <$sqlx_db as sqlx::Database>::Connection,
                user_id: UserId,
            ) -> Result<()> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::CreditAccounts;

                let stmt = Query::insert()
                    .into_table(CreditAccounts::Table)
                    .columns([CreditAccounts::UserId])
                    .values_panic([db_id(user_id.0).into()])
                    .on_conflict(
                        OnConflict::column(CreditAccounts::UserId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            }

            /// Append a ledger entry and prune to the retention window.
            #[allow(clippy::too_many_arguments)]
            async fn append_transaction(
                &self,
                conn: &mut <$sqlx_db as sqlx::Database>::Connection,
                user_id: UserId,
                credit_type: crate::ledger::CreditType,
                delta: i64,
                source: crate::ledger::TransactionSource,
                resulting_balance: i64,
                order_id: Option<OrderId>,
            ) -> Result<()> {
                use sea_query::{Expr, Order, Query};

                use crate::storage::schema::CreditTransactions;

                let created_at = Utc::now().to_rfc3339();
                let order_id: Option<i64> = order_id.map(|id| db_id(id.0));

                let stmt = Query::insert()
                    .into_table(CreditTransactions::Table)
                    .columns([
                        CreditTransactions::UserId,
                        CreditTransactions::CreditType,
                        CreditTransactions::Delta,
                        CreditTransactions::Source,
                        CreditTransactions::ResultingBalance,
                        CreditTransactions::CreatedAt,
                        CreditTransactions::OrderId,
                    ])
                    .values_panic([
                        db_id(user_id.0).into(),
                        credit_type.as_str().into(),
                        delta.into(),
                        source.as_str().into(),
                        resulting_balance.into(),
                        created_at.into(),
                        order_id.into(),
                    ])
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                sqlx::query(&sql).execute(&mut *conn).await?;

                if let Some(keep) = self.retention {
                    let newest = Query::select()
                        .column(CreditTransactions::Id)
                        .from(CreditTransactions::Table)
                        .and_where(Expr::col(CreditTransactions::UserId).eq(db_id(user_id.0)))
                        .and_where(
                            Expr::col(CreditTransactions::CreditType).eq(credit_type.as_str()),
                        )
                        .order_by(CreditTransactions::Id, Order::Desc)
                        .limit(keep as u64)
                        .to_owned();

                    let stmt = Query::delete()
                        .from_table(CreditTransactions::Table)
                        .and_where(Expr::col(CreditTransactions::UserId).eq(db_id(user_id.0)))
                        .and_where(
                            Expr::col(CreditTransactions::CreditType).eq(credit_type.as_str()),
                        )
                        .and_where(Expr::col(CreditTransactions::Id).not_in_subquery(newest))
                        .to_owned();

                    let sql = <$db_type>::build_delete(stmt);
                    sqlx::query(&sql).execute(&mut *conn).await?;
                }

                Ok(())
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::LedgerStore for SqlLedgerStore<$db_type> {
            async fn account(
                &self,
                user_id: UserId,
            ) -> Result<Option<crate::ledger::CreditAccount>> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::CreditAccounts;

                let stmt = Query::select()
                    .columns([
                        CreditAccounts::ImageBalance,
                        CreditAccounts::TextBalance,
                        CreditAccounts::ImageFreeTotal,
                        CreditAccounts::TextFreeTotal,
                        CreditAccounts::LastRewardDate,
                    ])
                    .from(CreditAccounts::Table)
                    .and_where(Expr::col(CreditAccounts::UserId).eq(db_id(user_id.0)))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

                let Some(row) = row else {
                    return Ok(None);
                };

                let last_reward_date: Option<String> = row.try_get("last_reward_date")?;
                Ok(Some(crate::ledger::CreditAccount {
                    user_id,
                    image_balance: row.try_get("image_balance")?,
                    text_balance: row.try_get("text_balance")?,
                    image_free_total: row.try_get("image_free_total")?,
                    text_free_total: row.try_get("text_free_total")?,
                    last_reward_date: last_reward_date.as_deref().map(parse_date).transpose()?,
                }))
            }

            async fn list_accounts(&self) -> Result<Vec<UserId>> {
                use sea_query::{Order, Query};
                use sqlx::Row;

                use crate::storage::schema::CreditAccounts;

                let stmt = Query::select()
                    .column(CreditAccounts::UserId)
                    .from(CreditAccounts::Table)
                    .order_by(CreditAccounts::UserId, Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| {
                        let id: i64 = row.try_get("user_id")?;
                        Ok(UserId(id as u64))
                    })
                    .collect()
            }

            async fn credit(&self, entry: crate::storage::CreditEntry) -> Result<i64> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::ledger::TransactionSource;
                use crate::storage::schema::CreditAccounts;

                let balance_col = CreditAccounts::balance(entry.credit_type);

                let mut tx = self.pool.begin().await?;
                Self::ensure_account(&mut *tx, entry.user_id).await?;

                // The statement is not Send; it must be gone before the next await.
                let sql = {
                    let mut stmt = Query::update();
                    stmt.table(CreditAccounts::Table)
                        .value(balance_col, Expr::col(balance_col).add(entry.amount))
                        .and_where(Expr::col(CreditAccounts::UserId).eq(db_id(entry.user_id.0)))
                        .returning_col(balance_col);
                    if entry.source == TransactionSource::DailyReward {
                        let free_col = CreditAccounts::free_total(entry.credit_type);
                        stmt.value(free_col, Expr::col(free_col).add(entry.amount));
                    }
                    <$db_type>::build_update(stmt)
                };
                let row = sqlx::query(&sql).fetch_one(&mut *tx).await?;
                let balance: i64 = row.try_get(0)?;

                self.append_transaction(
                    &mut *tx,
                    entry.user_id,
                    entry.credit_type,
                    entry.amount,
                    entry.source,
                    balance,
                    entry.order_id,
                )
                .await?;

                tx.commit().await?;
                Ok(balance)
            }

            async fn debit(
                &self,
                user_id: UserId,
                credit_type: crate::ledger::CreditType,
                amount: i64,
            ) -> Result<crate::storage::DebitOutcome> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::ledger::TransactionSource;
                use crate::storage::schema::CreditAccounts;
                use crate::storage::DebitOutcome;

                let balance_col = CreditAccounts::balance(credit_type);

                let mut tx = self.pool.begin().await?;
                Self::ensure_account(&mut *tx, user_id).await?;

                // Compare-and-decrement: the guard and the write are one statement.
                let stmt = Query::update()
                    .table(CreditAccounts::Table)
                    .value(balance_col, Expr::col(balance_col).sub(amount))
                    .and_where(Expr::col(CreditAccounts::UserId).eq(db_id(user_id.0)))
                    .and_where(Expr::col(balance_col).gte(amount))
                    .returning_col(balance_col)
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let row = sqlx::query(&sql).fetch_optional(&mut *tx).await?;

                let outcome = match row {
                    Some(row) => {
                        let balance: i64 = row.try_get(0)?;
                        self.append_transaction(
                            &mut *tx,
                            user_id,
                            credit_type,
                            -amount,
                            TransactionSource::Usage,
                            balance,
                            None,
                        )
                        .await?;
                        DebitOutcome { ok: true, balance }
                    }
                    None => {
                        let stmt = Query::select()
                            .column(balance_col)
                            .from(CreditAccounts::Table)
                            .and_where(Expr::col(CreditAccounts::UserId).eq(db_id(user_id.0)))
                            .to_owned();
                        let sql = <$db_type>::build_select(stmt);
                        let row = sqlx::query(&sql).fetch_one(&mut *tx).await?;
                        DebitOutcome {
                            ok: false,
                            balance: row.try_get(0)?,
                        }
                    }
                };

                tx.commit().await?;
                Ok(outcome)
            }

            async fn claim_reward_day(&self, user_id: UserId, date: NaiveDate) -> Result<bool> {
                use sea_query::{Cond, Expr, Query};

                use crate::storage::schema::CreditAccounts;

                let today = date_text(date);

                let mut tx = self.pool.begin().await?;
                Self::ensure_account(&mut *tx, user_id).await?;

                let stmt = Query::update()
                    .table(CreditAccounts::Table)
                    .value(CreditAccounts::LastRewardDate, today.clone())
                    .cond_where(
                        Cond::all()
                            .add(Expr::col(CreditAccounts::UserId).eq(db_id(user_id.0)))
                            .add(
                                Cond::any()
                                    .add(Expr::col(CreditAccounts::LastRewardDate).is_null())
                                    .add(Expr::col(CreditAccounts::LastRewardDate).ne(today)),
                            ),
                    )
                    .to_owned();

                let sql = <$db_type>::build_update(stmt);
                let result = sqlx::query(&sql).execute(&mut *tx).await?;

                tx.commit().await?;
                Ok(result.rows_affected() == 1)
            }

            async fn reserve_order(
                &self,
                user_id: UserId,
                order_id: OrderId,
                at: DateTime<Utc>,
            ) -> Result<bool> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::ProcessingRecords;

                let stmt = Query::insert()
                    .into_table(ProcessingRecords::Table)
                    .columns([
                        ProcessingRecords::UserId,
                        ProcessingRecords::OrderId,
                        ProcessingRecords::ProcessedAt,
                    ])
                    .values_panic([
                        db_id(user_id.0).into(),
                        db_id(order_id.0).into(),
                        at.to_rfc3339().into(),
                    ])
                    .on_conflict(
                        OnConflict::columns([ProcessingRecords::UserId, ProcessingRecords::OrderId])
                            .do_nothing()
                            .to_owned(),
                    )
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                Ok(result.rows_affected() == 1)
            }

            async fn release_order(&self, user_id: UserId, order_id: OrderId) -> Result<bool> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::ProcessingRecords;

                let stmt = Query::delete()
                    .from_table(ProcessingRecords::Table)
                    .and_where(Expr::col(ProcessingRecords::UserId).eq(db_id(user_id.0)))
                    .and_where(Expr::col(ProcessingRecords::OrderId).eq(db_id(order_id.0)))
                    .to_owned();

                let sql = <$db_type>::build_delete(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;
                Ok(result.rows_affected() > 0)
            }

            async fn processing_record(
                &self,
                user_id: UserId,
                order_id: OrderId,
            ) -> Result<Option<crate::ledger::ProcessingRecord>> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::ProcessingRecords;

                let stmt = Query::select()
                    .column(ProcessingRecords::ProcessedAt)
                    .from(ProcessingRecords::Table)
                    .and_where(Expr::col(ProcessingRecords::UserId).eq(db_id(user_id.0)))
                    .and_where(Expr::col(ProcessingRecords::OrderId).eq(db_id(order_id.0)))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

                match row {
                    Some(row) => {
                        let processed_at: String = row.try_get("processed_at")?;
                        Ok(Some(crate::ledger::ProcessingRecord {
                            user_id,
                            order_id,
                            processed_at: parse_timestamp(&processed_at)?,
                        }))
                    }
                    None => Ok(None),
                }
            }

            async fn transactions(
                &self,
                user_id: UserId,
                limit: usize,
            ) -> Result<Vec<CreditTransaction>> {
                use sea_query::{Expr, Order, Query};
                use sqlx::Row;

                use crate::storage::schema::CreditTransactions;

                let stmt = Query::select()
                    .columns([
                        CreditTransactions::UserId,
                        CreditTransactions::CreditType,
                        CreditTransactions::Delta,
                        CreditTransactions::Source,
                        CreditTransactions::ResultingBalance,
                        CreditTransactions::CreatedAt,
                        CreditTransactions::OrderId,
                    ])
                    .from(CreditTransactions::Table)
                    .and_where(Expr::col(CreditTransactions::UserId).eq(db_id(user_id.0)))
                    .order_by(CreditTransactions::Id, Order::Desc)
                    .limit(limit as u64)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| {
                        let credit_type: String = row.try_get("credit_type")?;
                        let source: String = row.try_get("source")?;
                        let created_at: String = row.try_get("created_at")?;
                        decode_transaction(
                            row.try_get("user_id")?,
                            &credit_type,
                            row.try_get("delta")?,
                            &source,
                            row.try_get("resulting_balance")?,
                            &created_at,
                            row.try_get("order_id")?,
                        )
                    })
                    .collect()
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_ledger_store!(super::postgres::Postgres, sqlx::Postgres, "postgres", "migrations/postgres");
impl_ledger_store!(super::sqlite::Sqlite, sqlx::Sqlite, "sqlite", "migrations/sqlite");
