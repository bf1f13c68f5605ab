//! Mock ledger store for testing.
//!
//! Holds all state behind one lock so each operation is a single critical
//! section, mirroring the atomicity of the SQL backends.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{CreditEntry, DebitOutcome, LedgerStore, Result, StorageError};
use crate::ledger::{
    CreditAccount, CreditTransaction, CreditType, OrderId, ProcessingRecord, TransactionSource,
    UserId,
};


#[derive(Default)]
struct MockState {
    accounts: BTreeMap<UserId, CreditAccount>,
    transactions: HashMap<UserId, Vec<CreditTransaction>>,
    processed: HashMap<(UserId, OrderId), DateTime<Utc>>,
}

/// Mock ledger store that keeps everything in memory.
#[derive(Default)]
pub struct MockLedgerStore {
    state: RwLock<MockState>,
    retention: Option<usize>,
    fail_all: RwLock<bool>,
    fail_credit_types: RwLock<HashSet<CreditType>>,
}

impl MockLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Option<usize>) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    /// Make every operation fail with `StorageError::Unavailable`.
    pub async fn set_fail_all(&self, fail: bool) {
        *self.fail_all.write().await = fail;
    }

    /// Make `credit` fail for one credit type.
    pub async fn set_fail_on_credit(&self, credit_type: CreditType, fail: bool) {
        let mut types = self.fail_credit_types.write().await;
        if fail {
            types.insert(credit_type);
        } else {
            types.remove(&credit_type);
        }
    }

    /// Number of processing records held.
    pub async fn processed_count(&self) -> usize {
        self.state.read().await.processed.len()
    }

    async fn check_available(&self) -> Result<()> {
        if *self.fail_all.read().await {
            return Err(StorageError::Unavailable("mock store failure".to_string()));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        state: &mut MockState,
        user_id: UserId,
        credit_type: CreditType,
        delta: i64,
        source: TransactionSource,
        resulting_balance: i64,
        order_id: Option<OrderId>,
    ) {
        let log = state.transactions.entry(user_id).or_default();
        log.push(CreditTransaction {
            user_id,
            credit_type,
            delta,
            source,
            resulting_balance,
            timestamp: Utc::now(),
            order_id,
        });

        if let Some(keep) = self.retention {
            let of_type = log.iter().filter(|t| t.credit_type == credit_type).count();
            let mut excess = of_type.saturating_sub(keep);
            log.retain(|t| {
                if excess > 0 && t.credit_type == credit_type {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }
}

fn balance_mut(account: &mut CreditAccount, credit_type: CreditType) -> &mut i64 {
    match credit_type {
        CreditType::Image => &mut account.image_balance,
        CreditType::Text => &mut account.text_balance,
    }
}

fn free_total_mut(account: &mut CreditAccount, credit_type: CreditType) -> &mut i64 {
    match credit_type {
        CreditType::Image => &mut account.image_free_total,
        CreditType::Text => &mut account.text_free_total,
    }
}

#[async_trait]
impl LedgerStore for MockLedgerStore {
    async fn account(&self, user_id: UserId) -> Result<Option<CreditAccount>> {
        self.check_available().await?;
        Ok(self.state.read().await.accounts.get(&user_id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<UserId>> {
        self.check_available().await?;
        Ok(self.state.read().await.accounts.keys().copied().collect())
    }

    async fn credit(&self, entry: CreditEntry) -> Result<i64> {
        self.check_available().await?;
        if self.fail_credit_types.read().await.contains(&entry.credit_type) {
            return Err(StorageError::Unavailable(format!(
                "mock credit failure for {}",
                entry.credit_type
            )));
        }

        let mut state = self.state.write().await;
        let account = state
            .accounts
            .entry(entry.user_id)
            .or_insert_with(|| CreditAccount::empty(entry.user_id));

        let overflow = || StorageError::Corrupt(format!("{} balance overflow", entry.credit_type));
        let balance = balance_mut(account, entry.credit_type)
            .checked_add(entry.amount)
            .ok_or_else(overflow)?;
        if entry.source == TransactionSource::DailyReward {
            let free_total = free_total_mut(account, entry.credit_type);
            *free_total = free_total.checked_add(entry.amount).ok_or_else(overflow)?;
        }
        *balance_mut(account, entry.credit_type) = balance;

        self.append(
            &mut state,
            entry.user_id,
            entry.credit_type,
            entry.amount,
            entry.source,
            balance,
            entry.order_id,
        );
        Ok(balance)
    }

    async fn debit(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        amount: i64,
    ) -> Result<DebitOutcome> {
        self.check_available().await?;

        let mut state = self.state.write().await;
        let account = state
            .accounts
            .entry(user_id)
            .or_insert_with(|| CreditAccount::empty(user_id));

        let balance = balance_mut(account, credit_type);
        if *balance < amount {
            return Ok(DebitOutcome {
                ok: false,
                balance: *balance,
            });
        }
        *balance -= amount;
        let balance = *balance;

        self.append(
            &mut state,
            user_id,
            credit_type,
            -amount,
            TransactionSource::Usage,
            balance,
            None,
        );
        Ok(DebitOutcome { ok: true, balance })
    }

    async fn claim_reward_day(&self, user_id: UserId, date: NaiveDate) -> Result<bool> {
        self.check_available().await?;

        let mut state = self.state.write().await;
        let account = state
            .accounts
            .entry(user_id)
            .or_insert_with(|| CreditAccount::empty(user_id));

        if account.last_reward_date == Some(date) {
            return Ok(false);
        }
        account.last_reward_date = Some(date);
        Ok(true)
    }

    async fn reserve_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_available().await?;

        let mut state = self.state.write().await;
        if state.processed.contains_key(&(user_id, order_id)) {
            return Ok(false);
        }
        state.processed.insert((user_id, order_id), at);
        Ok(true)
    }

    async fn release_order(&self, user_id: UserId, order_id: OrderId) -> Result<bool> {
        self.check_available().await?;
        Ok(self
            .state
            .write()
            .await
            .processed
            .remove(&(user_id, order_id))
            .is_some())
    }

    async fn processing_record(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<ProcessingRecord>> {
        self.check_available().await?;
        Ok(self
            .state
            .read()
            .await
            .processed
            .get(&(user_id, order_id))
            .map(|processed_at| ProcessingRecord {
                user_id,
                order_id,
                processed_at: *processed_at,
            }))
    }

    async fn transactions(&self, user_id: UserId, limit: usize) -> Result<Vec<CreditTransaction>> {
        self.check_available().await?;
        Ok(self
            .state
            .read()
            .await
            .transactions
            .get(&user_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
