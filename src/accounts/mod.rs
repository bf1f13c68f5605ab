//! Credit account manager.
//!
//! The only path through which balances change. Every mutation maps to one
//! atomic store operation; nothing here reads a balance and writes it back.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::ledger::{
    CreditAccount, CreditTransaction, CreditType, OrderId, TransactionSource, UserId,
};
use crate::storage::{CreditEntry, DebitOutcome, LedgerStore};

#[cfg(test)]
mod tests;

/// Atomic balance mutation primitives over a [`LedgerStore`].
#[derive(Clone)]
pub struct CreditAccountManager {
    store: Arc<dyn LedgerStore>,
}

impl CreditAccountManager {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Increase a balance and record the entry.
    ///
    /// `DailyReward` credits also raise the free-credit counter. A zero
    /// amount changes nothing and returns the current balance.
    pub async fn credit(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        amount: i64,
        source: TransactionSource,
    ) -> Result<i64> {
        self.credit_for_order(user_id, credit_type, amount, source, None)
            .await
    }

    /// [`credit`](Self::credit) with a reference to the originating order.
    pub async fn credit_for_order(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        amount: i64,
        source: TransactionSource,
        order_id: Option<OrderId>,
    ) -> Result<i64> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount == 0 {
            let account = self.balances(user_id).await?;
            return Ok(account.balance(credit_type));
        }

        let balance = self
            .store
            .credit(CreditEntry {
                user_id,
                credit_type,
                amount,
                source,
                order_id,
            })
            .await?;

        info!(
            %user_id,
            %credit_type,
            amount,
            %source,
            order_id = ?order_id.map(|o| o.0),
            balance,
            "Credited account"
        );
        Ok(balance)
    }

    /// Decrement a balance if it covers `amount`.
    ///
    /// Insufficient balance is reported as `ok = false` with the balance
    /// untouched.
    pub async fn debit(
        &self,
        user_id: UserId,
        credit_type: CreditType,
        amount: i64,
    ) -> Result<DebitOutcome> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount == 0 {
            let account = self.balances(user_id).await?;
            return Ok(DebitOutcome {
                ok: true,
                balance: account.balance(credit_type),
            });
        }

        let outcome = self.store.debit(user_id, credit_type, amount).await?;
        if outcome.ok {
            debug!(%user_id, %credit_type, amount, balance = outcome.balance, "Debited account");
        } else {
            info!(
                %user_id,
                %credit_type,
                amount,
                balance = outcome.balance,
                "Debit rejected: insufficient balance"
            );
        }
        Ok(outcome)
    }

    /// Current account state; all zero for unknown users.
    pub async fn balances(&self, user_id: UserId) -> Result<CreditAccount> {
        Ok(self
            .store
            .account(user_id)
            .await?
            .unwrap_or_else(|| CreditAccount::empty(user_id)))
    }

    /// Newest-first ledger entries.
    pub async fn history(&self, user_id: UserId, limit: usize) -> Result<Vec<CreditTransaction>> {
        Ok(self.store.transactions(user_id, limit).await?)
    }

    /// Atomically mark `date` as the user's reward day.
    ///
    /// Returns `false` if the user already claimed that date.
    pub async fn claim_reward_day(&self, user_id: UserId, date: NaiveDate) -> Result<bool> {
        Ok(self.store.claim_reward_day(user_id, date).await?)
    }

    /// Every user with an account.
    pub async fn known_users(&self) -> Result<Vec<UserId>> {
        Ok(self.store.list_accounts().await?)
    }
}
