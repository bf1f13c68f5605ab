use std::sync::Arc;

use crate::error::LedgerError;
use crate::ledger::{CreditType, TransactionSource, UserId};
use crate::storage::MockLedgerStore;

use super::*;

fn manager() -> CreditAccountManager {
    CreditAccountManager::new(Arc::new(MockLedgerStore::new()))
}

#[tokio::test]
async fn test_unknown_user_reads_as_zero_account() {
    let accounts = manager();
    let account = accounts.balances(UserId(1)).await.unwrap();
    assert_eq!(account, CreditAccount::empty(UserId(1)));
}

#[tokio::test]
async fn test_credit_rejects_negative_amount() {
    let accounts = manager();
    let err = accounts
        .credit(UserId(1), CreditType::Image, -5, TransactionSource::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(-5)));
}

#[tokio::test]
async fn test_zero_credit_is_noop() {
    let accounts = manager();
    accounts
        .credit(UserId(1), CreditType::Text, 30, TransactionSource::Manual)
        .await
        .unwrap();

    let balance = accounts
        .credit(UserId(1), CreditType::Text, 0, TransactionSource::Manual)
        .await
        .unwrap();
    assert_eq!(balance, 30);
    assert_eq!(accounts.history(UserId(1), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_debit_rejected_leaves_balance_unchanged() {
    let accounts = manager();
    accounts
        .credit(UserId(1), CreditType::Image, 10, TransactionSource::Purchase)
        .await
        .unwrap();

    let outcome = accounts.debit(UserId(1), CreditType::Image, 11).await.unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.balance, 10);

    let outcome = accounts.debit(UserId(1), CreditType::Image, 10).await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.balance, 0);

    let history = accounts.history(UserId(1), 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].source, TransactionSource::Usage);
    assert_eq!(history[0].delta, -10);
    assert_eq!(history[0].resulting_balance, 0);
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let accounts = manager();
    accounts
        .credit(UserId(1), CreditType::Image, 5, TransactionSource::Purchase)
        .await
        .unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let accounts = accounts.clone();
            tokio::spawn(async move { accounts.debit(UserId(1), CreditType::Image, 1).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().ok {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 5);
    assert_eq!(accounts.balances(UserId(1)).await.unwrap().image_balance, 0);
}

#[tokio::test]
async fn test_daily_reward_credit_raises_free_total() {
    let accounts = manager();
    accounts
        .credit(UserId(1), CreditType::Image, 4, TransactionSource::DailyReward)
        .await
        .unwrap();
    accounts
        .credit(UserId(1), CreditType::Image, 6, TransactionSource::Purchase)
        .await
        .unwrap();

    let account = accounts.balances(UserId(1)).await.unwrap();
    assert_eq!(account.image_balance, 10);
    assert_eq!(account.image_free_total, 4);
}
