//! LedgerStore interface tests.
//!
//! These tests verify the contract of the LedgerStore trait.
//! Each storage implementation should run these tests. Every test uses its
//! own user id range so they can share one database.

use chrono::{NaiveDate, Utc};
use futures::future::join_all;

use credit_ledger::ledger::{CreditType, OrderId, TransactionSource, UserId};
use credit_ledger::storage::{CreditEntry, LedgerStore};

pub fn entry(
    user: u64,
    credit_type: CreditType,
    amount: i64,
    source: TransactionSource,
) -> CreditEntry {
    CreditEntry {
        user_id: UserId(user),
        credit_type,
        amount,
        source,
        order_id: None,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
}

// =============================================================================
// Accounts
// =============================================================================

pub async fn test_account_absent_until_touched<S: LedgerStore>(store: &S) {
    let user = UserId(1001);
    assert!(store.account(user).await.expect("account").is_none());

    store
        .credit(entry(1001, CreditType::Text, 7, TransactionSource::Manual))
        .await
        .expect("credit should succeed");

    let account = store.account(user).await.expect("account").expect("created");
    assert_eq!(account.text_balance, 7);
    assert_eq!(account.image_balance, 0);
    assert!(account.last_reward_date.is_none());
}

pub async fn test_list_accounts_ascending<S: LedgerStore>(store: &S) {
    for user in [1103, 1101, 1102] {
        store
            .credit(entry(user, CreditType::Image, 1, TransactionSource::Manual))
            .await
            .expect("credit should succeed");
    }

    let users: Vec<u64> = store
        .list_accounts()
        .await
        .expect("list")
        .into_iter()
        .map(|u| u.0)
        .filter(|u| (1101..=1103).contains(u))
        .collect();
    assert_eq!(users, vec![1101, 1102, 1103]);
}

// =============================================================================
// Credit / debit
// =============================================================================

pub async fn test_credit_returns_running_balance<S: LedgerStore>(store: &S) {
    let first = store
        .credit(entry(1201, CreditType::Image, 500, TransactionSource::Purchase))
        .await
        .expect("credit");
    let second = store
        .credit(entry(1201, CreditType::Image, 200, TransactionSource::Purchase))
        .await
        .expect("credit");
    assert_eq!(first, 500);
    assert_eq!(second, 700);
}

pub async fn test_daily_reward_raises_free_total<S: LedgerStore>(store: &S) {
    store
        .credit(entry(1301, CreditType::Text, 40, TransactionSource::DailyReward))
        .await
        .expect("credit");
    store
        .credit(entry(1301, CreditType::Text, 60, TransactionSource::Purchase))
        .await
        .expect("credit");

    let account = store.account(UserId(1301)).await.expect("account").expect("exists");
    assert_eq!(account.text_balance, 100);
    assert_eq!(account.text_free_total, 40);
    assert_eq!(account.image_free_total, 0);
}

pub async fn test_debit_guard<S: LedgerStore>(store: &S) {
    let user = UserId(1401);
    store
        .credit(entry(1401, CreditType::Image, 10, TransactionSource::Purchase))
        .await
        .expect("credit");

    let rejected = store.debit(user, CreditType::Image, 11).await.expect("debit");
    assert!(!rejected.ok);
    assert_eq!(rejected.balance, 10);

    let accepted = store.debit(user, CreditType::Image, 4).await.expect("debit");
    assert!(accepted.ok);
    assert_eq!(accepted.balance, 6);

    let log = store.transactions(user, 10).await.expect("transactions");
    assert_eq!(log.len(), 2, "rejected debit must not be logged");
    assert_eq!(log[0].delta, -4);
    assert_eq!(log[0].source, TransactionSource::Usage);
    assert_eq!(log[0].resulting_balance, 6);
}

pub async fn test_debit_unknown_user_rejected<S: LedgerStore>(store: &S) {
    let outcome = store.debit(UserId(1501), CreditType::Text, 1).await.expect("debit");
    assert!(!outcome.ok);
    assert_eq!(outcome.balance, 0);
}

pub async fn test_concurrent_debits_never_overdraw<S: LedgerStore>(store: &S) {
    let user = UserId(1601);
    store
        .credit(entry(1601, CreditType::Text, 5, TransactionSource::Purchase))
        .await
        .expect("credit");

    let outcomes = join_all((0..12).map(|_| store.debit(user, CreditType::Text, 1))).await;
    let accepted = outcomes
        .into_iter()
        .map(|o| o.expect("debit"))
        .filter(|o| o.ok)
        .count();

    assert_eq!(accepted, 5);
    let account = store.account(user).await.expect("account").expect("exists");
    assert_eq!(account.text_balance, 0);
}

// =============================================================================
// Reward claims
// =============================================================================

pub async fn test_claim_reward_day_once_per_date<S: LedgerStore>(store: &S) {
    let user = UserId(1701);
    assert!(store.claim_reward_day(user, day(1)).await.expect("claim"));
    assert!(!store.claim_reward_day(user, day(1)).await.expect("claim"));
    assert!(store.claim_reward_day(user, day(2)).await.expect("claim"));

    let account = store.account(user).await.expect("account").expect("exists");
    assert_eq!(account.last_reward_date, Some(day(2)));
}

pub async fn test_concurrent_claims_single_winner<S: LedgerStore>(store: &S) {
    let user = UserId(1801);
    let results = join_all((0..8).map(|_| store.claim_reward_day(user, day(5)))).await;
    let winners = results.into_iter().filter(|r| *r.as_ref().expect("claim")).count();
    assert_eq!(winners, 1);
}

// =============================================================================
// Processing records
// =============================================================================

pub async fn test_reserve_order_once<S: LedgerStore>(store: &S) {
    let user = UserId(1901);
    let order = OrderId(501);

    assert!(store.reserve_order(user, order, Utc::now()).await.expect("reserve"));
    assert!(!store.reserve_order(user, order, Utc::now()).await.expect("reserve"));

    let record = store
        .processing_record(user, order)
        .await
        .expect("record")
        .expect("exists");
    assert_eq!(record.user_id, user);
    assert_eq!(record.order_id, order);

    // The key is (user, order): another user's record is independent.
    assert!(store
        .reserve_order(UserId(1902), order, Utc::now())
        .await
        .expect("reserve"));
}

pub async fn test_concurrent_reservations_single_winner<S: LedgerStore>(store: &S) {
    let user = UserId(2001);
    let order = OrderId(777);
    let results = join_all((0..10).map(|_| store.reserve_order(user, order, Utc::now()))).await;
    let winners = results.into_iter().filter(|r| *r.as_ref().expect("reserve")).count();
    assert_eq!(winners, 1);
}

pub async fn test_release_order<S: LedgerStore>(store: &S) {
    let user = UserId(2101);
    let order = OrderId(9);

    assert!(!store.release_order(user, order).await.expect("release"));
    store.reserve_order(user, order, Utc::now()).await.expect("reserve");
    assert!(store.release_order(user, order).await.expect("release"));
    assert!(store.processing_record(user, order).await.expect("record").is_none());
    assert!(store.reserve_order(user, order, Utc::now()).await.expect("reserve"));
}

// =============================================================================
// Transactions
// =============================================================================

pub async fn test_transactions_newest_first_with_limit<S: LedgerStore>(store: &S) {
    let user = UserId(2201);
    for amount in 1..=4 {
        let mut e = entry(2201, CreditType::Image, amount, TransactionSource::Purchase);
        e.order_id = Some(OrderId(amount as u64));
        store.credit(e).await.expect("credit");
    }

    let log = store.transactions(user, 3).await.expect("transactions");
    let deltas: Vec<i64> = log.iter().map(|t| t.delta).collect();
    assert_eq!(deltas, vec![4, 3, 2]);
    assert_eq!(log[0].order_id, Some(OrderId(4)));
    assert_eq!(log[0].resulting_balance, 10);
    assert_eq!(log[0].credit_type, CreditType::Image);
}

/// Run against a store built with a retention of 2 entries.
pub async fn test_retention_prunes_per_type<S: LedgerStore>(store: &S) {
    let user = UserId(2301);
    for amount in 1..=3 {
        store
            .credit(entry(2301, CreditType::Image, amount, TransactionSource::Manual))
            .await
            .expect("credit");
    }
    store
        .credit(entry(2301, CreditType::Text, 9, TransactionSource::Manual))
        .await
        .expect("credit");

    let log = store.transactions(user, 10).await.expect("transactions");
    let image: Vec<i64> = log
        .iter()
        .filter(|t| t.credit_type == CreditType::Image)
        .map(|t| t.delta)
        .collect();
    assert_eq!(image, vec![3, 2]);
    assert_eq!(log.len(), 3);

    let account = store.account(user).await.expect("account").expect("exists");
    assert_eq!(account.image_balance, 6, "pruning never touches balances");
}

/// Run all LedgerStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_ledger_store_tests {
    ($store:expr) => {
        use $crate::storage::ledger_store_tests::*;

        test_account_absent_until_touched($store).await;
        println!("  test_account_absent_until_touched: PASSED");

        test_list_accounts_ascending($store).await;
        println!("  test_list_accounts_ascending: PASSED");

        test_credit_returns_running_balance($store).await;
        println!("  test_credit_returns_running_balance: PASSED");

        test_daily_reward_raises_free_total($store).await;
        println!("  test_daily_reward_raises_free_total: PASSED");

        test_debit_guard($store).await;
        println!("  test_debit_guard: PASSED");

        test_debit_unknown_user_rejected($store).await;
        println!("  test_debit_unknown_user_rejected: PASSED");

        test_concurrent_debits_never_overdraw($store).await;
        println!("  test_concurrent_debits_never_overdraw: PASSED");

        test_claim_reward_day_once_per_date($store).await;
        println!("  test_claim_reward_day_once_per_date: PASSED");

        test_concurrent_claims_single_winner($store).await;
        println!("  test_concurrent_claims_single_winner: PASSED");

        test_reserve_order_once($store).await;
        println!("  test_reserve_order_once: PASSED");

        test_concurrent_reservations_single_winner($store).await;
        println!("  test_concurrent_reservations_single_winner: PASSED");

        test_release_order($store).await;
        println!("  test_release_order: PASSED");

        test_transactions_newest_first_with_limit($store).await;
        println!("  test_transactions_newest_first_with_limit: PASSED");
    };
}
