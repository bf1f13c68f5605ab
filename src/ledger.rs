//! Core ledger types.
//!
//! Identifiers, credit types, accounts and ledger entries shared by every
//! layer of the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a ledger user (the commerce system's customer id).
    UserId
);
id_type!(
    /// Identifier of an order in the commerce system.
    OrderId
);
id_type!(
    /// Identifier of a catalog product.
    ProductId
);

/// Returned when a stored or wire value names an unknown variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// The two ledger currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditType {
    Image,
    Text,
}

impl CreditType {
    pub const ALL: [CreditType; 2] = [CreditType::Image, CreditType::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditType::Image => "image",
            CreditType::Text => "text",
        }
    }
}

impl fmt::Display for CreditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(CreditType::Image),
            "text" => Ok(CreditType::Text),
            other => Err(UnknownVariant {
                kind: "credit type",
                value: other.to_string(),
            }),
        }
    }
}

/// Origin of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    Purchase,
    Usage,
    DailyReward,
    Manual,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Purchase => "purchase",
            TransactionSource::Usage => "usage",
            TransactionSource::DailyReward => "daily_reward",
            TransactionSource::Manual => "manual",
        }
    }
}

impl fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionSource::Purchase),
            "usage" => Ok(TransactionSource::Usage),
            "daily_reward" => Ok(TransactionSource::DailyReward),
            "manual" => Ok(TransactionSource::Manual),
            other => Err(UnknownVariant {
                kind: "transaction source",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-user balances and free-credit counters.
///
/// Accounts are created lazily by the first mutation. Reading a user that
/// has never been credited yields [`CreditAccount::empty`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: UserId,
    pub image_balance: i64,
    pub text_balance: i64,
    /// Cumulative free image credits ever granted.
    pub image_free_total: i64,
    /// Cumulative free text credits ever granted.
    pub text_free_total: i64,
    pub last_reward_date: Option<NaiveDate>,
}

impl CreditAccount {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            image_balance: 0,
            text_balance: 0,
            image_free_total: 0,
            text_free_total: 0,
            last_reward_date: None,
        }
    }

    pub fn balance(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Image => self.image_balance,
            CreditType::Text => self.text_balance,
        }
    }

    pub fn free_total(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Image => self.image_free_total,
            CreditType::Text => self.text_free_total,
        }
    }
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub user_id: UserId,
    pub credit_type: CreditType,
    /// Signed change applied to the balance.
    pub delta: i64,
    pub source: TransactionSource,
    pub resulting_balance: i64,
    pub timestamp: DateTime<Utc>,
    /// Set for purchase entries.
    pub order_id: Option<OrderId>,
}

/// Idempotency witness: the order's credits have been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub processed_at: DateTime<Utc>,
}

/// Credit amounts keyed by credit type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTotals {
    pub image: i64,
    pub text: i64,
}

impl CreditTotals {
    pub fn get(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Image => self.image,
            CreditType::Text => self.text,
        }
    }

    pub fn add(&mut self, credit_type: CreditType, amount: i64) {
        match credit_type {
            CreditType::Image => self.image += amount,
            CreditType::Text => self.text += amount,
        }
    }

    /// `add` that reports overflow instead of wrapping.
    pub fn checked_add(&mut self, credit_type: CreditType, amount: i64) -> Option<()> {
        let slot = match credit_type {
            CreditType::Image => &mut self.image,
            CreditType::Text => &mut self.text,
        };
        *slot = slot.checked_add(amount)?;
        Some(())
    }

    pub fn is_empty(&self) -> bool {
        self.image == 0 && self.text == 0
    }

    /// Non-zero entries in a fixed order (image, then text).
    pub fn non_zero(&self) -> impl Iterator<Item = (CreditType, i64)> + '_ {
        CreditType::ALL
            .into_iter()
            .map(|t| (t, self.get(t)))
            .filter(|(_, amount)| *amount != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_type_round_trips_through_str() {
        for credit_type in CreditType::ALL {
            assert_eq!(credit_type.as_str().parse::<CreditType>().unwrap(), credit_type);
        }
        assert!("audio".parse::<CreditType>().is_err());
    }

    #[test]
    fn test_transaction_source_parse_rejects_unknown() {
        let err = "refund".parse::<TransactionSource>().unwrap_err();
        assert_eq!(err.kind, "transaction source");
        assert_eq!(
            "daily_reward".parse::<TransactionSource>().unwrap(),
            TransactionSource::DailyReward
        );
    }

    #[test]
    fn test_empty_account_is_zeroed() {
        let account = CreditAccount::empty(UserId(42));
        assert_eq!(account.balance(CreditType::Image), 0);
        assert_eq!(account.free_total(CreditType::Text), 0);
        assert!(account.last_reward_date.is_none());
    }

    #[test]
    fn test_credit_totals_non_zero_skips_empty_types() {
        let mut totals = CreditTotals::default();
        assert!(totals.is_empty());
        totals.add(CreditType::Text, 10_000);
        let entries: Vec<_> = totals.non_zero().collect();
        assert_eq!(entries, vec![(CreditType::Text, 10_000)]);
    }

    #[test]
    fn test_credit_totals_checked_add_stops_at_overflow() {
        let mut totals = CreditTotals::default();
        assert!(totals.checked_add(CreditType::Image, i64::MAX).is_some());
        assert!(totals.checked_add(CreditType::Image, 1).is_none());
        assert_eq!(totals.image, i64::MAX);
        assert!(totals.checked_add(CreditType::Text, 1).is_some());
    }
}
