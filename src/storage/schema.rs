//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! Table DDL lives in `migrations/<backend>`.

use sea_query::Iden;

use crate::ledger::CreditType;

/// Accounts table schema.
#[derive(Iden, Clone, Copy)]
pub enum CreditAccounts {
    #[iden = "credit_accounts"]
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "image_balance"]
    ImageBalance,
    #[iden = "text_balance"]
    TextBalance,
    #[iden = "image_free_total"]
    ImageFreeTotal,
    #[iden = "text_free_total"]
    TextFreeTotal,
    #[iden = "last_reward_date"]
    LastRewardDate,
}

impl CreditAccounts {
    /// Balance column for a credit type.
    pub fn balance(credit_type: CreditType) -> Self {
        match credit_type {
            CreditType::Image => CreditAccounts::ImageBalance,
            CreditType::Text => CreditAccounts::TextBalance,
        }
    }

    /// Free-credit counter column for a credit type.
    pub fn free_total(credit_type: CreditType) -> Self {
        match credit_type {
            CreditType::Image => CreditAccounts::ImageFreeTotal,
            CreditType::Text => CreditAccounts::TextFreeTotal,
        }
    }
}

/// Ledger entries table schema.
#[derive(Iden)]
pub enum CreditTransactions {
    #[iden = "credit_transactions"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "credit_type"]
    CreditType,
    #[iden = "delta"]
    Delta,
    #[iden = "source"]
    Source,
    #[iden = "resulting_balance"]
    ResultingBalance,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "order_id"]
    OrderId,
}

/// Processing records table schema.
#[derive(Iden)]
pub enum ProcessingRecords {
    #[iden = "processing_records"]
    Table,
    #[iden = "user_id"]
    UserId,
    #[iden = "order_id"]
    OrderId,
    #[iden = "processed_at"]
    ProcessedAt,
}
