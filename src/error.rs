//! Engine-level errors.

use crate::commerce::CommerceError;
use crate::ledger::OrderId;
use crate::storage::StorageError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the processor, account manager and reward issuer.
///
/// Guest orders, already-processed orders and products without credit
/// metadata are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("External system unavailable: {0}")]
    ExternalSystemUnavailable(String),

    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("Order {order_id} cannot be credited: {reason}")]
    InvalidOrder { order_id: OrderId, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CommerceError> for LedgerError {
    fn from(err: CommerceError) -> Self {
        match err {
            CommerceError::OrderNotFound(order_id) => LedgerError::OrderNotFound(order_id),
            other => LedgerError::ExternalSystemUnavailable(other.to_string()),
        }
    }
}

impl LedgerError {
    /// True for failures that a later retry or sweep may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::ExternalSystemUnavailable(_) | LedgerError::Storage(_)
        )
    }
}
