//! Credit Ledger - exactly-once purchase crediting and daily rewards
//!
//! Converts order notifications from an external commerce system into
//! durable per-user credit balances. Every purchase is credited at most once
//! no matter how often, or whether, its lifecycle signals fire; a scheduled
//! reconciliation sweep closes the gaps left by missed signals.

pub mod accounts;
pub mod commerce;
pub mod config;
pub mod error;
pub mod grpc;
pub mod ledger;
pub mod orders;
pub mod reconcile;
pub mod rewards;
pub mod storage;
pub mod triggers;
pub mod utils;

pub mod proto {
    tonic::include_proto!("credit_ledger.v1");
}

pub use error::{LedgerError, Result};
