//! External commerce system boundary.
//!
//! This module contains:
//! - `CommerceClient` trait: orders, order listing and catalog credit metadata
//! - `HttpCommerceClient`: JSON over HTTP
//! - `MockCommerceClient`: in-memory orders and catalog for tests

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{CreditType, OrderId, ProductId, UserId};

mod http;
mod mock;

pub use http::HttpCommerceClient;
pub use mock::{line_item, MockCommerceClient};

/// Result type for commerce operations.
pub type Result<T> = std::result::Result<T, CommerceError>;

/// Errors talking to the commerce system.
#[derive(Debug, thiserror::Error)]
pub enum CommerceError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Commerce request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Commerce system unavailable: {0}")]
    Unavailable(String),
}

/// Order lifecycle status as reported by the commerce system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order as returned by the commerce API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceOrder {
    pub id: OrderId,
    /// Absent for guest checkouts.
    #[serde(default)]
    pub customer_id: Option<UserId>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub line_items: Vec<CommerceLineItem>,
}

/// Line item as returned by the commerce API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceLineItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Line total in currency units.
    pub total: Decimal,
}

/// Credit metadata registered on a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub credit_type: CreditType,
    /// Zero when the product names a type but no explicit rate.
    #[serde(default)]
    pub credits_per_unit: Decimal,
}

/// Read access to the external commerce system.
#[async_trait]
pub trait CommerceClient: Send + Sync {
    /// Fetch one order with its line items.
    async fn get_order(&self, order_id: OrderId) -> Result<CommerceOrder>;

    /// List orders in any of `statuses` created at or after `since`.
    async fn list_orders(
        &self,
        statuses: &[OrderStatus],
        since: DateTime<Utc>,
    ) -> Result<Vec<CommerceOrder>>;

    /// Credit metadata for a product, `None` if the product carries none.
    async fn get_catalog_entry(&self, product_id: ProductId) -> Result<Option<CatalogEntry>>;
}
