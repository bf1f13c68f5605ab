//! In-memory commerce system for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{
    CatalogEntry, CommerceClient, CommerceError, CommerceLineItem, CommerceOrder, OrderStatus,
    Result,
};
use crate::ledger::{CreditType, OrderId, ProductId, UserId};

/// Mock commerce client with injectable outages and latency.
#[derive(Default)]
pub struct MockCommerceClient {
    orders: RwLock<HashMap<OrderId, CommerceOrder>>,
    catalog: RwLock<HashMap<ProductId, CatalogEntry>>,
    unavailable: RwLock<bool>,
    failing_orders: RwLock<Vec<OrderId>>,
    delay: RwLock<Option<Duration>>,
    order_fetches: AtomicUsize,
}

impl MockCommerceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_order(&self, order: CommerceOrder) {
        self.orders.write().await.insert(order.id, order);
    }

    /// Convenience for a single-owner order in `status` created now.
    pub async fn add_simple_order(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
        status: OrderStatus,
        line_items: Vec<CommerceLineItem>,
    ) {
        self.add_order(CommerceOrder {
            id: order_id,
            customer_id: owner,
            status,
            created_at: Utc::now(),
            line_items,
        })
        .await;
    }

    pub async fn set_catalog_entry(
        &self,
        product_id: ProductId,
        credit_type: CreditType,
        credits_per_unit: Decimal,
    ) {
        self.catalog.write().await.insert(
            product_id,
            CatalogEntry {
                credit_type,
                credits_per_unit,
            },
        );
    }

    /// Make every call fail with `CommerceError::Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Make `get_order` fail for one order only.
    pub async fn fail_order(&self, order_id: OrderId) {
        self.failing_orders.write().await.push(order_id);
    }

    /// Delay every call, for timeout tests.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    /// Number of `get_order` calls served so far.
    pub fn order_fetches(&self) -> usize {
        self.order_fetches.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<()> {
        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }
        if *self.unavailable.read().await {
            return Err(CommerceError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }
}

/// Line item helper for tests.
pub fn line_item(product_id: u64, quantity: u32, total: Decimal) -> CommerceLineItem {
    CommerceLineItem {
        product_id: ProductId(product_id),
        quantity,
        total,
    }
}

#[async_trait]
impl CommerceClient for MockCommerceClient {
    async fn get_order(&self, order_id: OrderId) -> Result<CommerceOrder> {
        self.order_fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        if self.failing_orders.read().await.contains(&order_id) {
            return Err(CommerceError::Unavailable(format!(
                "mock failure for order {order_id}"
            )));
        }
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or(CommerceError::OrderNotFound(order_id))
    }

    async fn list_orders(
        &self,
        statuses: &[OrderStatus],
        since: DateTime<Utc>,
    ) -> Result<Vec<CommerceOrder>> {
        self.simulate().await?;
        let mut orders: Vec<CommerceOrder> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| statuses.contains(&o.status) && o.created_at >= since)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn get_catalog_entry(&self, product_id: ProductId) -> Result<Option<CatalogEntry>> {
        self.simulate().await?;
        Ok(self.catalog.read().await.get(&product_id).copied())
    }
}
