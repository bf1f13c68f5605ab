//! Normalized order snapshots.
//!
//! The adapter reads an order and the catalog credit metadata of each of its
//! products, producing an [`OrderSnapshot`] the processor can price without
//! further I/O.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::commerce::{CommerceClient, CommerceError, CommerceOrder, OrderStatus};
use crate::config::CreditsConfig;
use crate::error::{LedgerError, Result};
use crate::ledger::{CreditTotals, CreditType, OrderId, ProductId, UserId};

/// One priced line of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub product_id: ProductId,
    /// `None` when the product carries no credit metadata.
    pub credit_type: Option<CreditType>,
    pub quantity: u32,
    pub total_price: Decimal,
    /// Zero if the product carries no credit metadata.
    pub credits_per_unit: Decimal,
}

impl LineItem {
    /// `floor(total_price × credits_per_unit)`, or 0 for non-credit items.
    ///
    /// `None` when the product does not fit the ledger's `i64` balances.
    pub fn credits(&self) -> Option<i64> {
        if self.credit_type.is_none() {
            return Some(0);
        }
        let credits = self
            .total_price
            .checked_mul(self.credits_per_unit)?
            .floor()
            .to_i64()?;
        Some(credits.max(0))
    }
}

/// Order state at the moment it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    /// `None` for guest orders.
    pub owner: Option<UserId>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub line_items: Vec<LineItem>,
}

impl OrderSnapshot {
    /// Credits per type over all credit-bearing line items.
    ///
    /// Fails with [`LedgerError::InvalidOrder`] when a line or a per-type sum
    /// overflows.
    pub fn credit_totals(&self) -> Result<CreditTotals> {
        let mut totals = CreditTotals::default();
        for item in &self.line_items {
            let Some(credit_type) = item.credit_type else {
                continue;
            };
            item.credits()
                .and_then(|credits| totals.checked_add(credit_type, credits))
                .ok_or_else(|| LedgerError::InvalidOrder {
                    order_id: self.order_id,
                    reason: format!(
                        "{credit_type} credits for product {} overflow",
                        item.product_id
                    ),
                })?;
        }
        Ok(totals)
    }
}

/// Reads orders from the commerce system into snapshots.
pub struct OrderSnapshotAdapter {
    client: Arc<dyn CommerceClient>,
    credits: CreditsConfig,
    timeout: Duration,
}

impl OrderSnapshotAdapter {
    pub fn new(client: Arc<dyn CommerceClient>, credits: CreditsConfig, timeout: Duration) -> Self {
        Self {
            client,
            credits,
            timeout,
        }
    }

    /// Fetch an order and resolve the credit metadata of every line item.
    pub async fn fetch(&self, order_id: OrderId) -> Result<OrderSnapshot> {
        let order = self.bounded(self.client.get_order(order_id)).await?;

        let mut line_items = Vec::with_capacity(order.line_items.len());
        for item in &order.line_items {
            let entry = self
                .bounded(self.client.get_catalog_entry(item.product_id))
                .await?;

            let (credit_type, credits_per_unit) = match entry {
                Some(entry) if entry.credits_per_unit.is_zero() => {
                    (Some(entry.credit_type), self.credits.rate(entry.credit_type))
                }
                Some(entry) => (Some(entry.credit_type), entry.credits_per_unit),
                None => {
                    warn!(
                        %order_id,
                        product_id = %item.product_id,
                        "Product metadata missing, line item skipped"
                    );
                    (None, Decimal::ZERO)
                }
            };

            line_items.push(LineItem {
                product_id: item.product_id,
                credit_type,
                quantity: item.quantity,
                total_price: item.total,
                credits_per_unit,
            });
        }

        debug!(%order_id, items = line_items.len(), "Fetched order snapshot");
        Ok(Self::snapshot(order, line_items))
    }

    /// Orders in `statuses` created within `lookback` of now.
    ///
    /// Line items are left unresolved; callers re-read the order with
    /// [`fetch`](Self::fetch) before pricing it.
    pub async fn list_recent(
        &self,
        statuses: &[OrderStatus],
        lookback: Duration,
    ) -> Result<Vec<OrderSnapshot>> {
        let lookback = chrono::Duration::from_std(lookback).unwrap_or(chrono::Duration::MAX);
        let since = Utc::now()
            .checked_sub_signed(lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let orders = self.bounded(self.client.list_orders(statuses, since)).await?;
        Ok(orders
            .into_iter()
            .map(|order| Self::snapshot(order, Vec::new()))
            .collect())
    }

    fn snapshot(order: CommerceOrder, line_items: Vec<LineItem>) -> OrderSnapshot {
        OrderSnapshot {
            order_id: order.id,
            owner: order.customer_id,
            status: order.status,
            created_at: order.created_at,
            line_items,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = crate::commerce::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CommerceError::Timeout.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::{line_item, MockCommerceClient};

    fn adapter(client: Arc<MockCommerceClient>) -> OrderSnapshotAdapter {
        OrderSnapshotAdapter::new(client, CreditsConfig::default(), Duration::from_millis(200))
    }

    #[test]
    fn test_line_item_credits_floors_fractional_result() {
        let item = LineItem {
            product_id: ProductId(1),
            credit_type: Some(CreditType::Image),
            quantity: 1,
            total_price: Decimal::new(199, 2),
            credits_per_unit: Decimal::new(15, 1),
        };
        // 1.99 * 1.5 = 2.985
        assert_eq!(item.credits(), Some(2));
    }

    #[test]
    fn test_line_item_without_type_yields_nothing() {
        let item = LineItem {
            product_id: ProductId(1),
            credit_type: None,
            quantity: 1,
            total_price: Decimal::from(10),
            credits_per_unit: Decimal::from(100),
        };
        assert_eq!(item.credits(), Some(0));
    }

    #[test]
    fn test_line_item_credits_out_of_range() {
        let mut item = LineItem {
            product_id: ProductId(1),
            credit_type: Some(CreditType::Image),
            quantity: 1,
            total_price: Decimal::MAX,
            credits_per_unit: Decimal::from(100),
        };
        assert_eq!(item.credits(), None);

        // Fits in a Decimal but not in an i64 balance.
        item.total_price = Decimal::from(100_000_000_000_000_000u64);
        assert_eq!(item.credits(), None);
    }

    #[test]
    fn test_credit_totals_rejects_overflowing_sum() {
        let item = |total: i64| LineItem {
            product_id: ProductId(1),
            credit_type: Some(CreditType::Text),
            quantity: 1,
            total_price: Decimal::from(total),
            credits_per_unit: Decimal::ONE,
        };
        let snapshot = OrderSnapshot {
            order_id: OrderId(77),
            owner: Some(UserId(1)),
            status: OrderStatus::Completed,
            created_at: Utc::now(),
            line_items: vec![item(i64::MAX), item(1)],
        };

        let err = snapshot.credit_totals().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrder { order_id: OrderId(77), .. }));
    }

    #[tokio::test]
    async fn test_fetch_resolves_catalog_and_skips_unknown_products() {
        let client = Arc::new(MockCommerceClient::new());
        client
            .set_catalog_entry(ProductId(1), CreditType::Image, Decimal::from(100))
            .await;
        client
            .add_simple_order(
                OrderId(502),
                Some(UserId(42)),
                OrderStatus::Processing,
                vec![
                    line_item(1, 1, Decimal::new(200, 2)),
                    line_item(99, 1, Decimal::new(300, 2)),
                ],
            )
            .await;

        let snapshot = adapter(client).fetch(OrderId(502)).await.unwrap();
        assert_eq!(snapshot.owner, Some(UserId(42)));
        assert_eq!(snapshot.line_items[0].credit_type, Some(CreditType::Image));
        assert_eq!(snapshot.line_items[1].credit_type, None);
        let totals = snapshot.credit_totals().unwrap();
        assert_eq!(totals.image, 200);
        assert_eq!(totals.text, 0);
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_configured_rate() {
        let client = Arc::new(MockCommerceClient::new());
        client
            .set_catalog_entry(ProductId(2), CreditType::Text, Decimal::ZERO)
            .await;
        client
            .add_simple_order(
                OrderId(1),
                Some(UserId(1)),
                OrderStatus::Completed,
                vec![line_item(2, 1, Decimal::from(1))],
            )
            .await;

        let snapshot = adapter(client).fetch(OrderId(1)).await.unwrap();
        assert_eq!(snapshot.line_items[0].credits_per_unit, Decimal::from(10_000));
        assert_eq!(snapshot.credit_totals().unwrap().text, 10_000);
    }

    #[tokio::test]
    async fn test_fetch_unknown_order_is_not_found() {
        let client = Arc::new(MockCommerceClient::new());
        let err = adapter(client).fetch(OrderId(404)).await.unwrap_err();
        assert!(matches!(err, LedgerError::OrderNotFound(OrderId(404))));
    }

    #[tokio::test]
    async fn test_fetch_times_out_as_unavailable() {
        let client = Arc::new(MockCommerceClient::new());
        client
            .add_simple_order(OrderId(1), Some(UserId(1)), OrderStatus::Completed, vec![])
            .await;
        client.set_delay(Some(Duration::from_secs(5))).await;

        let err = adapter(client).fetch(OrderId(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ExternalSystemUnavailable(_)));
    }

    #[tokio::test]
    async fn test_list_recent_filters_status() {
        let client = Arc::new(MockCommerceClient::new());
        client
            .add_simple_order(OrderId(1), Some(UserId(1)), OrderStatus::Completed, vec![])
            .await;
        client
            .add_simple_order(OrderId(2), Some(UserId(1)), OrderStatus::Cancelled, vec![])
            .await;

        let recent = adapter(client)
            .list_recent(&[OrderStatus::Completed], Duration::from_secs(3600))
            .await
            .unwrap();
        let ids: Vec<_> = recent.iter().map(|s| s.order_id).collect();
        assert_eq!(ids, vec![OrderId(1)]);
    }
}
