//! Idempotent order processor.
//!
//! Applies the credits of an order at most once per `(user, order)`. The
//! reservation is a single insert-if-absent in the ledger store; whichever
//! caller wins it applies the credits, every other caller observes
//! `AlreadyProcessed`.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::snapshot::OrderSnapshotAdapter;
use crate::accounts::CreditAccountManager;
use crate::commerce::OrderStatus;
use crate::config::paid_statuses;
use crate::error::Result;
use crate::ledger::{CreditTotals, CreditType, OrderId, TransactionSource, UserId};

/// Credits applied for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOrder {
    pub user_id: UserId,
    pub order_id: OrderId,
    /// Credits that were written.
    pub credited: CreditTotals,
    /// Credit types whose write failed. The reservation stands regardless.
    pub failed: Vec<CreditType>,
}

/// Result of one `process` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// This call took the reservation and applied the order.
    Applied(AppliedOrder),
    /// A processing record already existed.
    AlreadyProcessed,
    /// The order has no owner.
    GuestOrder,
    /// The order is not in a paid status yet. Nothing was reserved.
    NotEligible(OrderStatus),
    /// The order yields no credits and its reservation was released.
    NothingToCredit,
}

impl ProcessOutcome {
    /// True only when this call performed the reservation.
    pub fn applied(&self) -> bool {
        matches!(self, ProcessOutcome::Applied(_))
    }
}

/// Turns orders into purchase credits exactly once.
pub struct OrderProcessor {
    orders: OrderSnapshotAdapter,
    accounts: CreditAccountManager,
    reserve_empty_orders: bool,
    eligible_statuses: Vec<OrderStatus>,
}

impl OrderProcessor {
    pub fn new(
        orders: OrderSnapshotAdapter,
        accounts: CreditAccountManager,
        reserve_empty_orders: bool,
    ) -> Self {
        Self {
            orders,
            accounts,
            reserve_empty_orders,
            eligible_statuses: paid_statuses(),
        }
    }

    /// Replace the statuses in which an order may be credited.
    pub fn with_eligible_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.eligible_statuses = statuses;
        self
    }

    pub fn orders(&self) -> &OrderSnapshotAdapter {
        &self.orders
    }

    /// Process an order.
    ///
    /// Lookup failures, unpaid statuses and unpriceable orders are returned
    /// before anything is reserved. Once the reservation is taken, per-type
    /// credit failures are logged and reported in the outcome instead.
    #[tracing::instrument(name = "orders.process", skip_all, fields(%order_id))]
    pub async fn process(&self, order_id: OrderId) -> Result<ProcessOutcome> {
        let snapshot = self.orders.fetch(order_id).await?;

        let Some(user_id) = snapshot.owner else {
            info!(%order_id, "Guest order skipped");
            return Ok(ProcessOutcome::GuestOrder);
        };

        if !self.eligible_statuses.contains(&snapshot.status) {
            debug!(%order_id, %user_id, status = %snapshot.status, "Order not paid yet");
            return Ok(ProcessOutcome::NotEligible(snapshot.status));
        }

        let totals = snapshot.credit_totals()?;

        let store = self.accounts.store();
        if !store.reserve_order(user_id, order_id, Utc::now()).await? {
            info!(%order_id, %user_id, "Order already processed");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        if totals.is_empty() && !self.reserve_empty_orders {
            store.release_order(user_id, order_id).await?;
            info!(%order_id, %user_id, "Order carries no credits, reservation released");
            return Ok(ProcessOutcome::NothingToCredit);
        }

        let mut credited = CreditTotals::default();
        let mut failed = Vec::new();
        for (credit_type, amount) in totals.non_zero() {
            match self
                .accounts
                .credit_for_order(
                    user_id,
                    credit_type,
                    amount,
                    TransactionSource::Purchase,
                    Some(order_id),
                )
                .await
            {
                Ok(_) => credited.add(credit_type, amount),
                Err(e) => {
                    error!(
                        %order_id,
                        %user_id,
                        %credit_type,
                        amount,
                        error = %e,
                        "Failed to apply purchase credits"
                    );
                    failed.push(credit_type);
                }
            }
        }

        if failed.is_empty() {
            info!(
                %order_id,
                %user_id,
                image = credited.image,
                text = credited.text,
                "Order credited"
            );
        } else {
            warn!(
                %order_id,
                %user_id,
                image = credited.image,
                text = credited.text,
                failed = ?failed,
                "Order partially credited"
            );
        }

        Ok(ProcessOutcome::Applied(AppliedOrder {
            user_id,
            order_id,
            credited,
            failed,
        }))
    }

    /// Delete the order's processing record and process it again.
    ///
    /// Manual recovery only. Credits already written for the order are not
    /// reversed, so re-running a fully applied order credits it twice.
    #[tracing::instrument(name = "orders.force_reprocess", skip_all, fields(%order_id))]
    pub async fn force_reprocess(&self, order_id: OrderId) -> Result<ProcessOutcome> {
        let snapshot = self.orders.fetch(order_id).await?;
        let Some(user_id) = snapshot.owner else {
            return Ok(ProcessOutcome::GuestOrder);
        };
        if !self.eligible_statuses.contains(&snapshot.status) {
            return Ok(ProcessOutcome::NotEligible(snapshot.status));
        }

        let released = self
            .accounts
            .store()
            .release_order(user_id, order_id)
            .await?;
        warn!(%order_id, %user_id, released, "Forcing order reprocess");

        self.process(order_id).await
    }
}
