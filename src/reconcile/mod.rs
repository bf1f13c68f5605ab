//! Reconciliation auditor.
//!
//! Periodically lists recent orders and re-drives each through the
//! idempotent processor. Already-processed orders are no-ops, so the sweep
//! converges the ledger even if no lifecycle signal ever fires.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::commerce::OrderStatus;
use crate::config::ReconciliationConfig;
use crate::orders::OrderProcessor;

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditResult {
    pub orders_scanned: usize,
    pub orders_applied: usize,
    pub errors: usize,
}

/// Scheduled re-driver of recent orders.
#[derive(Clone)]
pub struct ReconciliationAuditor {
    processor: Arc<OrderProcessor>,
    config: ReconciliationConfig,
}

impl ReconciliationAuditor {
    pub fn new(processor: Arc<OrderProcessor>, config: ReconciliationConfig) -> Self {
        Self { processor, config }
    }

    /// Process every order in `statuses` created within `lookback`.
    ///
    /// Per-order failures are counted and logged; they never abort the
    /// sweep. A listing failure counts as one error and ends the sweep.
    #[tracing::instrument(name = "reconcile.sweep", skip_all, fields(?lookback))]
    pub async fn sweep(&self, lookback: Duration, statuses: &[OrderStatus]) -> AuditResult {
        let mut result = AuditResult::default();

        let orders = match self.processor.orders().list_recent(statuses, lookback).await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "Failed to list orders for reconciliation");
                result.errors = 1;
                return result;
            }
        };
        result.orders_scanned = orders.len();

        let concurrency = self.config.concurrency.max(1);
        let outcomes: Vec<_> = stream::iter(orders)
            .map(|order| {
                let processor = self.processor.clone();
                async move { (order.order_id, processor.process(order.order_id).await) }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (order_id, outcome) in outcomes {
            match outcome {
                Ok(outcome) if outcome.applied() => {
                    info!(%order_id, "Reconciliation applied missed order");
                    result.orders_applied += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%order_id, error = %e, "Reconciliation failed for order");
                    result.errors += 1;
                }
            }
        }

        info!(
            scanned = result.orders_scanned,
            applied = result.orders_applied,
            errors = result.errors,
            "Reconciliation sweep complete"
        );
        result
    }

    /// One sweep with the configured lookback and statuses.
    pub async fn run_once(&self) -> AuditResult {
        self.sweep(self.config.lookback(), &self.config.statuses).await
    }

    /// Sweep on the configured interval until the handle is aborted.
    ///
    /// The first sweep runs immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                interval = ?self.config.interval(),
                lookback = ?self.config.lookback(),
                statuses = ?self.config.statuses,
                "Reconciliation auditor started"
            );

            loop {
                ticker.tick().await;
                let result = self.run_once().await;
                debug!(?result, "Reconciliation tick done");
            }
        })
    }
}
