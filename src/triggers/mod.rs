//! Order lifecycle triggers.
//!
//! The commerce system may announce an order any number of times, at any
//! point of its lifecycle, or not at all. Every signal kind is funneled into
//! the same idempotent processor, so no individual signal is load-bearing.
//!
//! This module contains:
//! - `SignalSource` trait: where lifecycle signals come from
//! - `ChannelSignalSource`: in-process broadcast source fed by the host
//! - `EventTriggerRegistry`: subscribes the processor to every signal kind once

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ledger::OrderId;
use crate::orders::{OrderProcessor, ProcessOutcome};

mod channel;

pub use channel::ChannelSignalSource;

/// Result type for trigger operations.
pub type Result<T> = std::result::Result<T, TriggerError>;

/// Errors subscribing to a signal source.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Signal source error: {0}")]
    Source(String),
}

/// Every lifecycle signal the commerce system can emit for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Created,
    StatusPending,
    StatusProcessing,
    StatusOnHold,
    StatusCompleted,
    StatusFailed,
    StatusCancelled,
    PaymentCompleted,
    AdminEdited,
    Saved,
}

impl SignalKind {
    pub const ALL: [SignalKind; 10] = [
        SignalKind::Created,
        SignalKind::StatusPending,
        SignalKind::StatusProcessing,
        SignalKind::StatusOnHold,
        SignalKind::StatusCompleted,
        SignalKind::StatusFailed,
        SignalKind::StatusCancelled,
        SignalKind::PaymentCompleted,
        SignalKind::AdminEdited,
        SignalKind::Saved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Created => "created",
            SignalKind::StatusPending => "status_pending",
            SignalKind::StatusProcessing => "status_processing",
            SignalKind::StatusOnHold => "status_on_hold",
            SignalKind::StatusCompleted => "status_completed",
            SignalKind::StatusFailed => "status_failed",
            SignalKind::StatusCancelled => "status_cancelled",
            SignalKind::PaymentCompleted => "payment_completed",
            SignalKind::AdminEdited => "admin_edited",
            SignalKind::Saved => "saved",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fired lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSignal {
    pub kind: SignalKind,
    pub order_id: OrderId,
}

/// Reacts to one delivered signal.
pub trait SignalHandler: Send + Sync {
    /// Identity used by sources to drop duplicate subscriptions.
    fn name(&self) -> &str;

    fn handle(&self, signal: OrderSignal) -> BoxFuture<'static, ()>;
}

/// Interface for lifecycle signal delivery.
///
/// Implementations run each delivered signal as an independent task.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Deliver every future signal of `kind` to `handler`.
    ///
    /// Returns false, subscribing nothing, when a handler with the same
    /// [`name`](SignalHandler::name) is already subscribed to `kind`.
    async fn subscribe(&self, kind: SignalKind, handler: Arc<dyn SignalHandler>) -> Result<bool>;
}

const PROCESSOR_HANDLER: &str = "order_processor";

/// Forwards signals to [`OrderProcessor::process`], logging the result.
pub struct ProcessorSignalHandler {
    processor: Arc<OrderProcessor>,
}

impl ProcessorSignalHandler {
    pub fn new(processor: Arc<OrderProcessor>) -> Self {
        Self { processor }
    }
}

impl SignalHandler for ProcessorSignalHandler {
    fn name(&self) -> &str {
        PROCESSOR_HANDLER
    }

    fn handle(&self, signal: OrderSignal) -> BoxFuture<'static, ()> {
        let processor = self.processor.clone();
        Box::pin(async move {
            let OrderSignal { kind, order_id } = signal;
            match processor.process(order_id).await {
                Ok(ProcessOutcome::Applied(applied)) => info!(
                    %order_id,
                    signal = %kind,
                    image = applied.credited.image,
                    text = applied.credited.text,
                    "Signal applied order"
                ),
                Ok(outcome) => debug!(%order_id, signal = %kind, ?outcome, "Signal handled"),
                Err(e) => warn!(
                    %order_id,
                    signal = %kind,
                    error = %e,
                    "Signal processing failed; reconciliation will retry"
                ),
            }
        })
    }
}

/// Subscribes the processor to every signal kind, at most once each.
///
/// The source enforces the at-most-once rule, so registries built over the
/// same source from separate init paths do not double-subscribe.
pub struct EventTriggerRegistry {
    source: Arc<dyn SignalSource>,
    registered: Mutex<HashSet<SignalKind>>,
}

impl EventTriggerRegistry {
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self {
            source,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribe `processor` to every signal kind not yet subscribed.
    ///
    /// Returns how many subscriptions this call created; a repeat call, from
    /// this or any other registry over the same source, returns 0.
    pub async fn register(&self, processor: Arc<OrderProcessor>) -> Result<usize> {
        let mut registered = self.registered.lock().await;
        let handler: Arc<dyn SignalHandler> = Arc::new(ProcessorSignalHandler::new(processor));

        let mut added = 0;
        for kind in SignalKind::ALL {
            if registered.contains(&kind) {
                continue;
            }
            if self.source.subscribe(kind, handler.clone()).await? {
                added += 1;
            }
            registered.insert(kind);
        }

        if added > 0 {
            info!(added, total = registered.len(), "Order triggers registered");
        } else {
            debug!("Order triggers already registered");
        }
        Ok(added)
    }

    /// Signal kinds currently subscribed.
    pub async fn registered(&self) -> usize {
        self.registered.lock().await.len()
    }
}

#[cfg(test)]
mod tests;
