//! In-process broadcast signal source.
//!
//! The host pushes signals with [`ChannelSignalSource::emit`]; a single
//! consumer task dispatches each one to its subscribers, spawning one task
//! per handler call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use super::{OrderSignal, Result, SignalHandler, SignalKind, SignalSource};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

type Handlers = Arc<RwLock<HashMap<SignalKind, Vec<Arc<dyn SignalHandler>>>>>;

/// Signal source backed by a tokio broadcast channel.
pub struct ChannelSignalSource {
    sender: broadcast::Sender<OrderSignal>,
    handlers: Handlers,
    consuming: RwLock<bool>,
}

impl Default for ChannelSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSignalSource {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            consuming: RwLock::new(false),
        }
    }

    /// Fire a signal. Returns the number of live consumers (0 or 1).
    pub fn emit(&self, signal: OrderSignal) -> usize {
        match self.sender.send(signal) {
            Ok(receivers) => {
                debug!(order_id = %signal.order_id, kind = %signal.kind, "Signal emitted");
                receivers
            }
            Err(_) => {
                debug!(
                    order_id = %signal.order_id,
                    kind = %signal.kind,
                    "Signal emitted (no consumer)"
                );
                0
            }
        }
    }

    /// Handlers subscribed to `kind`.
    pub async fn handler_count(&self, kind: SignalKind) -> usize {
        self.handlers.read().await.get(&kind).map_or(0, Vec::len)
    }

    async fn start_consuming(&self) {
        {
            let mut consuming = self.consuming.write().await;
            if *consuming {
                return;
            }
            *consuming = true;
        }

        let mut receiver = self.sender.subscribe();
        let handlers = self.handlers.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(signal) => {
                        let targets = handlers
                            .read()
                            .await
                            .get(&signal.kind)
                            .cloned()
                            .unwrap_or_default();
                        for handler in targets {
                            tokio::spawn(handler.handle(signal));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!(skipped = n, "Signal consumer lagged, skipped signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Signal channel closed, stopping consumer");
                        break;
                    }
                }
            }
        });

        info!("Signal consumer started");
    }
}

#[async_trait]
impl SignalSource for ChannelSignalSource {
    async fn subscribe(&self, kind: SignalKind, handler: Arc<dyn SignalHandler>) -> Result<bool> {
        let count = {
            let mut handlers = self.handlers.write().await;
            let entry = handlers.entry(kind).or_default();
            if entry.iter().any(|h| h.name() == handler.name()) {
                debug!(%kind, handler = handler.name(), "Handler already subscribed");
                return Ok(false);
            }
            entry.push(handler);
            entry.len()
        };
        debug!(%kind, handler_count = count, "Handler subscribed to signal");

        self.start_consuming().await;
        Ok(true)
    }
}
