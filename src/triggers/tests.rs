use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;

use super::*;
use crate::accounts::CreditAccountManager;
use crate::commerce::{line_item, MockCommerceClient, OrderStatus};
use crate::config::CreditsConfig;
use crate::ledger::{CreditType, ProductId, UserId};
use crate::orders::OrderSnapshotAdapter;
use crate::storage::{LedgerStore, MockLedgerStore};

/// Counts subscriptions without delivering anything.
#[derive(Default)]
struct CountingSource {
    subscriptions: AtomicUsize,
}

#[async_trait]
impl SignalSource for CountingSource {
    async fn subscribe(&self, _kind: SignalKind, _handler: Arc<dyn SignalHandler>) -> Result<bool> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

async fn processor_with_order(store: Arc<MockLedgerStore>) -> Arc<OrderProcessor> {
    let commerce = Arc::new(MockCommerceClient::new());
    commerce
        .set_catalog_entry(ProductId(1), CreditType::Image, Decimal::from(100))
        .await;
    commerce
        .add_simple_order(
            OrderId(501),
            Some(UserId(42)),
            OrderStatus::Processing,
            vec![line_item(1, 1, Decimal::new(500, 2))],
        )
        .await;

    let adapter =
        OrderSnapshotAdapter::new(commerce, CreditsConfig::default(), Duration::from_secs(1));
    Arc::new(OrderProcessor::new(
        adapter,
        CreditAccountManager::new(store),
        true,
    ))
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let source = Arc::new(CountingSource::default());
    let registry = EventTriggerRegistry::new(source.clone());
    let processor = processor_with_order(Arc::new(MockLedgerStore::new())).await;

    assert_eq!(registry.register(processor.clone()).await.unwrap(), SignalKind::ALL.len());
    assert_eq!(registry.register(processor).await.unwrap(), 0);
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), SignalKind::ALL.len());
    assert_eq!(registry.registered().await, SignalKind::ALL.len());
}

#[tokio::test]
async fn test_redundant_signals_credit_once() {
    let store = Arc::new(MockLedgerStore::new());
    let source = Arc::new(ChannelSignalSource::new());
    let registry = EventTriggerRegistry::new(source.clone());
    registry
        .register(processor_with_order(store.clone()).await)
        .await
        .unwrap();

    for kind in [
        SignalKind::Created,
        SignalKind::PaymentCompleted,
        SignalKind::StatusProcessing,
        SignalKind::Saved,
        SignalKind::Saved,
    ] {
        source.emit(OrderSignal {
            kind,
            order_id: OrderId(501),
        });
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.processed_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    // Let the remaining duplicate deliveries finish.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let account = store.account(UserId(42)).await.unwrap().unwrap();
    assert_eq!(account.image_balance, 500);
    assert_eq!(store.transactions(UserId(42), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_emit_without_subscribers_is_dropped() {
    let source = ChannelSignalSource::new();
    let delivered = source.emit(OrderSignal {
        kind: SignalKind::Created,
        order_id: OrderId(1),
    });
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_second_registry_over_same_source_adds_nothing() {
    let store = Arc::new(MockLedgerStore::new());
    let source = Arc::new(ChannelSignalSource::new());
    let processor = processor_with_order(store.clone()).await;

    let first = EventTriggerRegistry::new(source.clone());
    let second = EventTriggerRegistry::new(source.clone());
    assert_eq!(first.register(processor.clone()).await.unwrap(), SignalKind::ALL.len());
    assert_eq!(second.register(processor).await.unwrap(), 0);
    assert_eq!(source.handler_count(SignalKind::Created).await, 1);
}
