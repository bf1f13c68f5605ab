//! credit-ledger: Credit ledger daemon
//!
//! Serves the CreditLedger gRPC API, feeds order signals into the idempotent
//! processor and runs the reconciliation sweep and optional reward schedule.
//!
//! ## Architecture
//! ```text
//! [commerce webhooks] --(NotifyOrder)--> [signal channel] --> [processor] --> [ledger store]
//!                                                                 ^
//! [reconciliation timer] --(list recent orders)-------------------+
//! ```
//!
//! ## Configuration
//! - `--config <path>` or CREDIT_LEDGER_CONFIG: YAML config file
//! - CREDIT_LEDGER__SECTION__KEY: per-key overrides
//! - CREDIT_LEDGER_LOG: tracing filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::{error, info};

use credit_ledger::accounts::CreditAccountManager;
use credit_ledger::commerce::{CommerceClient, HttpCommerceClient};
use credit_ledger::config::Config;
use credit_ledger::grpc::{CreditLedgerServer, CreditLedgerService};
use credit_ledger::orders::{OrderProcessor, OrderSnapshotAdapter};
use credit_ledger::reconcile::ReconciliationAuditor;
use credit_ledger::rewards::DailyRewardIssuer;
use credit_ledger::storage::init_storage;
use credit_ledger::triggers::{ChannelSignalSource, EventTriggerRegistry};
use credit_ledger::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    init_tracing(config.logging.json);

    info!("Starting credit-ledger");

    let store = init_storage(&config.storage).await?;
    info!("Storage initialized");

    let commerce: Arc<dyn CommerceClient> = Arc::new(HttpCommerceClient::new(&config.commerce)?);
    info!(base_url = %config.commerce.base_url, "Commerce client configured");

    let accounts = CreditAccountManager::new(store);
    let adapter = OrderSnapshotAdapter::new(
        commerce,
        config.credits.clone(),
        config.commerce.timeout(),
    );
    let processor = Arc::new(
        OrderProcessor::new(adapter, accounts.clone(), config.credits.reserve_empty_orders)
            .with_eligible_statuses(config.credits.eligible_statuses.clone()),
    );
    let rewards = DailyRewardIssuer::new(accounts.clone(), config.rewards.clone());

    let signals = Arc::new(ChannelSignalSource::new());
    let registry = EventTriggerRegistry::new(signals.clone());
    registry.register(processor.clone()).await?;

    let mut jobs = Vec::new();
    if config.reconciliation.enabled {
        let auditor = ReconciliationAuditor::new(processor.clone(), config.reconciliation.clone());
        jobs.push(auditor.spawn());
    } else {
        info!("Reconciliation disabled");
    }
    if config.rewards.schedule {
        jobs.push(rewards.clone().spawn(config.rewards.schedule_interval()));
    }

    let service = CreditLedgerService::new(
        accounts,
        rewards,
        processor,
        signals,
        config.server.admin_token.clone(),
    );

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<CreditLedgerServer<CreditLedgerService>>()
        .await;

    let addr: SocketAddr = config.server.bind_address().parse()?;
    info!(%addr, "credit-ledger serving");

    let served = Server::builder()
        .add_service(health_service)
        .add_service(service.into_server())
        .serve_with_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await;

    for job in jobs {
        job.abort();
    }

    served?;
    info!("credit-ledger stopped");
    Ok(())
}
