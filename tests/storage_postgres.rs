//! PostgreSQL storage integration tests using testcontainers.
//!
//! Run with: cargo test --test storage_postgres --features postgres -- --nocapture
//!
//! These tests spin up PostgreSQL in a container using testcontainers-rs,
//! run migrations through the store's own connect path, and test the
//! LedgerStore interface.

mod storage;

use std::time::Duration;

use credit_ledger::storage::PostgresLedgerStore;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};

/// Start PostgreSQL container.
///
/// Returns (container, connection_string).
async fn start_postgres() -> (testcontainers::ContainerAsync<GenericImage>, String) {
    // PostgreSQL logs the ready message twice: once for initdb, once for real.
    let image = GenericImage::new("postgres", "16")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ));

    let container = image
        .with_env_var("POSTGRES_USER", "ledger")
        .with_env_var("POSTGRES_PASSWORD", "ledger")
        .with_env_var("POSTGRES_DB", "credit_ledger")
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start postgres container");

    // Brief delay to ensure PostgreSQL is fully ready to accept connections
    tokio::time::sleep(Duration::from_secs(1)).await;

    let host_port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get mapped port");

    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let connection_string = format!(
        "postgres://ledger:ledger@{}:{}/credit_ledger",
        host, host_port
    );
    println!("PostgreSQL available at: {}", connection_string);

    (container, connection_string)
}

#[tokio::test]
async fn test_postgres_ledger_store() {
    println!("=== PostgreSQL LedgerStore Tests ===");
    println!("Starting PostgreSQL container...");

    let (_container, connection_string) = start_postgres().await;
    let store = PostgresLedgerStore::connect(&connection_string, None)
        .await
        .expect("Failed to open PostgreSQL ledger");

    println!("Running LedgerStore tests...");
    run_ledger_store_tests!(&store);

    println!("=== All PostgreSQL LedgerStore tests PASSED ===");
}

#[tokio::test]
async fn test_postgres_ledger_store_retention() {
    let (_container, connection_string) = start_postgres().await;
    let store = PostgresLedgerStore::connect(&connection_string, Some(2))
        .await
        .expect("Failed to open PostgreSQL ledger");

    storage::ledger_store_tests::test_retention_prunes_per_type(&store).await;
}
