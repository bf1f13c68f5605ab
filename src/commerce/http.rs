//! HTTP client for the commerce REST API.
//!
//! Routes:
//! - `GET {base}/orders/{id}`
//! - `GET {base}/orders?status=a,b&after=<rfc3339>`
//! - `GET {base}/products/{id}/credits` (404 means no credit metadata)
//!
//! Failures are reported, never retried here; the reconciliation sweep is
//! the retry mechanism.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use super::{CatalogEntry, CommerceClient, CommerceError, CommerceOrder, OrderStatus, Result};
use crate::config::CommerceConfig;
use crate::ledger::{OrderId, ProductId};

/// `CommerceClient` over JSON/HTTP.
pub struct HttpCommerceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCommerceClient {
    /// Build a client whose every request is bounded by the configured timeout.
    pub fn new(config: &CommerceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                CommerceError::Timeout
            } else {
                CommerceError::Http(e)
            }
        })
    }

    fn unexpected(status: StatusCode, what: &str) -> CommerceError {
        warn!(status = %status, what, "Commerce API returned unexpected status");
        CommerceError::Unavailable(format!("{what}: HTTP {status}"))
    }
}

#[async_trait]
impl CommerceClient for HttpCommerceClient {
    async fn get_order(&self, order_id: OrderId) -> Result<CommerceOrder> {
        let response = Self::send(self.get(&format!("/orders/{order_id}"))).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CommerceError::OrderNotFound(order_id)),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(Self::unexpected(status, "get order")),
        }
    }

    async fn list_orders(
        &self,
        statuses: &[OrderStatus],
        since: DateTime<Utc>,
    ) -> Result<Vec<CommerceOrder>> {
        let status = statuses
            .iter()
            .map(OrderStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let after = since.to_rfc3339_opts(SecondsFormat::Secs, true);

        let request = self
            .get("/orders")
            .query(&[("status", status.as_str()), ("after", after.as_str())]);
        let response = Self::send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unexpected(status, "list orders"));
        }

        let orders: Vec<CommerceOrder> = response.json().await?;
        debug!(count = orders.len(), %after, "Listed commerce orders");
        Ok(orders)
    }

    async fn get_catalog_entry(&self, product_id: ProductId) -> Result<Option<CatalogEntry>> {
        let response = Self::send(self.get(&format!("/products/{product_id}/credits"))).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Self::unexpected(status, "get catalog entry")),
        }
    }
}
