//! Commerce, credit, reward and reconciliation configuration types.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::commerce::OrderStatus;
use crate::ledger::CreditType;

/// External commerce system connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommerceConfig {
    /// Base URL of the commerce REST API.
    pub base_url: String,
    /// Upper bound for every external call.
    pub timeout_seconds: u64,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_seconds: 10,
            api_key: None,
        }
    }
}

impl CommerceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Purchase conversion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Image credits per currency unit, used when a catalog entry names the
    /// image type without its own rate.
    pub image_credits_per_currency_unit: Decimal,
    /// Text credits per currency unit, same fallback rule.
    pub text_credits_per_currency_unit: Decimal,
    /// Keep the processing record for orders that yield no credits.
    ///
    /// `false` releases it so such orders are evaluated again on every
    /// sweep.
    pub reserve_empty_orders: bool,
    /// Order statuses that count as paid. Orders in any other status are
    /// left unreserved so a later signal or sweep can credit them.
    pub eligible_statuses: Vec<OrderStatus>,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            image_credits_per_currency_unit: Decimal::from(100),
            text_credits_per_currency_unit: Decimal::from(10_000),
            reserve_empty_orders: true,
            eligible_statuses: paid_statuses(),
        }
    }
}

/// Statuses in which the commerce system has captured payment.
pub fn paid_statuses() -> Vec<OrderStatus> {
    vec![OrderStatus::Processing, OrderStatus::Completed]
}

impl CreditsConfig {
    pub fn rate(&self, credit_type: CreditType) -> Decimal {
        match credit_type {
            CreditType::Image => self.image_credits_per_currency_unit,
            CreditType::Text => self.text_credits_per_currency_unit,
        }
    }
}

/// Daily free-credit grants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub daily_image_reward: i64,
    pub daily_text_reward: i64,
    /// Lifetime cap on free image credits. 0 means unlimited.
    pub max_free_image_credits: i64,
    /// Lifetime cap on free text credits. 0 means unlimited.
    pub max_free_text_credits: i64,
    /// Run the scheduled grant job for every known account.
    pub schedule: bool,
    pub schedule_interval_seconds: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            daily_image_reward: 10,
            daily_text_reward: 10_000,
            max_free_image_credits: 100,
            max_free_text_credits: 100_000,
            schedule: false,
            schedule_interval_seconds: 3600,
        }
    }
}

impl RewardsConfig {
    pub fn daily(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Image => self.daily_image_reward,
            CreditType::Text => self.daily_text_reward,
        }
    }

    pub fn cap(&self, credit_type: CreditType) -> i64 {
        match credit_type {
            CreditType::Image => self.max_free_image_credits,
            CreditType::Text => self.max_free_text_credits,
        }
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_seconds)
    }
}

/// Reconciliation sweep settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub lookback_seconds: u64,
    /// Order statuses listed by each sweep.
    pub statuses: Vec<OrderStatus>,
    /// Orders processed in parallel within one sweep.
    pub concurrency: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            lookback_seconds: 7 * 24 * 3600,
            statuses: paid_statuses(),
            concurrency: 4,
        }
    }
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_seconds)
    }
}
