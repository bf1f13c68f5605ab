//! Daily free-credit grants.
//!
//! A user is eligible once per UTC calendar date. Eligibility is decided by
//! the store's atomic reward-day claim, so sign-in hooks and the scheduled
//! job may both call in without double-granting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::accounts::CreditAccountManager;
use crate::config::RewardsConfig;
use crate::error::Result;
use crate::ledger::{CreditType, TransactionSource, UserId};

/// Amounts granted by one eligibility check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantResult {
    /// False when the user had already claimed today.
    pub claimed: bool,
    pub image_granted: i64,
    pub text_granted: i64,
    /// Credit types whose grant failed to write. The day stays claimed.
    pub failed: Vec<CreditType>,
}

impl GrantResult {
    fn set(&mut self, credit_type: CreditType, amount: i64) {
        match credit_type {
            CreditType::Image => self.image_granted = amount,
            CreditType::Text => self.text_granted = amount,
        }
    }
}

/// Summary of a [`DailyRewardIssuer::grant_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantAllResult {
    pub users_checked: usize,
    pub users_granted: usize,
    pub errors: usize,
}

/// `min(daily, max(0, cap - free_total))`; a cap of 0 means unlimited.
pub fn grant_amount(daily: i64, cap: i64, free_total: i64) -> i64 {
    if cap <= 0 {
        return daily.max(0);
    }
    daily.min((cap - free_total).max(0)).max(0)
}

/// Issues capped daily free credits.
#[derive(Clone)]
pub struct DailyRewardIssuer {
    accounts: CreditAccountManager,
    config: RewardsConfig,
}

impl DailyRewardIssuer {
    pub fn new(accounts: CreditAccountManager, config: RewardsConfig) -> Self {
        Self { accounts, config }
    }

    /// Grant today's reward if the user has not claimed it yet.
    ///
    /// The claim is recorded even when both grants come out as zero. A
    /// failed write for one credit type does not stop the other; failed
    /// types are reported in [`GrantResult::failed`].
    #[tracing::instrument(name = "rewards.grant", skip_all, fields(%user_id))]
    pub async fn grant_if_eligible(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<GrantResult> {
        let today = now.date_naive();
        if !self.accounts.claim_reward_day(user_id, today).await? {
            debug!(%user_id, %today, "Daily reward already claimed");
            return Ok(GrantResult::default());
        }

        let account = self.accounts.balances(user_id).await?;
        let mut result = GrantResult {
            claimed: true,
            ..GrantResult::default()
        };

        for credit_type in CreditType::ALL {
            let amount = grant_amount(
                self.config.daily(credit_type),
                self.config.cap(credit_type),
                account.free_total(credit_type),
            );
            if amount <= 0 {
                continue;
            }
            match self
                .accounts
                .credit(user_id, credit_type, amount, TransactionSource::DailyReward)
                .await
            {
                Ok(_) => result.set(credit_type, amount),
                Err(e) => {
                    error!(%user_id, %credit_type, amount, error = %e, "Daily reward grant failed");
                    result.failed.push(credit_type);
                }
            }
        }

        if result.failed.is_empty() {
            info!(
                %user_id,
                %today,
                image = result.image_granted,
                text = result.text_granted,
                "Daily reward granted"
            );
        } else {
            warn!(
                %user_id,
                %today,
                image = result.image_granted,
                text = result.text_granted,
                failed = ?result.failed,
                "Daily reward partially granted"
            );
        }
        Ok(result)
    }

    /// Run the eligibility check for every known account.
    pub async fn grant_all(&self, now: DateTime<Utc>) -> Result<GrantAllResult> {
        let users = self.accounts.known_users().await?;
        let mut summary = GrantAllResult {
            users_checked: users.len(),
            ..GrantAllResult::default()
        };

        for user_id in users {
            match self.grant_if_eligible(user_id, now).await {
                Ok(grant) if grant.claimed => {
                    summary.users_granted += 1;
                    if !grant.failed.is_empty() {
                        summary.errors += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(%user_id, error = %e, "Daily reward failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Run [`grant_all`](Self::grant_all) every `period` until aborted.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(?period, "Scheduled daily rewards started");

            loop {
                ticker.tick().await;
                match self.grant_all(Utc::now()).await {
                    Ok(summary) => debug!(
                        checked = summary.users_checked,
                        granted = summary.users_granted,
                        errors = summary.errors,
                        "Scheduled daily rewards run complete"
                    ),
                    Err(e) => error!(error = %e, "Scheduled daily rewards run failed"),
                }
            }
        })
    }
}
