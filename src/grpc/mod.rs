//! gRPC service for the credit ledger.
//!
//! Exposes balance reads, debits, daily reward checks, the admin reprocess
//! escape hatch, transaction history and the order signal ingress.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use crate::accounts::CreditAccountManager;
use crate::error::LedgerError;
use crate::ledger::{self, CreditAccount, CreditTransaction, OrderId, UserId};
use crate::orders::{OrderProcessor, ProcessOutcome};
use crate::proto::{
    credit_ledger_server::CreditLedger, Balances, DebitRequest, DebitResponse,
    ForceReprocessOrderRequest, ForceReprocessOrderResponse, GetBalancesRequest,
    GrantDailyRewardRequest, GrantDailyRewardResponse, ListTransactionsRequest,
    ListTransactionsResponse, NotifyOrderRequest, NotifyOrderResponse, Transaction,
};
use crate::proto;
use crate::rewards::DailyRewardIssuer;
use crate::triggers::{ChannelSignalSource, OrderSignal, SignalKind};

pub use crate::proto::credit_ledger_server::CreditLedgerServer;

/// Metadata key carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

/// Map an engine error to a gRPC status.
pub fn status_from(err: LedgerError) -> Status {
    match &err {
        LedgerError::OrderNotFound(_) => Status::not_found(err.to_string()),
        LedgerError::InvalidAmount(_) => Status::invalid_argument(err.to_string()),
        LedgerError::InvalidOrder { .. } => Status::failed_precondition(err.to_string()),
        LedgerError::ExternalSystemUnavailable(_) => Status::unavailable(err.to_string()),
        LedgerError::Storage(_) => {
            error!(error = %err, "Ledger storage failure");
            Status::internal(err.to_string())
        }
    }
}

fn credit_type_from_proto(value: i32) -> Result<ledger::CreditType, Status> {
    match proto::CreditType::try_from(value) {
        Ok(proto::CreditType::Image) => Ok(ledger::CreditType::Image),
        Ok(proto::CreditType::Text) => Ok(ledger::CreditType::Text),
        _ => Err(Status::invalid_argument(format!("invalid credit type: {value}"))),
    }
}

fn credit_type_to_proto(credit_type: ledger::CreditType) -> proto::CreditType {
    match credit_type {
        ledger::CreditType::Image => proto::CreditType::Image,
        ledger::CreditType::Text => proto::CreditType::Text,
    }
}

fn source_to_proto(source: ledger::TransactionSource) -> proto::TransactionSource {
    match source {
        ledger::TransactionSource::Purchase => proto::TransactionSource::Purchase,
        ledger::TransactionSource::Usage => proto::TransactionSource::Usage,
        ledger::TransactionSource::DailyReward => proto::TransactionSource::DailyReward,
        ledger::TransactionSource::Manual => proto::TransactionSource::Manual,
    }
}

fn signal_kind_from_proto(value: i32) -> Result<SignalKind, Status> {
    let kind = match proto::SignalKind::try_from(value) {
        Ok(proto::SignalKind::Created) => SignalKind::Created,
        Ok(proto::SignalKind::StatusPending) => SignalKind::StatusPending,
        Ok(proto::SignalKind::StatusProcessing) => SignalKind::StatusProcessing,
        Ok(proto::SignalKind::StatusOnHold) => SignalKind::StatusOnHold,
        Ok(proto::SignalKind::StatusCompleted) => SignalKind::StatusCompleted,
        Ok(proto::SignalKind::StatusFailed) => SignalKind::StatusFailed,
        Ok(proto::SignalKind::StatusCancelled) => SignalKind::StatusCancelled,
        Ok(proto::SignalKind::PaymentCompleted) => SignalKind::PaymentCompleted,
        Ok(proto::SignalKind::AdminEdited) => SignalKind::AdminEdited,
        Ok(proto::SignalKind::Saved) => SignalKind::Saved,
        _ => return Err(Status::invalid_argument(format!("invalid signal kind: {value}"))),
    };
    Ok(kind)
}

fn balances_to_proto(account: CreditAccount) -> Balances {
    Balances {
        user_id: account.user_id.0,
        image_balance: account.image_balance,
        text_balance: account.text_balance,
        image_free_total: account.image_free_total,
        text_free_total: account.text_free_total,
        last_reward_date: account
            .last_reward_date
            .map(|d| d.to_string())
            .unwrap_or_default(),
    }
}

fn transaction_to_proto(tx: CreditTransaction) -> Transaction {
    Transaction {
        user_id: tx.user_id.0,
        credit_type: credit_type_to_proto(tx.credit_type) as i32,
        delta: tx.delta,
        source: source_to_proto(tx.source) as i32,
        resulting_balance: tx.resulting_balance,
        timestamp: tx.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        order_id: tx.order_id.map(|o| o.0).unwrap_or_default(),
    }
}

/// CreditLedger service implementation.
pub struct CreditLedgerService {
    accounts: CreditAccountManager,
    rewards: DailyRewardIssuer,
    processor: Arc<OrderProcessor>,
    signals: Arc<ChannelSignalSource>,
    admin_token: Option<String>,
}

impl CreditLedgerService {
    pub fn new(
        accounts: CreditAccountManager,
        rewards: DailyRewardIssuer,
        processor: Arc<OrderProcessor>,
        signals: Arc<ChannelSignalSource>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            accounts,
            rewards,
            processor,
            signals,
            admin_token: admin_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn into_server(self) -> CreditLedgerServer<Self> {
        CreditLedgerServer::new(self)
    }

    fn authorize_admin<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let Some(expected) = &self.admin_token else {
            return Err(Status::permission_denied("admin operations are disabled"));
        };
        let supplied = request
            .metadata()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Status::unauthenticated("missing admin token"))?;
        if supplied != expected {
            warn!("Rejected admin request with bad token");
            return Err(Status::permission_denied("invalid admin token"));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl CreditLedger for CreditLedgerService {
    #[tracing::instrument(name = "grpc.get_balances", skip_all)]
    async fn get_balances(
        &self,
        request: Request<GetBalancesRequest>,
    ) -> Result<Response<Balances>, Status> {
        let user_id = UserId(request.into_inner().user_id);
        let account = self.accounts.balances(user_id).await.map_err(status_from)?;
        Ok(Response::new(balances_to_proto(account)))
    }

    #[tracing::instrument(name = "grpc.debit", skip_all)]
    async fn debit(
        &self,
        request: Request<DebitRequest>,
    ) -> Result<Response<DebitResponse>, Status> {
        let req = request.into_inner();
        let credit_type = credit_type_from_proto(req.credit_type)?;
        let outcome = self
            .accounts
            .debit(UserId(req.user_id), credit_type, req.amount)
            .await
            .map_err(status_from)?;

        Ok(Response::new(DebitResponse {
            ok: outcome.ok,
            balance: outcome.balance,
        }))
    }

    #[tracing::instrument(name = "grpc.grant_daily_reward", skip_all)]
    async fn grant_daily_reward(
        &self,
        request: Request<GrantDailyRewardRequest>,
    ) -> Result<Response<GrantDailyRewardResponse>, Status> {
        let user_id = UserId(request.into_inner().user_id);
        let grant = self
            .rewards
            .grant_if_eligible(user_id, Utc::now())
            .await
            .map_err(status_from)?;

        Ok(Response::new(GrantDailyRewardResponse {
            claimed: grant.claimed,
            image_granted: grant.image_granted,
            text_granted: grant.text_granted,
        }))
    }

    #[tracing::instrument(name = "grpc.force_reprocess_order", skip_all)]
    async fn force_reprocess_order(
        &self,
        request: Request<ForceReprocessOrderRequest>,
    ) -> Result<Response<ForceReprocessOrderResponse>, Status> {
        self.authorize_admin(&request)?;
        let order_id = OrderId(request.into_inner().order_id);
        info!(%order_id, "Admin requested order reprocess");

        let outcome = self
            .processor
            .force_reprocess(order_id)
            .await
            .map_err(status_from)?;

        let response = match outcome {
            ProcessOutcome::Applied(applied) => ForceReprocessOrderResponse {
                applied: true,
                image_credited: applied.credited.image,
                text_credited: applied.credited.text,
            },
            _ => ForceReprocessOrderResponse::default(),
        };
        Ok(Response::new(response))
    }

    #[tracing::instrument(name = "grpc.list_transactions", skip_all)]
    async fn list_transactions(
        &self,
        request: Request<ListTransactionsRequest>,
    ) -> Result<Response<ListTransactionsResponse>, Status> {
        let req = request.into_inner();
        let limit = match req.limit as usize {
            0 => DEFAULT_HISTORY_LIMIT,
            n => n.min(MAX_HISTORY_LIMIT),
        };

        let transactions = self
            .accounts
            .history(UserId(req.user_id), limit)
            .await
            .map_err(status_from)?;

        Ok(Response::new(ListTransactionsResponse {
            transactions: transactions.into_iter().map(transaction_to_proto).collect(),
        }))
    }

    #[tracing::instrument(name = "grpc.notify_order", skip_all)]
    async fn notify_order(
        &self,
        request: Request<NotifyOrderRequest>,
    ) -> Result<Response<NotifyOrderResponse>, Status> {
        let req = request.into_inner();
        let kind = signal_kind_from_proto(req.kind)?;
        self.signals.emit(OrderSignal {
            kind,
            order_id: OrderId(req.order_id),
        });
        Ok(Response::new(NotifyOrderResponse {}))
    }
}
