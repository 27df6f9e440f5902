//! HTTP API for the faucet ledger

use super::error::{FaucetError, FaucetResult};
use super::service::{CooldownStatus, FaucetService, FaucetStatus, LedgerReceipt, TokenBalances};
use crate::events::EventRecord;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tco2_common::types::amount_serde;
use tco2_common::{Address, Amount};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_EVENT_LIMIT: usize = 50;
const MAX_EVENT_LIMIT: usize = 1000;

/// Deposit / withdraw / owner-withdraw request
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub caller: Address,
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub caller: Address,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct SetEligibleRequest {
    pub caller: Address,
    pub eligible: bool,
}

#[derive(Debug, Deserialize)]
pub struct BalancesRequest {
    pub tokens: Vec<Address>,
}

#[derive(Debug, Deserialize)]
pub struct OwnershipRequest {
    pub caller: Address,
    pub new_owner: Address,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PoolEligibility {
    pub token: Address,
    pub eligible: bool,
}

/// Success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

fn ok<T>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        data,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// [`Json`] whose rejections render as [`FaucetError::InvalidInput`]
#[derive(FromRequest)]
#[from_request(via(Json), rejection(FaucetError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(FaucetError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(FaucetError))]
pub struct ApiQuery<T>(pub T);

type ApiResult<T> = FaucetResult<Json<SuccessResponse<T>>>;

/// Build the router, optionally with permissive CORS
pub fn router(service: Arc<FaucetService>, cors_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/pools/:token", get(pool_handler).put(set_pool_handler))
        .route("/api/balances", post(balances_handler))
        .route("/api/deposit", post(deposit_handler))
        .route("/api/withdraw", post(withdraw_handler))
        .route("/api/owner-withdraw", post(owner_withdraw_handler))
        .route("/api/ownership", post(ownership_handler))
        .route("/api/accounts/:account/cooldown", get(cooldown_handler))
        .route("/api/events", get(events_handler))
        .route("/api/tokens/:token/approve", post(approve_handler))
        .with_state(service);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
        info!("CORS enabled");
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Status handler
pub async fn status_handler(State(service): State<Arc<FaucetService>>) -> ApiResult<FaucetStatus> {
    Ok(ok(service.status().await?))
}

pub async fn pool_handler(
    State(service): State<Arc<FaucetService>>,
    ApiPath(token): ApiPath<Address>,
) -> ApiResult<PoolEligibility> {
    let eligible = service.is_pool_eligible(&token).await?;
    Ok(ok(PoolEligibility { token, eligible }))
}

pub async fn set_pool_handler(
    State(service): State<Arc<FaucetService>>,
    ApiPath(token): ApiPath<Address>,
    ApiJson(request): ApiJson<SetEligibleRequest>,
) -> ApiResult<PoolEligibility> {
    service
        .set_pool_eligible(&request.caller, token, request.eligible)
        .await?;
    Ok(ok(PoolEligibility {
        token,
        eligible: request.eligible,
    }))
}

pub async fn balances_handler(
    State(service): State<Arc<FaucetService>>,
    ApiJson(request): ApiJson<BalancesRequest>,
) -> ApiResult<TokenBalances> {
    Ok(ok(service.token_balances(request.tokens).await?))
}

pub async fn deposit_handler(
    State(service): State<Arc<FaucetService>>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> ApiResult<LedgerReceipt> {
    info!("Deposit request from {}: {} of {}", request.caller, request.amount, request.token);
    let receipt = service
        .deposit(request.caller, request.token, request.amount)
        .await?;
    Ok(ok(receipt))
}

pub async fn withdraw_handler(
    State(service): State<Arc<FaucetService>>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> ApiResult<LedgerReceipt> {
    info!("Withdraw request from {}: {} of {}", request.caller, request.amount, request.token);
    let receipt = service
        .withdraw(request.caller, request.token, request.amount)
        .await?;
    Ok(ok(receipt))
}

pub async fn owner_withdraw_handler(
    State(service): State<Arc<FaucetService>>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> ApiResult<LedgerReceipt> {
    let receipt = service
        .owner_withdraw(request.caller, request.token, request.amount)
        .await?;
    Ok(ok(receipt))
}

pub async fn ownership_handler(
    State(service): State<Arc<FaucetService>>,
    ApiJson(request): ApiJson<OwnershipRequest>,
) -> ApiResult<FaucetStatus> {
    service
        .transfer_ownership(&request.caller, request.new_owner)
        .await?;
    Ok(ok(service.status().await?))
}

pub async fn cooldown_handler(
    State(service): State<Arc<FaucetService>>,
    ApiPath(account): ApiPath<Address>,
) -> ApiResult<CooldownStatus> {
    Ok(ok(service.cooldown(account).await?))
}

pub async fn events_handler(
    State(service): State<Arc<FaucetService>>,
    ApiQuery(query): ApiQuery<EventsQuery>,
) -> ApiResult<Vec<EventRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    Ok(ok(service.recent_events(limit).await?))
}

pub async fn approve_handler(
    State(service): State<Arc<FaucetService>>,
    ApiPath(token): ApiPath<Address>,
    ApiJson(request): ApiJson<ApproveRequest>,
) -> ApiResult<serde_json::Value> {
    service.approve(&request.caller, &token, request.amount).await?;
    Ok(ok(serde_json::json!({
        "owner": request.caller,
        "spender": service.address(),
        "token": token,
        "amount": request.amount.to_string(),
    })))
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "TCO2 Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Rate-limited custody ledger for whitelisted tokens",
        "endpoints": {
            "GET /api/status": "Owner, custody address, limits and statistics",
            "GET /api/pools/:token": "Pool eligibility",
            "PUT /api/pools/:token": "Set pool eligibility (owner only)",
            "POST /api/balances": "Custody balances for a list of tokens",
            "POST /api/tokens/:token/approve": "Approve the faucet to pull tokens",
            "POST /api/deposit": "Deposit tokens",
            "POST /api/withdraw": "Withdraw tokens",
            "POST /api/owner-withdraw": "Withdraw without limits (owner only)",
            "POST /api/ownership": "Transfer ownership (owner only)",
            "GET /api/accounts/:account/cooldown": "Withdrawal cooldown state",
            "GET /api/events": "Recent ledger events",
            "GET /health": "Health check"
        }
    }))
}
