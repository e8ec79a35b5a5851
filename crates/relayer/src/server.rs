//! HTTP + WebSocket API surface (spec §6). Route wiring follows the teacher's
//! `server.rs` shape: build a `Router` over `Arc<AppState>`, layer rate limiting +
//! tracing + CORS, serve with `axum::serve` using connect-info so `tower_governor` can
//! key on the caller's IP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use payment_core::models::{Allocation, ChainKind, Checkbook, WithdrawRequest};
use payment_core::status::IntentType;
use payment_core::{ChainAdapter, UniversalAddress};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::auth::jwt::{mint_admin_token, mint_user_token, verify_user_token};
use crate::auth::signature::{recover_evm_address, recover_tron_address};
use crate::auth::totp;
use crate::auth::{AuthAdmin, AuthUser};
use crate::config::RelayerConfig;
use crate::db::Database;
use crate::error::{RelayerError, Result};
use crate::lifecycle::{CheckbookOps, DepositSyncOps, NewWithdrawIntent, WithdrawOps};
use crate::polling::{PollingScheduler, PollingSchedulerHandle};
use crate::proof_pipeline::{ProofPipeline, ProofPipelineHandle};
use crate::push::{Hub, Session};
use crate::submission::{EvmAdapter, SubmissionHandle, SubmissionQueue, TronAdapter};

/// Shared service handles every handler needs (spec §5: "`Arc<AppState>` bundles the
/// pool and every background service handle").
pub struct AppState {
    pub config: RelayerConfig,
    pub db: Database,
    pub hub: Hub,
    pub adapters: HashMap<u32, Arc<dyn ChainAdapter>>,
    pub checkbook_ops: CheckbookOps,
    pub withdraw_ops: WithdrawOps,
    pub deposit_sync: DepositSyncOps,
    pub proof_pipeline: ProofPipelineHandle,
    pub submission: SubmissionHandle,
    pub polling: PollingSchedulerHandle,
    admin_password_hash: String,
}

impl AppState {
    pub async fn new(config: RelayerConfig) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url).await?;
        db.migrate().await?;

        let hub = Hub::new();

        let mut adapters: HashMap<u32, Arc<dyn ChainAdapter>> = HashMap::new();
        for chain in &config.chains {
            let adapter: Arc<dyn ChainAdapter> = match chain.kind {
                ChainKind::Evm => Arc::new(EvmAdapter::new(chain.slip44_id, chain.rpc_url.clone())),
                ChainKind::Tron => Arc::new(TronAdapter::new(chain.slip44_id, chain.rpc_url.clone())),
            };
            adapters.insert(chain.slip44_id, adapter);
        }

        let polling = PollingScheduler::spawn(
            db.clone(),
            hub.clone(),
            config.scanner_url.clone(),
            config.poll_interval_seconds,
        )
        .await?;
        let submission = SubmissionQueue::spawn(
            &config.chains,
            adapters.clone(),
            db.clone(),
            hub.clone(),
            polling.clone(),
        );
        let proof_pipeline = ProofPipeline::spawn(
            config.proof_worker_count,
            config.zkvm_base_url.clone(),
            db.clone(),
            hub.clone(),
            submission.clone(),
        );

        let checkbook_ops = CheckbookOps {
            db: db.clone(),
            hub: hub.clone(),
            proof_pipeline: proof_pipeline.clone(),
        };
        let withdraw_ops = WithdrawOps {
            db: db.clone(),
            hub: hub.clone(),
            submission: submission.clone(),
            polling: polling.clone(),
            withdraw_timeout_seconds: config.withdraw_timeout_seconds,
        };
        let deposit_sync = DepositSyncOps::new(
            db.clone(),
            hub.clone(),
            adapters.clone(),
            config.scanner_url.clone(),
            &config.chains,
        );

        let admin_password_hash = hash_admin_password(&config.admin_password)?;

        Ok(Self {
            config,
            db,
            hub,
            adapters,
            checkbook_ops,
            withdraw_ops,
            deposit_sync,
            proof_pipeline,
            submission,
            polling,
            admin_password_hash,
        })
    }

    fn normalize_address(&self, chain_id: u32, native: &str) -> Result<UniversalAddress> {
        let adapter = self
            .adapters
            .get(&chain_id)
            .ok_or_else(|| RelayerError::InvalidRequest(format!("unconfigured chain_id {chain_id}")))?;
        let data = adapter.normalize_address(native)?;
        Ok(UniversalAddress { chain_id, data })
    }
}

fn hash_admin_password(password: &str) -> anyhow::Result<String> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash admin password: {e}"))?;
    Ok(hash.to_string())
}

fn verify_admin_password(hash: &str, candidate: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    use argon2::Argon2;

    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

/// Builds the router and serves it until `ctrl_c`, then drains background work for up
/// to 30s (spec §5 "30s graceful shutdown drain", SPEC_FULL.md §9).
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let host = state.config.host.clone();
    let port = state.config.port;

    // 10 req/s, burst 20, keyed on caller IP (spec: the auth-challenge endpoints are the
    // one surface an unauthenticated caller can hit repeatedly before holding a JWT).
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(10)
        .burst_size(20)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let auth_routes = Router::new()
        .route("/auth/login", post(user_login))
        .route("/admin/login", post(admin_login))
        .layer(GovernorLayer {
            config: Arc::new(governor_conf),
        });

    let admin_routes = Router::new().route("/admin/chains/:chain_id/sync", post(sync_deposits));

    let api_routes = Router::new()
        .route("/checkbooks", get(list_checkbooks))
        .route("/checkbooks/:id", get(get_checkbook).delete(delete_checkbook))
        .route("/checkbooks/:id/allocations", post(create_allocations))
        .route("/checkbooks/:id/commitment", post(submit_commitment))
        .route("/allocations", get(list_allocations))
        .route("/withdrawals", get(list_withdraw_requests).post(create_withdraw_request))
        .route("/withdrawals/:id", get(get_withdraw_request).delete(cancel_withdraw_request))
        .route("/withdrawals/:id/claim-timeout", post(claim_timeout))
        .route("/withdrawals/:id/proof", post(submit_withdraw_proof))
        .route("/withdrawals/:id/execute", post(execute_withdraw))
        .route("/withdrawals/:id/retry-payout", post(retry_payout))
        .route("/withdrawals/:id/retry-hook", post(retry_hook));

    let app = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/ws", get(ws_upgrade))
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "relayer listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http listener closed, draining background workers");
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

// ---- ambient endpoints -----------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ready(State(state): State<Arc<AppState>>) -> impl axum::response::IntoResponse {
    if state.db.is_ready().await {
        (axum::http::StatusCode::OK, Json(serde_json::json!({ "ready": true })))
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ready": false })),
        )
    }
}

// ---- auth (spec §4.6) --------------------------------------------------------------

#[derive(Deserialize)]
struct UserLoginRequest {
    chain_id: u32,
    /// Native-format address string (checksummed/lower hex for EVM, base58check for
    /// TRON).
    address: String,
    /// Hex-encoded 65-byte `r||s||v` signature.
    signature: String,
    /// The exact bytes the wallet signed (spec §4.6 challenge message).
    message: String,
}

#[derive(Serialize)]
struct UserLoginResponse {
    token: String,
    owner: String,
}

async fn user_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserLoginRequest>,
) -> Result<Json<UserLoginResponse>> {
    let signature = decode_hex(&req.signature)?;

    let recovered = if req.chain_id == payment_core::universal_address::SLIP44_TRON {
        recover_tron_address(req.message.as_bytes(), &signature)?
    } else {
        recover_evm_address(req.message.as_bytes(), &signature)?
    };

    let claimed = state.normalize_address(req.chain_id, &req.address)?;
    if claimed != UniversalAddress::from_evm_address(req.chain_id, &recovered) {
        return Err(RelayerError::Unauthorized);
    }

    let token = mint_user_token(
        &state.config.user_jwt_secret,
        &claimed,
        &req.address,
        state.config.jwt_ttl_seconds,
    )?;

    Ok(Json(UserLoginResponse {
        token,
        owner: claimed.to_hex(),
    }))
}

#[derive(Deserialize)]
struct AdminLoginRequest {
    username: String,
    password: String,
    totp_code: String,
}

#[derive(Serialize)]
struct AdminLoginResponse {
    token: String,
}

async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<Json<AdminLoginResponse>> {
    // Every check runs before any branch returns (spec §4.6 "avoid oracle"): username,
    // password, and TOTP all get evaluated, and every failure maps to the same generic
    // Unauthorized regardless of which check actually failed.
    let username_ok = req.username == state.config.admin_username;
    let password_ok = verify_admin_password(&state.admin_password_hash, &req.password);
    let totp_ok = totp::verify_code(&state.config.admin_totp_secret, &req.totp_code).unwrap_or(false);

    if !(username_ok && password_ok && totp_ok) {
        return Err(RelayerError::Unauthorized);
    }

    let token = mint_admin_token(
        &state.config.admin_jwt_secret,
        &state.config.admin_username,
        state.config.jwt_ttl_seconds,
    )?;
    Ok(Json(AdminLoginResponse { token }))
}

/// The only entry point that creates a Checkbook (spec §6 "`GET /events/...` used by
/// admin adapter sync"): pulls new deposit events for `chain_id` from the scanner and
/// shadows each one not already known. Gated behind `AuthAdmin` since it drives a
/// chain-wide reconciliation pass, not a user-scoped action.
async fn sync_deposits(
    State(state): State<Arc<AppState>>,
    _admin: AuthAdmin,
    Path(chain_id): Path<u32>,
) -> Result<Json<crate::lifecycle::DepositSyncSummary>> {
    Ok(Json(state.deposit_sync.sync_deposits(chain_id).await?))
}

// ---- websocket push fabric (spec §4.5) ---------------------------------------------

#[derive(Deserialize)]
struct WsAuthQuery {
    token: String,
}

/// Browsers cannot set an `Authorization` header on a WebSocket upgrade, so the session
/// token travels as a query parameter instead (spec §6 `/ws`).
async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<axum::response::Response> {
    let claims = verify_user_token(&state.config.user_jwt_secret, &query.token)?;
    let owner = claims.owner()?;
    let hub = state.hub.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        Session::new(owner).run(socket, hub).await;
    }))
}

// ---- checkbooks / allocations (spec §4.1) ------------------------------------------

async fn list_checkbooks(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Checkbook>>> {
    Ok(Json(state.db.list_checkbooks_by_owner(&auth.owner).await?))
}

async fn get_checkbook(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Checkbook>> {
    let checkbook = state
        .db
        .fetch_checkbook(id)
        .await?
        .ok_or_else(|| RelayerError::NotFound("checkbook not found".into()))?;
    if checkbook.owner != auth.owner {
        return Err(RelayerError::NotFound("checkbook not found".into()));
    }
    Ok(Json(checkbook))
}

async fn delete_checkbook(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.checkbook_ops.delete_checkbook(id, &auth.owner).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct AllocationInput {
    recipient_chain_id: u32,
    recipient_address: String,
    amount: Decimal,
}

#[derive(Deserialize)]
struct CreateAllocationsRequest {
    allocations: Vec<AllocationInput>,
}

async fn create_allocations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateAllocationsRequest>,
) -> Result<Json<Checkbook>> {
    let amounts = req
        .allocations
        .into_iter()
        .map(|a| {
            let recipient = state.normalize_address(a.recipient_chain_id, &a.recipient_address)?;
            Ok((recipient, a.amount))
        })
        .collect::<Result<Vec<_>>>()?;

    let checkbook = state
        .checkbook_ops
        .create_allocations(id, &auth.owner, amounts)
        .await?;
    Ok(Json(checkbook))
}

#[derive(Deserialize)]
struct SubmitCommitmentRequest {
    signature: String,
    intent_payload: String,
}

async fn submit_commitment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitCommitmentRequest>,
) -> Result<Json<serde_json::Value>> {
    let signature = decode_hex(&req.signature)?;
    let intent_payload = decode_hex(&req.intent_payload)?;
    state
        .checkbook_ops
        .submit_commitment(id, &auth.owner, signature, intent_payload)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn list_allocations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Allocation>>> {
    Ok(Json(state.db.list_allocations_by_owner(&auth.owner).await?))
}

// ---- withdraw requests (spec §4.1, §4.3) -------------------------------------------

#[derive(Deserialize)]
struct CreateWithdrawRequestBody {
    allocation_ids: Vec<Uuid>,
    amount: Decimal,
    chain_id: u32,
    beneficiary_chain_id: u32,
    beneficiary_address: String,
    intent_type: String,
    token_symbol: String,
    asset_id: Option<String>,
    signature: String,
    payload_blob: Option<String>,
}

fn parse_intent_type(raw: &str) -> Result<IntentType> {
    match raw {
        "raw_token" => Ok(IntentType::RawToken),
        "asset_token" => Ok(IntentType::AssetToken),
        other => Err(RelayerError::InvalidRequest(format!("unknown intent_type: {other}"))),
    }
}

async fn create_withdraw_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateWithdrawRequestBody>,
) -> Result<Json<WithdrawRequest>> {
    let beneficiary = state.normalize_address(req.beneficiary_chain_id, &req.beneficiary_address)?;
    let signature = decode_hex(&req.signature)?;
    let payload_blob = req.payload_blob.as_deref().map(decode_hex).transpose()?;

    let intent = NewWithdrawIntent {
        chain_id: req.chain_id,
        beneficiary,
        intent_type: parse_intent_type(&req.intent_type)?,
        token_symbol: req.token_symbol,
        asset_id: req.asset_id,
        signature,
        payload_blob,
    };

    let request = state
        .withdraw_ops
        .create_withdraw_request(&auth.owner, req.allocation_ids, req.amount, intent)
        .await?;
    Ok(Json(request))
}

async fn list_withdraw_requests(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<WithdrawRequest>>> {
    Ok(Json(state.db.list_withdraw_requests_by_owner(&auth.owner).await?))
}

async fn get_withdraw_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawRequest>> {
    let request = state
        .db
        .fetch_withdraw_request(id)
        .await?
        .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;
    if request.owner != auth.owner {
        return Err(RelayerError::NotFound("withdraw request not found".into()));
    }
    Ok(Json(request))
}

async fn cancel_withdraw_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.withdraw_ops.cancel_withdraw_request(id, &auth.owner).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn claim_timeout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.withdraw_ops.claim_timeout(id, &auth.owner).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct SubmitWithdrawProofRequest {
    payload_blob: String,
}

async fn submit_withdraw_proof(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitWithdrawProofRequest>,
) -> Result<Json<serde_json::Value>> {
    let payload_blob = decode_hex(&req.payload_blob)?;
    state
        .withdraw_ops
        .submit_withdraw_proof(id, &auth.owner, payload_blob)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn execute_withdraw(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.withdraw_ops.execute_withdraw(id, &auth.owner).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn retry_payout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.withdraw_ops.retry_payout(id, &auth.owner).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn retry_hook(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.withdraw_ops.retry_hook(id, &auth.owner).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x")).map_err(|e| RelayerError::InvalidRequest(format!("invalid hex: {e}")))
}
