use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use tandem_shared::premium::EntitlementToken;
use tandem_shared::protocol::MessageView;
use tandem_shared::types::{ConversationId, Direction, MatchId, MessageId, ProfileId, ProfileStatus};
use tandem_store::ProfileRecord;

use crate::auth::{verify_admin_token, Actor};
use crate::config::ServerConfig;
use crate::engine::ledger::SwipeOutcome;
use crate::engine::lifecycle::{ConversationDetail, MatchSummary};
use crate::engine::quota::QuotaStatus;
use crate::engine::Engine;
use crate::error::ServerError;
use crate::premium::PremiumVerifier;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub premium_verifier: Arc<PremiumVerifier>,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/swipe", post(swipe))
        .route("/quota", get(quota_status))
        .route("/matches", get(list_matches))
        .route("/unmatch", post(unmatch))
        .route("/block", post(block))
        .route("/messages", post(send_message))
        .route("/conversations/:id", get(conversation_detail))
        .route("/conversations/:id/messages", get(history))
        .route("/conversations/:id/read", post(mark_read))
        .route("/conversations/:id/typing", post(typing))
        .route("/conversations/:id/live", get(ws::live))
        .route("/premium/verify", post(premium_verify))
        .route("/admin/status", get(admin_status))
        .route("/admin/profiles/:id", put(admin_provision_profile))
        .route("/admin/profiles/:id/ban", post(admin_ban))
        .route("/admin/profiles/:id/unban", post(admin_unban))
        .route("/admin/grant-premium", post(admin_grant_premium))
        .route("/admin/revoke-premium", post(admin_revoke_premium))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request / response bodies ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    daily_swipe_limit: u32,
    conversation_ttl_days: i64,
}

#[derive(Deserialize)]
struct SwipeRequest {
    target_id: ProfileId,
    direction: Direction,
}

#[derive(Deserialize)]
struct UnmatchRequest {
    match_id: MatchId,
}

#[derive(Deserialize)]
struct BlockRequest {
    profile_id: ProfileId,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    conversation_id: ConversationId,
    content: String,
    #[serde(default)]
    client_token: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: MessageView,
}

#[derive(Deserialize)]
struct HistoryQuery {
    after: Option<MessageId>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<MessageView>,
}

#[derive(Serialize)]
struct MarkReadResponse {
    marked: u64,
}

#[derive(Serialize)]
struct TypingResponse {
    emitted: bool,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct PremiumVerifyResponse {
    valid: bool,
}

#[derive(Serialize)]
struct AdminStatusResponse {
    name: String,
    uptime_secs: u64,
    db_connections: u32,
    premium_cached: usize,
}

#[derive(Deserialize)]
struct AdminPremiumRequest {
    profile_id: ProfileId,
}

#[derive(Serialize)]
struct BanResponse {
    banned: bool,
    matches_closed: usize,
}

// ─── Public endpoints ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        daily_swipe_limit: state.config.daily_swipe_limit,
        conversation_ttl_days: state.config.conversation_ttl_days,
    })
}

// ─── Swipes and matches ───

async fn swipe(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(req): Json<SwipeRequest>,
) -> Result<Json<SwipeOutcome>, ServerError> {
    let outcome = state.engine.swipe(actor, req.target_id, req.direction).await?;
    Ok(Json(outcome))
}

async fn quota_status(
    Actor(actor): Actor,
    State(state): State<AppState>,
) -> Result<Json<QuotaStatus>, ServerError> {
    Ok(Json(state.engine.quota_status(actor).await?))
}

async fn list_matches(
    Actor(actor): Actor,
    State(state): State<AppState>,
) -> Result<Json<Vec<MatchSummary>>, ServerError> {
    Ok(Json(state.engine.list_matches(actor).await?))
}

async fn unmatch(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(req): Json<UnmatchRequest>,
) -> Result<Json<OkResponse>, ServerError> {
    state.engine.unmatch(actor, req.match_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn block(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<OkResponse>, ServerError> {
    state.engine.block(actor, req.profile_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

// ─── Conversations ───

async fn send_message(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let message = state
        .engine
        .send(actor, req.conversation_id, &req.content, req.client_token)
        .await?;
    Ok(Json(MessageResponse { message }))
}

async fn conversation_detail(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<ConversationDetail>, ServerError> {
    Ok(Json(state.engine.conversation(actor, id).await?))
}

async fn history(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ServerError> {
    let messages = state
        .engine
        .history(actor, id, query.after, query.limit)
        .await?;
    Ok(Json(HistoryResponse { messages }))
}

async fn mark_read(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<MarkReadResponse>, ServerError> {
    let marked = state.engine.mark_read(actor, id).await?;
    Ok(Json(MarkReadResponse { marked }))
}

async fn typing(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Path(id): Path<ConversationId>,
) -> Result<Json<TypingResponse>, ServerError> {
    let emitted = state.engine.emit_typing(actor, id).await?;
    Ok(Json(TypingResponse { emitted }))
}

// ─── Premium ───

async fn premium_verify(
    Actor(actor): Actor,
    State(state): State<AppState>,
    Json(token): Json<EntitlementToken>,
) -> Result<Json<PremiumVerifyResponse>, ServerError> {
    if token.profile_id != actor {
        return Err(ServerError::Forbidden(
            "entitlement belongs to another profile".into(),
        ));
    }
    let valid = state.premium_verifier.verify(&token).await;
    Ok(Json(PremiumVerifyResponse { valid }))
}

// ─── Admin ───

async fn admin_status(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    Ok(Json(AdminStatusResponse {
        name: state.config.instance_name.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        db_connections: state.config.db_pool_size,
        premium_cached: state.premium_verifier.cached_count().await,
    }))
}

async fn admin_provision_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
    Json(status): Json<ProfileStatus>,
) -> Result<Json<ProfileRecord>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let record = state.engine.provision_profile(id, status).await?;
    info!(profile = %id, active = status.active, banned = status.banned, "Admin provisioned profile");
    Ok(Json(record))
}

async fn admin_ban(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> Result<Json<BanResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let matches_closed = state.engine.ban(id).await?;
    Ok(Json(BanResponse {
        banned: true,
        matches_closed,
    }))
}

async fn admin_unban(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<ProfileId>,
) -> Result<Json<BanResponse>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    state.engine.unban(id).await?;
    Ok(Json(BanResponse {
        banned: false,
        matches_closed: 0,
    }))
}

async fn admin_grant_premium(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AdminPremiumRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    state.premium_verifier.admin_grant(req.profile_id).await;
    info!(profile = %req.profile_id, "Admin granted premium");
    Ok(Json(serde_json::json!({ "granted": true })))
}

async fn admin_revoke_premium(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AdminPremiumRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    state.premium_verifier.admin_revoke(req.profile_id).await;
    info!(profile = %req.profile_id, "Admin revoked premium");
    Ok(Json(serde_json::json!({ "revoked": true })))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
