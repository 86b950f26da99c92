use crate::node::TesseraNode;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_market::Provider;
use tessera_types::{Amount, CycleId, ExecutionResult, Job, PeerId, ReceiptId, TesseraError};
use tracing::info;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

fn reject(e: TesseraError) -> ApiError {
    let status = match &e {
        TesseraError::Validation(_) | TesseraError::InsufficientStake { .. } => {
            StatusCode::BAD_REQUEST
        }
        TesseraError::NotFound(_) => StatusCode::NOT_FOUND,
        TesseraError::NoPeerAvailable => StatusCode::SERVICE_UNAVAILABLE,
        TesseraError::ComputeTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        TesseraError::DuplicateClaim(_) => StatusCode::CONFLICT,
        TesseraError::ProofStructure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TesseraError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

/// Parses a token amount out of an API payload. Amounts must be positive
/// finite numbers.
fn parse_amount(amount: f64) -> Result<Amount, ApiError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(reject(TesseraError::Validation(format!(
            "amount must be positive, got {}",
            amount
        ))));
    }
    Ok(Amount::from_tokens(amount))
}

#[derive(Clone)]
struct AppState {
    node: Arc<TesseraNode>,
}

pub fn router(node: Arc<TesseraNode>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stake", post(stake))
        .route("/withdraw", post(withdraw))
        .route("/slash", post(slash))
        .route("/providers", get(providers))
        .route("/quote", get(quote))
        .route("/dispatch", post(dispatch))
        .route("/claim", post(claim))
        .route("/stats", get(stats))
        .with_state(Arc::new(AppState { node }))
}

pub async fn serve(node: Arc<TesseraNode>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(node)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct StakeRequest {
    peer_id: Option<String>,
    amount: f64,
}

#[derive(Serialize, Deserialize)]
struct StakeResponse {
    peer_id: String,
    stake_amount: f64,
    trust_score: f64,
}

async fn stake(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<StakeResponse> {
    let peer_id = state.node.resolve_peer(req.peer_id);
    let amount = parse_amount(req.amount)?;

    let provider = state.node.stake(&peer_id, amount).await.map_err(reject)?;
    Ok(Json(StakeResponse {
        peer_id: provider.peer_id.to_string(),
        stake_amount: provider.stake.to_tokens(),
        trust_score: provider.trust_score,
    }))
}

#[derive(Deserialize)]
struct WithdrawRequest {
    peer_id: Option<String>,
    amount: f64,
}

#[derive(Serialize, Deserialize)]
struct WithdrawResponse {
    peer_id: String,
    stake_amount: f64,
    withdrawn: f64,
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<WithdrawResponse> {
    let peer_id = state.node.resolve_peer(req.peer_id);
    let amount = parse_amount(req.amount)?;

    let stake = state.node.withdraw(&peer_id, amount).await.map_err(reject)?;
    Ok(Json(WithdrawResponse {
        peer_id: peer_id.to_string(),
        stake_amount: stake.to_tokens(),
        withdrawn: amount.to_tokens(),
    }))
}

#[derive(Deserialize)]
struct SlashRequest {
    peer_id: String,
    reason: String,
    amount: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct SlashResponse {
    peer_id: String,
    slashed: f64,
    new_stake: f64,
    new_trust_score: f64,
    reason: String,
}

async fn slash(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SlashRequest>,
) -> ApiResult<SlashResponse> {
    let peer_id = PeerId::new(req.peer_id);
    let amount = req.amount.map(parse_amount).transpose()?;

    let outcome = state
        .node
        .slash(&peer_id, &req.reason, amount)
        .await
        .map_err(reject)?;
    Ok(Json(SlashResponse {
        peer_id: peer_id.to_string(),
        slashed: outcome.slashed.to_tokens(),
        new_stake: outcome.new_stake.to_tokens(),
        new_trust_score: outcome.new_trust_score,
        reason: req.reason,
    }))
}

#[derive(Serialize, Deserialize)]
struct ProviderView {
    peer_id: String,
    stake_amount: f64,
    trust_score: f64,
    success_rate: f64,
    total_jobs: u64,
    successful_jobs: u64,
    slash_count: u64,
    zk_verified_count: u64,
    created_at: i64,
    updated_at: i64,
}

impl From<Provider> for ProviderView {
    fn from(p: Provider) -> Self {
        Self {
            peer_id: p.peer_id.to_string(),
            stake_amount: p.stake.to_tokens(),
            trust_score: p.trust_score,
            success_rate: p.success_rate,
            total_jobs: p.total_jobs,
            successful_jobs: p.successful_jobs,
            slash_count: p.slash_count,
            zk_verified_count: p.zk_verified_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

async fn providers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ProviderView>> {
    let providers = state.node.providers().await.map_err(reject)?;
    Ok(Json(providers.into_iter().map(ProviderView::from).collect()))
}

#[derive(Deserialize)]
struct QuoteQuery {
    cycles: u64,
    peer_id: Option<String>,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<tessera_market::PriceQuote> {
    let peer_id = query.peer_id.map(PeerId::new);
    let quote = state
        .node
        .quote(query.cycles, peer_id.as_ref())
        .await
        .map_err(reject)?;
    Ok(Json(quote))
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(job): Json<Job>,
) -> ApiResult<ExecutionResult> {
    let result = state.node.dispatch(job).await.map_err(reject)?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct ClaimRequest {
    peer_id: Option<String>,
    cycle_ids: Vec<String>,
    receipt_ids: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct ClaimResponse {
    cycle_id: String,
    reward: f64,
    cycles: u64,
    zk_proof_count: u64,
}

async fn claim(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClaimRequest>,
) -> ApiResult<ClaimResponse> {
    let peer_id = state.node.resolve_peer(req.peer_id);
    let cycle_ids = req.cycle_ids.into_iter().map(CycleId::new).collect();
    let receipt_ids = req
        .receipt_ids
        .map(|ids| ids.into_iter().map(ReceiptId::new).collect());

    let claim = state
        .node
        .claim(&peer_id, cycle_ids, receipt_ids)
        .await
        .map_err(reject)?;
    Ok(Json(ClaimResponse {
        cycle_id: claim.cycle_id.to_string(),
        reward: claim.reward.to_tokens(),
        cycles: claim.cycles_claimed,
        zk_proof_count: claim.zk_proof_count,
    }))
}

#[derive(Deserialize)]
struct StatsQuery {
    peer_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct StatsResponse {
    total_cycles: u64,
    total_zk_proofs: u64,
    total_reward: f64,
    claim_count: u64,
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<StatsResponse> {
    let peer_id = query.peer_id.map(PeerId::new);
    let stats = state.node.stats(peer_id.as_ref()).await.map_err(reject)?;
    Ok(Json(StatsResponse {
        total_cycles: stats.total_cycles,
        total_zk_proofs: stats.total_zk_proofs,
        total_reward: stats.total_reward.to_tokens(),
        claim_count: stats.claim_count,
    }))
}
