//! HTTP API
//! Mission: Thin validated boundary over the settlement and reputation core
//!
//! Authentication and authorization live in the deployment's edge layer;
//! handlers receive an already-resolved user id and never consult an admin
//! allowlist. The engine below sees only validated, typed arguments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::models::{PaymentStatus, Prediction, PredictionStatus, Stake, StakeSummary};
use crate::oracle::PriceProvider;
use crate::reputation::{LeaderboardEntry, ReputationAggregator};
use crate::settlement::{SettleError, SettlementEngine, SettlementResult};
use crate::stakes::{StakeError, StakeLedger};
use crate::store::{EventFilter, Store};
use crate::validation::{
    self, CreatePredictionRequest, PlaceStakeRequest, ValidationError,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub provider: Arc<dyn PriceProvider>,
}

impl AppState {
    fn ledger(&self) -> StakeLedger {
        StakeLedger::new(self.store.clone())
    }

    fn aggregator(&self) -> ReputationAggregator {
        ReputationAggregator::new(self.store.clone())
    }

    fn engine(&self) -> SettlementEngine {
        SettlementEngine::new(self.store.clone(), self.provider.clone())
    }
}

/// Create the API router
pub fn create_router(store: Arc<Store>, provider: Arc<dyn PriceProvider>) -> Router {
    let state = AppState { store, provider };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/predictions", post(create_prediction))
        .route("/api/predictions/expired", get(get_expired_predictions))
        .route("/api/predictions/:id", get(get_prediction))
        .route("/api/predictions/:id/settle", post(settle_prediction))
        .route("/api/predictions/:id/cancel", post(cancel_prediction))
        .route("/api/stakes", post(place_stake))
        .route("/api/stakes/:id/status", post(update_stake_status))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/users/:id/reputation", get(get_user_reputation))
        .with_state(state)
}

// ===== Route Handlers =====

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a new open prediction
async fn create_prediction(
    State(state): State<AppState>,
    Json(body): Json<CreatePredictionBody>,
) -> Result<Json<Prediction>, ApiError> {
    let request = CreatePredictionRequest {
        asset_symbol: body.asset_symbol,
        direction: body.direction,
        timeframe_end: body.timeframe_end,
        confidence: body.confidence,
    };
    let input = validation::validate_prediction_input(&request)?;

    let prediction = Prediction {
        id: None,
        creator_user_id: body.user_id,
        asset_symbol: input.asset_symbol,
        direction: input.direction,
        timeframe_end: input.timeframe_end,
        confidence: input.confidence,
        status: PredictionStatus::Open,
        settlement_price: None,
        settlement_timestamp: None,
        created_at: Utc::now(),
    };
    let id = state.store.insert_prediction(&prediction)?;

    Ok(Json(Prediction {
        id: Some(id),
        ..prediction
    }))
}

/// Prediction detail with stake totals and the creator's track record
async fn get_prediction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PredictionDetail>, ApiError> {
    let prediction = state
        .store
        .get_prediction(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Prediction {} not found", id)))?;

    let stake_summary = state.ledger().summarize(id).map_err(stake_error)?;
    let creator = state.aggregator().reputation_for(prediction.creator_user_id)?;

    Ok(Json(PredictionDetail {
        prediction,
        stake_summary,
        creator_reputation: CreatorReputation {
            win_rate: creator.win_rate,
            total_settled: creator.settled_predictions,
            score: creator.reputation_score,
        },
    }))
}

/// Open predictions past their deadline, for a settlement sweep
async fn get_expired_predictions(
    State(state): State<AppState>,
    Query(params): Query<ExpiredQuery>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(50).min(500);
    let predictions = state.store.list_expired_open(Utc::now(), limit)?;
    Ok(Json(PredictionsResponse {
        count: predictions.len(),
        predictions,
    }))
}

/// Settle one prediction into a terminal outcome
async fn settle_prediction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SettleResponse>, ApiError> {
    let result = state.engine().settle(id).await.map_err(settle_error)?;
    Ok(Json(SettleResponse {
        status: "settled".to_string(),
        result,
    }))
}

/// Cancel an open prediction (terminal, no payouts or refunds)
async fn cancel_prediction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cancelled = state.store.cancel_prediction(id)?;
    if !cancelled {
        return Err(ApiError::Conflict(format!(
            "Prediction {} is not open",
            id
        )));
    }
    Ok(Json(json!({ "status": "cancelled" })))
}

/// Place a stake on one side of an open prediction
async fn place_stake(
    State(state): State<AppState>,
    Json(body): Json<PlaceStakeBody>,
) -> Result<Json<Stake>, ApiError> {
    let request = PlaceStakeRequest {
        prediction_id: body.prediction_id,
        side: body.side,
        amount: body.amount,
        currency: body.currency,
    };
    let input = validation::validate_stake_input(&request)?;
    let stake = state
        .ledger()
        .record_stake(body.user_id, &input)
        .map_err(stake_error)?;
    Ok(Json(stake))
}

/// Payment webhook target: resolve a pending stake to completed/failed
async fn update_stake_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StakeStatusBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let success = match PaymentStatus::parse(&body.status) {
        Some(PaymentStatus::Completed) => true,
        Some(PaymentStatus::Failed) => false,
        _ => {
            return Err(ApiError::BadRequest(
                "status must be \"completed\" or \"failed\"".to_string(),
            ))
        }
    };
    let updated = state
        .ledger()
        .confirm_payment(id, success)
        .map_err(stake_error)?;
    Ok(Json(json!({ "updated": updated })))
}

/// Ranked leaderboard with optional window and user-subset filters
async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let limit = params.limit.unwrap_or(20).min(100);
    let period = params.period.unwrap_or_else(|| "all".to_string());

    let since = match period.as_str() {
        "week" => Some(Utc::now() - Duration::days(7)),
        _ => None,
    };
    let user_ids = params.user_ids.as_deref().map(parse_user_ids).transpose()?;

    let filter = EventFilter { since, user_ids };
    let leaderboard = state.aggregator().leaderboard(limit, &filter)?;

    let total_settled = leaderboard
        .iter()
        .map(|e| e.reputation.settled_predictions)
        .sum();

    Ok(Json(LeaderboardResponse {
        summary: LeaderboardSummary {
            total_predictors: leaderboard.len(),
            total_settled_predictions: total_settled,
            period,
        },
        leaderboard,
    }))
}

async fn get_user_reputation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<crate::models::UserReputation>, ApiError> {
    Ok(Json(state.aggregator().reputation_for(id)?))
}

fn parse_user_ids(raw: &str) -> Result<Vec<i64>, ApiError> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid user id: {}", s)))
        })
        .collect()
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct CreatePredictionBody {
    user_id: i64,
    asset_symbol: String,
    direction: String,
    /// Unix timestamp (seconds)
    timeframe_end: i64,
    confidence: i64,
}

#[derive(Deserialize)]
struct PlaceStakeBody {
    user_id: i64,
    prediction_id: i64,
    side: String,
    amount: String,
    currency: String,
}

#[derive(Deserialize)]
struct StakeStatusBody {
    status: String,
}

#[derive(Deserialize)]
struct ExpiredQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
    /// "all" (default) or "week"
    period: Option<String>,
    /// Comma-separated user ids to restrict the board to
    user_ids: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct PredictionsResponse {
    count: usize,
    predictions: Vec<Prediction>,
}

#[derive(Serialize)]
struct CreatorReputation {
    win_rate: f64,
    total_settled: i64,
    score: i64,
}

#[derive(Serialize)]
struct PredictionDetail {
    #[serde(flatten)]
    prediction: Prediction,
    stake_summary: StakeSummary,
    creator_reputation: CreatorReputation,
}

#[derive(Serialize)]
struct SettleResponse {
    status: String,
    result: SettlementResult,
}

#[derive(Serialize)]
struct LeaderboardSummary {
    total_predictors: usize,
    total_settled_predictions: i64,
    period: String,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    summary: LeaderboardSummary,
    leaderboard: Vec<LeaderboardEntry>,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Precondition failed; retrying unchanged will not help
    Conflict(String),
    /// Transient upstream failure; the caller should try again later
    Unavailable(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

fn stake_error(err: StakeError) -> ApiError {
    match err {
        StakeError::PredictionNotFound(_) => ApiError::NotFound(err.to_string()),
        StakeError::PredictionNotOpen(_)
        | StakeError::PredictionExpired
        | StakeError::DuplicateStake => ApiError::Conflict(err.to_string()),
        StakeError::InvalidAmount(_) => ApiError::BadRequest(err.to_string()),
        StakeError::Storage(e) => ApiError::Internal(e),
    }
}

fn settle_error(err: SettleError) -> ApiError {
    match err {
        SettleError::NotFound(_) => ApiError::NotFound(err.to_string()),
        SettleError::NotOpen { .. } | SettleError::NoStakes(_) => {
            ApiError::Conflict(err.to_string())
        }
        SettleError::PriceUnavailable { .. } => ApiError::Unavailable(err.to_string()),
        SettleError::Storage(e) => ApiError::Internal(e),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{} (try again later)", msg),
            ),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::settlement::SettleError;

    #[test]
    fn test_settle_error_mapping() {
        assert!(matches!(
            settle_error(SettleError::NotFound(1)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            settle_error(SettleError::NoStakes(1)),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            settle_error(SettleError::PriceUnavailable {
                symbol: "BTC".to_string(),
                at: Utc::now(),
            }),
            ApiError::Unavailable(_)
        ));
    }

    #[test]
    fn test_stake_error_mapping() {
        assert!(matches!(
            stake_error(StakeError::DuplicateStake),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            stake_error(StakeError::PredictionNotFound(7)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            stake_error(StakeError::InvalidAmount("x".to_string())),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn test_parse_user_ids() {
        assert_eq!(parse_user_ids("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_user_ids("7").unwrap(), vec![7]);
        assert!(parse_user_ids("1,x").is_err());
        assert!(parse_user_ids("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_settle_through_handlers() {
        use crate::oracle::FixedPriceProvider;
        use chrono::Duration as ChronoDuration;

        let store = Arc::new(Store::open_in_memory().unwrap());
        let created = Utc::now();
        // Second-aligned because the request carries a unix timestamp
        let end = chrono::DateTime::from_timestamp(created.timestamp() + 3600, 0).unwrap();
        let provider = Arc::new(
            FixedPriceProvider::new()
                .with_price_at("BTC", created - ChronoDuration::hours(1), 100.0)
                .with_price_at("BTC", end, 110.0),
        );
        let state = AppState {
            store: store.clone(),
            provider,
        };

        let prediction = create_prediction(
            State(state.clone()),
            Json(CreatePredictionBody {
                user_id: 1,
                asset_symbol: "BTC".to_string(),
                direction: "up".to_string(),
                timeframe_end: end.timestamp(),
                confidence: 70,
            }),
        )
        .await
        .unwrap();
        let pid = prediction.0.id.unwrap();
        assert_eq!(prediction.0.direction, Direction::Up);

        // Stake, complete its payment, then settle
        let stake = place_stake(
            State(state.clone()),
            Json(PlaceStakeBody {
                user_id: 2,
                prediction_id: pid,
                side: "for".to_string(),
                amount: "10".to_string(),
                currency: "USDC".to_string(),
            }),
        )
        .await
        .unwrap();
        update_stake_status(
            State(state.clone()),
            Path(stake.0.id.unwrap()),
            Json(StakeStatusBody {
                status: "completed".to_string(),
            }),
        )
        .await
        .unwrap();

        // Settlement requires the deadline price point, which the fixed
        // provider already has
        let settled = settle_prediction(State(state.clone()), Path(pid))
            .await
            .unwrap();
        assert_eq!(settled.0.result.winners.len(), 1);
        assert_eq!(settled.0.result.winners[0].payout, "10000000");

        // Second settle maps to a conflict
        let again = settle_prediction(State(state.clone()), Path(pid)).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));

        // Detail view reflects the terminal state
        let detail = get_prediction(State(state), Path(pid)).await.unwrap();
        assert_eq!(detail.0.stake_summary.stake_count, 1);
        assert_eq!(detail.0.creator_reputation.score, 70);
    }
}
