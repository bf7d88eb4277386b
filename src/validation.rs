//! Boundary Input Validation
//! Mission: Only validated, strongly-typed inputs reach the engine
//!
//! Raw request payloads are deserialized into the `*Request` shapes and
//! must pass through `validate_*` before anything touches storage. Each
//! rejected field gets its own error variant so the HTTP layer can report
//! a specific reason.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::models::{Currency, Direction, StakeSide};

/// Maximum prediction horizon: one year out
const MAX_TIMEFRAME_DAYS: i64 = 365;

/// Minimum human-readable stake amount (payment-rail minimum)
const MIN_STAKE_AMOUNT: f64 = 0.1;

/// Per-field validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    AssetSymbol(String),
    Direction(String),
    TimeframeEnd(String),
    Confidence(String),
    Side(String),
    Amount(String),
    Currency(String),
    PredictionId(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::AssetSymbol(msg) => write!(f, "asset_symbol: {}", msg),
            ValidationError::Direction(msg) => write!(f, "direction: {}", msg),
            ValidationError::TimeframeEnd(msg) => write!(f, "timeframe_end: {}", msg),
            ValidationError::Confidence(msg) => write!(f, "confidence: {}", msg),
            ValidationError::Side(msg) => write!(f, "side: {}", msg),
            ValidationError::Amount(msg) => write!(f, "amount: {}", msg),
            ValidationError::Currency(msg) => write!(f, "currency: {}", msg),
            ValidationError::PredictionId(msg) => write!(f, "prediction_id: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Raw create-prediction payload as received over the wire
#[derive(Debug, Deserialize)]
pub struct CreatePredictionRequest {
    pub asset_symbol: String,
    pub direction: String,
    /// Unix timestamp (seconds)
    pub timeframe_end: i64,
    pub confidence: i64,
}

/// Validated create-prediction input
#[derive(Debug, Clone)]
pub struct CreatePredictionInput {
    pub asset_symbol: String,
    pub direction: Direction,
    pub timeframe_end: DateTime<Utc>,
    pub confidence: i32,
}

pub fn validate_prediction_input(
    req: &CreatePredictionRequest,
) -> Result<CreatePredictionInput, ValidationError> {
    if req.asset_symbol.is_empty() || req.asset_symbol.len() > 10 {
        return Err(ValidationError::AssetSymbol(
            "must be 1-10 uppercase alphanumeric chars (e.g. ETH, BTC)".to_string(),
        ));
    }
    if !req
        .asset_symbol
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return Err(ValidationError::AssetSymbol(
            "must be 1-10 uppercase alphanumeric chars (e.g. ETH, BTC)".to_string(),
        ));
    }

    let direction = Direction::parse(&req.direction)
        .ok_or_else(|| ValidationError::Direction("must be \"up\" or \"down\"".to_string()))?;

    let timeframe_end = DateTime::from_timestamp(req.timeframe_end, 0)
        .ok_or_else(|| ValidationError::TimeframeEnd("not a valid unix timestamp".to_string()))?;
    let now = Utc::now();
    if timeframe_end <= now {
        return Err(ValidationError::TimeframeEnd(
            "must be in the future".to_string(),
        ));
    }
    if timeframe_end > now + Duration::days(MAX_TIMEFRAME_DAYS) {
        return Err(ValidationError::TimeframeEnd(
            "cannot be more than 1 year in the future".to_string(),
        ));
    }

    if req.confidence < 1 || req.confidence > 100 {
        return Err(ValidationError::Confidence(
            "must be an integer between 1 and 100".to_string(),
        ));
    }

    Ok(CreatePredictionInput {
        asset_symbol: req.asset_symbol.clone(),
        direction,
        timeframe_end,
        confidence: req.confidence as i32,
    })
}

/// Raw place-stake payload as received over the wire
#[derive(Debug, Deserialize)]
pub struct PlaceStakeRequest {
    pub prediction_id: i64,
    pub side: String,
    /// Human-readable decimal amount (e.g. "10.5")
    pub amount: String,
    pub currency: String,
}

/// Validated place-stake input. `amount` is still human-readable here;
/// the stake ledger converts to base units at the write.
#[derive(Debug, Clone)]
pub struct PlaceStakeInput {
    pub prediction_id: i64,
    pub side: StakeSide,
    pub amount: String,
    pub currency: Currency,
}

pub fn validate_stake_input(req: &PlaceStakeRequest) -> Result<PlaceStakeInput, ValidationError> {
    if req.prediction_id <= 0 {
        return Err(ValidationError::PredictionId(
            "must be a positive integer".to_string(),
        ));
    }

    let side = StakeSide::parse(&req.side)
        .ok_or_else(|| ValidationError::Side("must be \"for\" or \"against\"".to_string()))?;

    let currency = Currency::parse(&req.currency)
        .ok_or_else(|| ValidationError::Currency("must be \"WLD\" or \"USDC\"".to_string()))?;

    // Float parse is only used to enforce the positive minimum; the amount
    // itself stays a string and goes through the fixed-point codec.
    let numeric: f64 = req
        .amount
        .parse()
        .map_err(|_| ValidationError::Amount("must be a positive number".to_string()))?;
    if !numeric.is_finite() || numeric <= 0.0 {
        return Err(ValidationError::Amount(
            "must be a positive number".to_string(),
        ));
    }
    if numeric < MIN_STAKE_AMOUNT {
        return Err(ValidationError::Amount(
            "must be at least 0.1".to_string(),
        ));
    }
    crate::amount::to_base_units(&req.amount, currency)
        .map_err(|_| ValidationError::Amount("must be a plain decimal string".to_string()))?;

    Ok(PlaceStakeInput {
        prediction_id: req.prediction_id,
        side,
        amount: req.amount.clone(),
        currency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction_request() -> CreatePredictionRequest {
        CreatePredictionRequest {
            asset_symbol: "BTC".to_string(),
            direction: "up".to_string(),
            timeframe_end: (Utc::now() + Duration::hours(1)).timestamp(),
            confidence: 70,
        }
    }

    #[test]
    fn test_valid_prediction_input() {
        let input = validate_prediction_input(&prediction_request()).unwrap();
        assert_eq!(input.asset_symbol, "BTC");
        assert_eq!(input.direction, Direction::Up);
        assert_eq!(input.confidence, 70);
    }

    #[test]
    fn test_rejects_bad_symbol() {
        let mut req = prediction_request();
        req.asset_symbol = "btc".to_string();
        assert!(matches!(
            validate_prediction_input(&req),
            Err(ValidationError::AssetSymbol(_))
        ));

        req.asset_symbol = "TOOLONGSYMBOL".to_string();
        assert!(validate_prediction_input(&req).is_err());
    }

    #[test]
    fn test_rejects_past_and_distant_timeframe() {
        let mut req = prediction_request();
        req.timeframe_end = (Utc::now() - Duration::hours(1)).timestamp();
        assert!(matches!(
            validate_prediction_input(&req),
            Err(ValidationError::TimeframeEnd(_))
        ));

        req.timeframe_end = (Utc::now() + Duration::days(400)).timestamp();
        assert!(matches!(
            validate_prediction_input(&req),
            Err(ValidationError::TimeframeEnd(_))
        ));
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        for confidence in [0, 101, -5] {
            let mut req = prediction_request();
            req.confidence = confidence;
            assert!(matches!(
                validate_prediction_input(&req),
                Err(ValidationError::Confidence(_))
            ));
        }
    }

    #[test]
    fn test_valid_stake_input() {
        let req = PlaceStakeRequest {
            prediction_id: 1,
            side: "for".to_string(),
            amount: "10.5".to_string(),
            currency: "USDC".to_string(),
        };
        let input = validate_stake_input(&req).unwrap();
        assert_eq!(input.side, StakeSide::For);
        assert_eq!(input.currency, Currency::Usdc);
    }

    #[test]
    fn test_rejects_small_or_negative_amounts() {
        for amount in ["0.05", "0", "-3", "nope"] {
            let req = PlaceStakeRequest {
                prediction_id: 1,
                side: "against".to_string(),
                amount: amount.to_string(),
                currency: "WLD".to_string(),
            };
            assert!(matches!(
                validate_stake_input(&req),
                Err(ValidationError::Amount(_))
            ));
        }
    }

    #[test]
    fn test_rejects_unknown_currency_and_side() {
        let req = PlaceStakeRequest {
            prediction_id: 1,
            side: "maybe".to_string(),
            amount: "1".to_string(),
            currency: "USDC".to_string(),
        };
        assert!(matches!(
            validate_stake_input(&req),
            Err(ValidationError::Side(_))
        ));

        let req = PlaceStakeRequest {
            prediction_id: 1,
            side: "for".to_string(),
            amount: "1".to_string(),
            currency: "DOGE".to_string(),
        };
        assert!(matches!(
            validate_stake_input(&req),
            Err(ValidationError::Currency(_))
        ));
    }
}
