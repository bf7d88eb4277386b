//! Domain Models
//! Mission: Typed records for predictions, stakes and reputation events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prediction lifecycle status. `Settled` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Open,
    Settled,
    Cancelled,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PredictionStatus::Open => "open",
            PredictionStatus::Settled => "settled",
            PredictionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PredictionStatus::Open),
            "settled" => Some(PredictionStatus::Settled),
            "cancelled" => Some(PredictionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Direction of a price call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

/// Side of a stake: `For` backs the creator, `Against` fades them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeSide {
    For,
    Against,
}

impl StakeSide {
    pub fn as_str(&self) -> &str {
        match self {
            StakeSide::For => "for",
            StakeSide::Against => "against",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "for" => Some(StakeSide::For),
            "against" => Some(StakeSide::Against),
            _ => None,
        }
    }

    pub fn opposite(&self) -> StakeSide {
        match self {
            StakeSide::For => StakeSide::Against,
            StakeSide::Against => StakeSide::For,
        }
    }
}

/// Payment lifecycle of a stake. Only `Completed` stakes count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// Outcome recorded on a reputation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationOutcome {
    Win,
    Loss,
    Neutral,
}

impl ReputationOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            ReputationOutcome::Win => "win",
            ReputationOutcome::Loss => "loss",
            ReputationOutcome::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "win" => Some(ReputationOutcome::Win),
            "loss" => Some(ReputationOutcome::Loss),
            "neutral" => Some(ReputationOutcome::Neutral),
            _ => None,
        }
    }
}

/// Supported stake currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "WLD")]
    Wld,
    #[serde(rename = "USDC")]
    Usdc,
}

impl Currency {
    pub fn as_str(&self) -> &str {
        match self {
            Currency::Wld => "WLD",
            Currency::Usdc => "USDC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WLD" => Some(Currency::Wld),
            "USDC" => Some(Currency::Usdc),
            _ => None,
        }
    }

    /// Base-unit decimals of the underlying token
    pub fn decimals(&self) -> usize {
        match self {
            Currency::Wld => 18,
            Currency::Usdc => 6,
        }
    }
}

/// A directional price call made by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub creator_user_id: i64,
    pub asset_symbol: String,
    pub direction: Direction,
    pub timeframe_end: DateTime<Utc>,
    /// Creator's self-declared confidence, 1-100. Doubles as the
    /// reputation delta magnitude at settlement.
    pub confidence: i32,
    pub status: PredictionStatus,
    pub settlement_price: Option<String>,
    pub settlement_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A value commitment on one side of a prediction.
/// `amount` is a base-unit integer in decimal string form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stake {
    pub id: Option<i64>,
    pub prediction_id: i64,
    pub user_id: i64,
    pub side: StakeSide,
    pub amount: String,
    pub currency: Currency,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// One immutable scoring event per (user, prediction), written at settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub id: Option<i64>,
    pub user_id: i64,
    pub prediction_id: i64,
    pub outcome: ReputationOutcome,
    pub delta_score: i32,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time aggregate over completed stakes for one prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeSummary {
    pub total_for: String,
    pub total_against: String,
    pub stake_count: usize,
}

impl StakeSummary {
    pub fn empty() -> Self {
        Self {
            total_for: "0".to_string(),
            total_against: "0".to_string(),
            stake_count: 0,
        }
    }
}

/// Per-user reputation aggregate, recomputed per query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: i64,
    pub total_predictions: i64,
    pub settled_predictions: i64,
    pub wins: i64,
    pub losses: i64,
    /// Win percentage 0-100, rounded to one decimal
    pub win_rate: f64,
    pub reputation_score: i64,
    pub streak: i64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// "coingecko" (default) or "fixed" for offline/demo mode
    pub price_provider: String,
    pub coingecko_base_url: String,
    pub price_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./predictpool.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let price_provider = std::env::var("PRICE_PROVIDER")
            .unwrap_or_else(|_| "coingecko".to_string());

        let coingecko_base_url = std::env::var("COINGECKO_BASE_URL")
            .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string());

        let price_timeout_secs = std::env::var("PRICE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            database_path,
            port,
            price_provider,
            coingecko_base_url,
            price_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trips() {
        for status in ["open", "settled", "cancelled"] {
            assert_eq!(PredictionStatus::parse(status).unwrap().as_str(), status);
        }
        for side in ["for", "against"] {
            assert_eq!(StakeSide::parse(side).unwrap().as_str(), side);
        }
        for outcome in ["win", "loss", "neutral"] {
            assert_eq!(ReputationOutcome::parse(outcome).unwrap().as_str(), outcome);
        }
        assert!(PredictionStatus::parse("bogus").is_none());
    }

    #[test]
    fn test_currency_decimals() {
        assert_eq!(Currency::Wld.decimals(), 18);
        assert_eq!(Currency::Usdc.decimals(), 6);
        assert_eq!(Currency::parse("WLD"), Some(Currency::Wld));
        assert_eq!(Currency::parse("wld"), None);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(StakeSide::For.opposite(), StakeSide::Against);
        assert_eq!(StakeSide::Against.opposite(), StakeSide::For);
    }
}
