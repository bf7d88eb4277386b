//! Settlement Engine
//! Mission: Resolve one open prediction into a terminal outcome, exactly once
//!
//! The engine reads completed stakes, asks the price resolver for the
//! settlement and reference prices, computes pari-mutuel payouts per
//! currency, and persists the terminal state plus reputation events as one
//! transactional unit. Safety under retry comes from the store's
//! `open`-status guard and the unique (user, prediction) event index, so a
//! crash-and-retry converges on the same end state without double-counting.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::amount;
use crate::models::{
    Currency, Direction, PredictionStatus, ReputationEvent, ReputationOutcome, Stake, StakeSide,
};
use crate::oracle::PriceProvider;
use crate::store::Store;

/// Which way a settled prediction resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    CreatorCorrect,
    CreatorWrong,
}

impl SettlementOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            SettlementOutcome::CreatorCorrect => "creator_correct",
            SettlementOutcome::CreatorWrong => "creator_wrong",
        }
    }

    /// The stake side that won under this outcome
    pub fn winning_side(&self) -> StakeSide {
        match self {
            SettlementOutcome::CreatorCorrect => StakeSide::For,
            SettlementOutcome::CreatorWrong => StakeSide::Against,
        }
    }
}

/// A winning staker's share of the settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerEntry {
    pub user_id: i64,
    pub side: StakeSide,
    /// Base-unit decimal string
    pub stake_amount: String,
    pub currency: Currency,
    /// Stake returned plus proportional share of the losing pool,
    /// base-unit decimal string
    pub payout: String,
    pub reputation_delta: i32,
}

/// A losing staker's forfeited position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoserEntry {
    pub user_id: i64,
    pub side: StakeSide,
    pub stake_amount: String,
    pub currency: Currency,
    pub reputation_delta: i32,
}

/// Full settlement breakdown returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub prediction_id: i64,
    pub settlement_price: String,
    pub outcome: SettlementOutcome,
    pub winners: Vec<WinnerEntry>,
    pub losers: Vec<LoserEntry>,
    pub creator_reputation_delta: i32,
}

/// Settlement failures. Only `PriceUnavailable` is retriable: nothing has
/// been written when it fires, so the caller may simply try again later.
#[derive(Debug)]
pub enum SettleError {
    NotFound(i64),
    /// Prediction is already in a terminal state
    NotOpen {
        prediction_id: i64,
        status: PredictionStatus,
    },
    /// The price feed could not produce a price for this instant
    PriceUnavailable {
        symbol: String,
        at: DateTime<Utc>,
    },
    /// No completed stakes exist; the payout math is undefined on an
    /// empty pool
    NoStakes(i64),
    Storage(anyhow::Error),
}

impl SettleError {
    /// True when the caller may re-attempt later without side effects
    pub fn is_retriable(&self) -> bool {
        matches!(self, SettleError::PriceUnavailable { .. })
    }
}

impl std::fmt::Display for SettleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettleError::NotFound(id) => write!(f, "Prediction {} not found", id),
            SettleError::NotOpen {
                prediction_id,
                status,
            } => write!(
                f,
                "Prediction {} is {}, cannot settle",
                prediction_id,
                status.as_str()
            ),
            SettleError::PriceUnavailable { symbol, at } => write!(
                f,
                "Failed to fetch price for {} at {}",
                symbol,
                at.to_rfc3339()
            ),
            SettleError::NoStakes(id) => {
                write!(f, "Prediction {} has no completed stakes to settle", id)
            }
            SettleError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SettleError {}

impl From<anyhow::Error> for SettleError {
    fn from(e: anyhow::Error) -> Self {
        SettleError::Storage(e)
    }
}

/// Pari-mutuel payout for one winning stake: the stake itself plus its
/// proportional share of the losing pool, truncated toward zero. A zero
/// winning pool degrades to payout-equals-stake.
fn pari_mutuel_payout(stake: &BigUint, winning_pool: &BigUint, losing_pool: &BigUint) -> BigUint {
    let zero = BigUint::from(0u32);
    if *winning_pool == zero {
        return stake.clone();
    }
    stake + (stake * losing_pool) / winning_pool
}

/// Per-currency pool totals for one side
fn pool_by_currency(stakes: &[&Stake]) -> Result<HashMap<Currency, BigUint>, SettleError> {
    let mut pools: HashMap<Currency, BigUint> = HashMap::new();
    for stake in stakes {
        let value = amount::parse_base_units(&stake.amount)
            .map_err(|e| SettleError::Storage(anyhow::anyhow!(e)))?;
        *pools.entry(stake.currency).or_default() += value;
    }
    Ok(pools)
}

/// Settlement engine over the shared store and a pluggable price resolver
pub struct SettlementEngine {
    store: Arc<Store>,
    provider: Arc<dyn PriceProvider>,
}

impl SettlementEngine {
    pub fn new(store: Arc<Store>, provider: Arc<dyn PriceProvider>) -> Self {
        Self { store, provider }
    }

    /// Transition one prediction from `open` to `settled` with payouts and
    /// reputation side effects. Idempotent under retry: a second call after
    /// success fails with `NotOpen` and writes nothing.
    pub async fn settle(&self, prediction_id: i64) -> Result<SettlementResult, SettleError> {
        let prediction = self
            .store
            .get_prediction(prediction_id)?
            .ok_or(SettleError::NotFound(prediction_id))?;

        if prediction.status != PredictionStatus::Open {
            return Err(SettleError::NotOpen {
                prediction_id,
                status: prediction.status,
            });
        }

        let settlement_price = self
            .provider
            .get_price_at(&prediction.asset_symbol, prediction.timeframe_end)
            .await
            .ok_or_else(|| SettleError::PriceUnavailable {
                symbol: prediction.asset_symbol.clone(),
                at: prediction.timeframe_end,
            })?;

        // Reference price: the price when the call was made. The up/down
        // outcome is always judged against creation time.
        let creation_price = self
            .provider
            .get_price_at(&prediction.asset_symbol, prediction.created_at)
            .await
            .ok_or_else(|| SettleError::PriceUnavailable {
                symbol: prediction.asset_symbol.clone(),
                at: prediction.created_at,
            })?;

        let price_went_up = settlement_price > creation_price;
        let creator_correct = match prediction.direction {
            Direction::Up => price_went_up,
            Direction::Down => !price_went_up,
        };
        let outcome = if creator_correct {
            SettlementOutcome::CreatorCorrect
        } else {
            SettlementOutcome::CreatorWrong
        };

        let stakes = self.store.completed_stakes(prediction_id)?;
        if stakes.is_empty() {
            return Err(SettleError::NoStakes(prediction_id));
        }

        let winning_side = outcome.winning_side();
        let winning_stakes: Vec<&Stake> =
            stakes.iter().filter(|s| s.side == winning_side).collect();
        let losing_stakes: Vec<&Stake> =
            stakes.iter().filter(|s| s.side != winning_side).collect();

        let winning_pools = pool_by_currency(&winning_stakes)?;
        let losing_pools = pool_by_currency(&losing_stakes)?;
        let zero = BigUint::from(0u32);

        let confidence = prediction.confidence;
        let mut winners = Vec::with_capacity(winning_stakes.len());
        for stake in &winning_stakes {
            let value = amount::parse_base_units(&stake.amount)
                .map_err(|e| SettleError::Storage(anyhow::anyhow!(e)))?;
            let winning_pool = winning_pools.get(&stake.currency).unwrap_or(&zero);
            let losing_pool = losing_pools.get(&stake.currency).unwrap_or(&zero);
            let payout = pari_mutuel_payout(&value, winning_pool, losing_pool);

            winners.push(WinnerEntry {
                user_id: stake.user_id,
                side: stake.side,
                stake_amount: stake.amount.clone(),
                currency: stake.currency,
                payout: payout.to_string(),
                reputation_delta: confidence,
            });
        }

        let losers: Vec<LoserEntry> = losing_stakes
            .iter()
            .map(|stake| LoserEntry {
                user_id: stake.user_id,
                side: stake.side,
                stake_amount: stake.amount.clone(),
                currency: stake.currency,
                reputation_delta: -confidence,
            })
            .collect();

        let creator_reputation_delta = if creator_correct {
            confidence
        } else {
            -confidence
        };

        // Creator event first so it wins the (user, prediction) uniqueness
        // if the creator also staked their own prediction.
        let now = Utc::now();
        let mut events = Vec::with_capacity(1 + winners.len() + losers.len());
        events.push(ReputationEvent {
            id: None,
            user_id: prediction.creator_user_id,
            prediction_id,
            outcome: if creator_correct {
                ReputationOutcome::Win
            } else {
                ReputationOutcome::Loss
            },
            delta_score: creator_reputation_delta,
            created_at: now,
        });
        for winner in &winners {
            events.push(ReputationEvent {
                id: None,
                user_id: winner.user_id,
                prediction_id,
                outcome: ReputationOutcome::Win,
                delta_score: winner.reputation_delta,
                created_at: now,
            });
        }
        for loser in &losers {
            events.push(ReputationEvent {
                id: None,
                user_id: loser.user_id,
                prediction_id,
                outcome: ReputationOutcome::Loss,
                delta_score: loser.reputation_delta,
                created_at: now,
            });
        }

        let settlement_price_str = settlement_price.to_string();
        let persisted =
            self.store
                .persist_settlement(prediction_id, &settlement_price_str, now, &events)?;
        if !persisted {
            // Another settlement attempt won the status race
            let status = self
                .store
                .get_prediction(prediction_id)?
                .map(|p| p.status)
                .unwrap_or(PredictionStatus::Settled);
            return Err(SettleError::NotOpen {
                prediction_id,
                status,
            });
        }

        info!(
            "⚖️ Prediction {} settled: price={}, outcome={}, winners={}, losers={}",
            prediction_id,
            settlement_price_str,
            outcome.as_str(),
            winners.len(),
            losers.len()
        );

        Ok(SettlementResult {
            prediction_id,
            settlement_price: settlement_price_str,
            outcome,
            winners,
            losers,
            creator_reputation_delta,
        })
    }
}
