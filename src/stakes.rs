//! Stake Ledger
//! Mission: Record stakes and aggregate per-prediction totals
//!
//! A summary is a point-in-time read over completed stakes, never a lock;
//! totals are summed as big integers so no amount ever touches a float.

use chrono::Utc;
use num_bigint::BigUint;
use std::sync::Arc;

use crate::amount;
use crate::models::{PaymentStatus, PredictionStatus, Stake, StakeSide, StakeSummary};
use crate::store::Store;
use crate::validation::PlaceStakeInput;

/// Stake placement failures
#[derive(Debug)]
pub enum StakeError {
    PredictionNotFound(i64),
    /// Prediction is in a terminal state
    PredictionNotOpen(PredictionStatus),
    /// Deadline has passed; the prediction awaits settlement
    PredictionExpired,
    /// The user already staked this side of this prediction
    DuplicateStake,
    InvalidAmount(String),
    Storage(anyhow::Error),
}

impl std::fmt::Display for StakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StakeError::PredictionNotFound(id) => write!(f, "Prediction {} not found", id),
            StakeError::PredictionNotOpen(status) => {
                write!(f, "Prediction is {}, cannot stake", status.as_str())
            }
            StakeError::PredictionExpired => write!(f, "Prediction timeframe has ended"),
            StakeError::DuplicateStake => {
                write!(f, "User already has a stake on this side of the prediction")
            }
            StakeError::InvalidAmount(msg) => write!(f, "Invalid stake amount: {}", msg),
            StakeError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for StakeError {}

impl From<anyhow::Error> for StakeError {
    fn from(e: anyhow::Error) -> Self {
        StakeError::Storage(e)
    }
}

/// Stake recording and aggregation over the shared store
pub struct StakeLedger {
    store: Arc<Store>,
}

impl StakeLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record a new stake for `user_id`. The referenced prediction must be
    /// open and before its deadline. The stake enters `pending` and only
    /// participates in summaries and settlement once its payment completes.
    pub fn record_stake(&self, user_id: i64, input: &PlaceStakeInput) -> Result<Stake, StakeError> {
        let prediction = self
            .store
            .get_prediction(input.prediction_id)?
            .ok_or(StakeError::PredictionNotFound(input.prediction_id))?;

        if prediction.status != PredictionStatus::Open {
            return Err(StakeError::PredictionNotOpen(prediction.status));
        }
        if prediction.timeframe_end <= Utc::now() {
            return Err(StakeError::PredictionExpired);
        }

        let base_units = amount::to_base_units(&input.amount, input.currency)
            .map_err(|e| StakeError::InvalidAmount(e.to_string()))?;

        let stake = Stake {
            id: None,
            prediction_id: input.prediction_id,
            user_id,
            side: input.side,
            amount: base_units,
            currency: input.currency,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };

        match self.store.insert_stake(&stake)? {
            Some(id) => Ok(Stake {
                id: Some(id),
                ..stake
            }),
            None => Err(StakeError::DuplicateStake),
        }
    }

    /// Apply the payment outcome to a pending stake. Returns false when the
    /// stake was not pending (replayed webhook) or does not exist.
    pub fn confirm_payment(&self, stake_id: i64, success: bool) -> Result<bool, StakeError> {
        let status = if success {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        Ok(self.store.set_stake_payment_status(stake_id, status)?)
    }

    /// Sum completed stakes for one prediction, partitioned by side.
    /// Zero totals and count 0 when none exist.
    pub fn summarize(&self, prediction_id: i64) -> Result<StakeSummary, StakeError> {
        let stakes = self.store.completed_stakes(prediction_id)?;

        let mut total_for = BigUint::from(0u32);
        let mut total_against = BigUint::from(0u32);

        for stake in &stakes {
            let value = amount::parse_base_units(&stake.amount)
                .map_err(|e| StakeError::InvalidAmount(e.to_string()))?;
            match stake.side {
                StakeSide::For => total_for += value,
                StakeSide::Against => total_against += value,
            }
        }

        Ok(StakeSummary {
            total_for: total_for.to_string(),
            total_against: total_against.to_string(),
            stake_count: stakes.len(),
        })
    }
}
