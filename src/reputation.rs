//! Reputation Aggregator & Leaderboard
//! Mission: Derive win rate, streak and rank from the reputation ledger
//!
//! Everything here is recomputed per query from the append-only event
//! ledger; nothing is persisted. A user with no events gets zeroed
//! metrics, never an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{ReputationEvent, ReputationOutcome, UserReputation};
use crate::store::{EventFilter, Store};

/// Streak only looks at the most recent events, matching the product's
/// "recent form" framing
const STREAK_LOOKBACK: usize = 20;

/// One ranked leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub reputation: UserReputation,
}

/// Signed consecutive-outcome run ending at the most recent event.
/// Positive for a win streak, negative for a loss streak, zero when no
/// win/loss events exist. Neutral events are skipped, and counting stops
/// at the first outcome that differs from the most recent one.
pub fn streak(events_desc: &[ReputationEvent]) -> i64 {
    let mut run = 0i64;
    let mut mode: Option<ReputationOutcome> = None;

    for event in events_desc {
        if event.outcome == ReputationOutcome::Neutral {
            continue;
        }
        let mode = *mode.get_or_insert(event.outcome);
        if event.outcome != mode {
            break;
        }
        run += if mode == ReputationOutcome::Win { 1 } else { -1 };
    }

    run
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Win percentage 0-100 rounded to one decimal; 0 when nothing settled
fn win_rate(wins: i64, settled: i64) -> f64 {
    if settled > 0 {
        round_one_decimal(wins as f64 / settled as f64 * 100.0)
    } else {
        0.0
    }
}

/// Reputation reads over the shared store
pub struct ReputationAggregator {
    store: Arc<Store>,
}

impl ReputationAggregator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Full reputation aggregate for one user
    pub fn reputation_for(&self, user_id: i64) -> anyhow::Result<UserReputation> {
        let events = self.store.events_for_user(user_id, None, None)?;

        let wins = events
            .iter()
            .filter(|e| e.outcome == ReputationOutcome::Win)
            .count() as i64;
        let losses = events
            .iter()
            .filter(|e| e.outcome == ReputationOutcome::Loss)
            .count() as i64;
        let settled = wins + losses;
        let score: i64 = events.iter().map(|e| e.delta_score as i64).sum();
        let recent = &events[..events.len().min(STREAK_LOOKBACK)];

        Ok(UserReputation {
            user_id,
            total_predictions: self.store.count_predictions_by_creator(user_id)?,
            settled_predictions: settled,
            wins,
            losses,
            win_rate: win_rate(wins, settled),
            reputation_score: score,
            streak: streak(recent),
        })
    }

    /// Ranked leaderboard: score descending, user id ascending on ties.
    /// An empty `user_ids` subset yields an empty board, not an error.
    pub fn leaderboard(
        &self,
        limit: usize,
        filter: &EventFilter,
    ) -> anyhow::Result<Vec<LeaderboardEntry>> {
        let rows = self.store.score_rows(filter, limit)?;

        let mut entries = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let settled = row.wins + row.losses;
            let recent =
                self.store
                    .events_for_user(row.user_id, filter.since, Some(STREAK_LOOKBACK))?;

            entries.push(LeaderboardEntry {
                rank: idx + 1,
                reputation: UserReputation {
                    user_id: row.user_id,
                    total_predictions: self.store.count_predictions_by_creator(row.user_id)?,
                    settled_predictions: settled,
                    wins: row.wins,
                    losses: row.losses,
                    win_rate: win_rate(row.wins, settled),
                    reputation_score: row.score,
                    streak: streak(&recent),
                },
            });
        }

        Ok(entries)
    }
}
