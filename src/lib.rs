//! PredictPool Backend Library
//!
//! Settlement and reputation engine for a social prediction-market
//! mini-app: users post directional price calls, others stake for or
//! against them, and settled outcomes feed an append-only reputation
//! ledger that drives win rates, streaks and the leaderboard.

pub mod amount;
pub mod api;
pub mod models;
pub mod oracle;
pub mod reputation;
pub mod settlement;
pub mod stakes;
pub mod store;
pub mod validation;
