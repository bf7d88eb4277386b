//! SQLite-Backed Prediction Store
//! Mission: Durable predictions, stakes and the append-only reputation ledger
//!
//! Concurrency safety for settlement lives in this layer, not in thread
//! coordination: the `open`-status guard on the terminal update plus the
//! unique (user_id, prediction_id) index on reputation_events mean two
//! racing settlement attempts cannot both write divergent terminal state
//! or duplicate scoring events.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use std::sync::Arc;
use tracing::info;

use crate::models::{
    Currency, Direction, PaymentStatus, Prediction, PredictionStatus, ReputationEvent,
    ReputationOutcome, Stake, StakeSide,
};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creator_user_id INTEGER NOT NULL,
    asset_symbol TEXT NOT NULL,
    direction TEXT NOT NULL,
    timeframe_end TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    settlement_price TEXT,
    settlement_timestamp TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_predictions_creator
    ON predictions(creator_user_id);
CREATE INDEX IF NOT EXISTS idx_predictions_status
    ON predictions(status, timeframe_end);

CREATE TABLE IF NOT EXISTS stakes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prediction_id INTEGER NOT NULL REFERENCES predictions(id),
    user_id INTEGER NOT NULL,
    side TEXT NOT NULL,
    amount TEXT NOT NULL,
    currency TEXT NOT NULL,
    payment_status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stakes_prediction
    ON stakes(prediction_id, payment_status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_stakes_user_prediction_side
    ON stakes(user_id, prediction_id, side);

CREATE TABLE IF NOT EXISTS reputation_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    prediction_id INTEGER NOT NULL REFERENCES predictions(id),
    outcome TEXT NOT NULL,
    delta_score INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reputation_user
    ON reputation_events(user_id, created_at DESC);
CREATE UNIQUE INDEX IF NOT EXISTS idx_reputation_user_prediction
    ON reputation_events(user_id, prediction_id);
"#;

/// Grouped reputation totals for one user
#[derive(Debug, Clone)]
pub struct ScoreRow {
    pub user_id: i64,
    pub score: i64,
    pub wins: i64,
    pub losses: i64,
}

/// Optional filters for grouped reputation reads
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events at/after this instant
    pub since: Option<DateTime<Utc>>,
    /// Restrict to this user subset. `Some(empty)` matches nothing.
    pub user_ids: Option<Vec<i64>>,
}

/// Shared SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Fixed-width RFC 3339 so stored timestamps order lexicographically
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid stored timestamp: {}", s))?
        .with_timezone(&Utc))
}

impl Store {
    /// Open (or create) the database at `db_path`
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        info!("📊 Prediction store initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ===== Predictions =====

    /// Insert a new prediction, returning its row id
    pub fn insert_prediction(&self, p: &Prediction) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO predictions
                (creator_user_id, asset_symbol, direction, timeframe_end,
                 confidence, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                p.creator_user_id,
                p.asset_symbol,
                p.direction.as_str(),
                ts(p.timeframe_end),
                p.confidence,
                p.status.as_str(),
                ts(p.created_at),
            ],
        )
        .context("Failed to insert prediction")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_prediction(&self, id: i64) -> Result<Option<Prediction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM predictions WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_prediction(row)?)),
            None => Ok(None),
        }
    }

    /// Number of predictions a user has created, regardless of settlement
    pub fn count_predictions_by_creator(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM predictions WHERE creator_user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Open predictions whose deadline has passed, oldest first.
    /// A scheduled sweep calls `settle` once per returned id.
    pub fn list_expired_open(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Prediction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM predictions
             WHERE status = 'open' AND timeframe_end <= ?1
             ORDER BY timeframe_end ASC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![ts(now), limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_prediction(row)?);
        }
        Ok(out)
    }

    /// Guarded `open -> cancelled` transition. Returns false if the
    /// prediction was not open (or absent).
    pub fn cancel_prediction(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE predictions SET status = 'cancelled'
             WHERE id = ?1 AND status = 'open'",
            params![id],
        )?;
        Ok(changed == 1)
    }

    /// Persist a settlement as one logical unit: the guarded terminal
    /// update and every reputation event commit together or not at all.
    /// Event inserts are `INSERT OR IGNORE`, so a retried settlement that
    /// lost the status race (or already ran) never duplicates events.
    ///
    /// Returns false without side effects if the prediction was not open.
    pub fn persist_settlement(
        &self,
        prediction_id: i64,
        settlement_price: &str,
        settled_at: DateTime<Utc>,
        events: &[ReputationEvent],
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let changed = tx.execute(
            "UPDATE predictions
             SET status = 'settled', settlement_price = ?1, settlement_timestamp = ?2
             WHERE id = ?3 AND status = 'open'",
            params![settlement_price, ts(settled_at), prediction_id],
        )?;

        if changed == 0 {
            // Lost the race or already terminal
            tx.rollback().ok();
            return Ok(false);
        }

        for event in events {
            tx.execute(
                "INSERT OR IGNORE INTO reputation_events
                    (user_id, prediction_id, outcome, delta_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.user_id,
                    event.prediction_id,
                    event.outcome.as_str(),
                    event.delta_score,
                    ts(event.created_at),
                ],
            )?;
        }

        tx.commit().context("Failed to commit settlement")?;
        Ok(true)
    }

    // ===== Stakes =====

    /// Insert a stake. Returns None if the (user, prediction, side)
    /// uniqueness constraint rejected it (duplicate stake).
    pub fn insert_stake(&self, s: &Stake) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO stakes
                (prediction_id, user_id, side, amount, currency, payment_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                s.prediction_id,
                s.user_id,
                s.side.as_str(),
                s.amount,
                s.currency.as_str(),
                s.payment_status.as_str(),
                ts(s.created_at),
            ],
        )
        .context("Failed to insert stake")?;

        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn get_stake(&self, id: i64) -> Result<Option<Stake>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM stakes WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_stake(row)?)),
            None => Ok(None),
        }
    }

    /// Guarded `pending -> completed|failed` transition. Completed and
    /// failed stakes are immutable, so replayed payment webhooks no-op.
    pub fn set_stake_payment_status(&self, id: i64, status: PaymentStatus) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE stakes SET payment_status = ?1
             WHERE id = ?2 AND payment_status = 'pending'",
            params![status.as_str(), id],
        )?;
        Ok(changed == 1)
    }

    /// All completed stakes for one prediction, insertion order
    pub fn completed_stakes(&self, prediction_id: i64) -> Result<Vec<Stake>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM stakes
             WHERE prediction_id = ?1 AND payment_status = 'completed'
             ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![prediction_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_stake(row)?);
        }
        Ok(out)
    }

    // ===== Reputation ledger =====

    /// Append one reputation event. Returns false when the
    /// (user, prediction) uniqueness invariant turned it into a no-op.
    pub fn append_reputation_event(&self, e: &ReputationEvent) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO reputation_events
                (user_id, prediction_id, outcome, delta_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                e.user_id,
                e.prediction_id,
                e.outcome.as_str(),
                e.delta_score,
                ts(e.created_at),
            ],
        )
        .context("Failed to append reputation event")?;
        Ok(changed == 1)
    }

    /// A user's events, most recent first, optionally windowed and capped
    pub fn events_for_user(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ReputationEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM reputation_events
             WHERE user_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC, id DESC
             LIMIT ?3",
        )?;
        let since_ts = since.map(ts).unwrap_or_else(|| String::from(""));
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut rows = stmt.query(params![user_id, since_ts, limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_event(row)?);
        }
        Ok(out)
    }

    /// Grouped per-user score totals over win/loss events, score
    /// descending with user id as the deterministic tiebreak.
    pub fn score_rows(&self, filter: &EventFilter, limit: usize) -> Result<Vec<ScoreRow>> {
        if matches!(&filter.user_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT user_id,
                    SUM(delta_score) AS score,
                    SUM(CASE WHEN outcome = 'win' THEN 1 ELSE 0 END) AS wins,
                    SUM(CASE WHEN outcome = 'loss' THEN 1 ELSE 0 END) AS losses
             FROM reputation_events",
        );

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(since) = filter.since {
            clauses.push("created_at >= ?".to_string());
            values.push(Value::Text(ts(since)));
        }
        if let Some(ids) = &filter.user_ids {
            let placeholders = vec!["?"; ids.len()].join(", ");
            clauses.push(format!("user_id IN ({})", placeholders));
            values.extend(ids.iter().map(|id| Value::Integer(*id)));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" GROUP BY user_id ORDER BY score DESC, user_id ASC LIMIT ?");
        values.push(Value::Integer(limit as i64));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ScoreRow {
                user_id: row.get("user_id")?,
                score: row.get("score")?,
                wins: row.get("wins")?,
                losses: row.get("losses")?,
            });
        }
        Ok(out)
    }
}

// ===== Row mappers =====

fn row_to_prediction(row: &Row<'_>) -> Result<Prediction> {
    let direction: String = row.get("direction")?;
    let status: String = row.get("status")?;
    let timeframe_end: String = row.get("timeframe_end")?;
    let created_at: String = row.get("created_at")?;
    let settlement_timestamp: Option<String> = row.get("settlement_timestamp")?;

    Ok(Prediction {
        id: Some(row.get("id")?),
        creator_user_id: row.get("creator_user_id")?,
        asset_symbol: row.get("asset_symbol")?,
        direction: Direction::parse(&direction)
            .with_context(|| format!("Invalid stored direction: {}", direction))?,
        timeframe_end: parse_ts(&timeframe_end)?,
        confidence: row.get("confidence")?,
        status: PredictionStatus::parse(&status)
            .with_context(|| format!("Invalid stored status: {}", status))?,
        settlement_price: row.get("settlement_price")?,
        settlement_timestamp: settlement_timestamp.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_stake(row: &Row<'_>) -> Result<Stake> {
    let side: String = row.get("side")?;
    let currency: String = row.get("currency")?;
    let payment_status: String = row.get("payment_status")?;
    let created_at: String = row.get("created_at")?;

    Ok(Stake {
        id: Some(row.get("id")?),
        prediction_id: row.get("prediction_id")?,
        user_id: row.get("user_id")?,
        side: StakeSide::parse(&side).with_context(|| format!("Invalid stored side: {}", side))?,
        amount: row.get("amount")?,
        currency: Currency::parse(&currency)
            .with_context(|| format!("Invalid stored currency: {}", currency))?,
        payment_status: PaymentStatus::parse(&payment_status)
            .with_context(|| format!("Invalid stored payment status: {}", payment_status))?,
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_event(row: &Row<'_>) -> Result<ReputationEvent> {
    let outcome: String = row.get("outcome")?;
    let created_at: String = row.get("created_at")?;

    Ok(ReputationEvent {
        id: Some(row.get("id")?),
        user_id: row.get("user_id")?,
        prediction_id: row.get("prediction_id")?,
        outcome: ReputationOutcome::parse(&outcome)
            .with_context(|| format!("Invalid stored outcome: {}", outcome))?,
        delta_score: row.get("delta_score")?,
        created_at: parse_ts(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn open_prediction(creator: i64) -> Prediction {
        Prediction {
            id: None,
            creator_user_id: creator,
            asset_symbol: "BTC".to_string(),
            direction: Direction::Up,
            timeframe_end: Utc::now() + Duration::hours(2),
            confidence: 70,
            status: PredictionStatus::Open,
            settlement_price: None,
            settlement_timestamp: None,
            created_at: Utc::now(),
        }
    }

    fn stake(prediction_id: i64, user_id: i64, side: StakeSide, amount: &str) -> Stake {
        Stake {
            id: None,
            prediction_id,
            user_id,
            side,
            amount: amount.to_string(),
            currency: Currency::Usdc,
            payment_status: PaymentStatus::Completed,
            created_at: Utc::now(),
        }
    }

    fn event(user_id: i64, prediction_id: i64, outcome: ReputationOutcome, delta: i32) -> ReputationEvent {
        ReputationEvent {
            id: None,
            user_id,
            prediction_id,
            outcome,
            delta_score: delta,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_prediction_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_prediction(&open_prediction(1)).unwrap();

        let loaded = store.get_prediction(id).unwrap().unwrap();
        assert_eq!(loaded.creator_user_id, 1);
        assert_eq!(loaded.asset_symbol, "BTC");
        assert_eq!(loaded.status, PredictionStatus::Open);
        assert!(loaded.settlement_price.is_none());

        assert!(store.get_prediction(9999).unwrap().is_none());
        assert_eq!(store.count_predictions_by_creator(1).unwrap(), 1);
        assert_eq!(store.count_predictions_by_creator(2).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_stake_side_rejected() {
        let store = Store::open_in_memory().unwrap();
        let pid = store.insert_prediction(&open_prediction(1)).unwrap();

        assert!(store
            .insert_stake(&stake(pid, 2, StakeSide::For, "1000"))
            .unwrap()
            .is_some());
        // Same user, same side: constraint turns it into a no-op
        assert!(store
            .insert_stake(&stake(pid, 2, StakeSide::For, "500"))
            .unwrap()
            .is_none());
        // Opposite side is allowed
        assert!(store
            .insert_stake(&stake(pid, 2, StakeSide::Against, "500"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_payment_status_transition_is_guarded() {
        let store = Store::open_in_memory().unwrap();
        let pid = store.insert_prediction(&open_prediction(1)).unwrap();

        let mut s = stake(pid, 2, StakeSide::For, "1000");
        s.payment_status = PaymentStatus::Pending;
        let sid = store.insert_stake(&s).unwrap().unwrap();

        assert!(store
            .set_stake_payment_status(sid, PaymentStatus::Completed)
            .unwrap());
        // Replayed webhook cannot flip a terminal status
        assert!(!store
            .set_stake_payment_status(sid, PaymentStatus::Failed)
            .unwrap());

        let loaded = store.get_stake(sid).unwrap().unwrap();
        assert_eq!(loaded.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_completed_stakes_excludes_pending_and_failed() {
        let store = Store::open_in_memory().unwrap();
        let pid = store.insert_prediction(&open_prediction(1)).unwrap();

        store.insert_stake(&stake(pid, 2, StakeSide::For, "1000")).unwrap();
        let mut pending = stake(pid, 3, StakeSide::For, "400");
        pending.payment_status = PaymentStatus::Pending;
        store.insert_stake(&pending).unwrap();
        let mut failed = stake(pid, 4, StakeSide::Against, "300");
        failed.payment_status = PaymentStatus::Failed;
        store.insert_stake(&failed).unwrap();

        let completed = store.completed_stakes(pid).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].user_id, 2);
    }

    #[test]
    fn test_persist_settlement_is_guarded_and_atomic() {
        let store = Store::open_in_memory().unwrap();
        let pid = store.insert_prediction(&open_prediction(1)).unwrap();

        let events = vec![
            event(1, pid, ReputationOutcome::Win, 70),
            event(2, pid, ReputationOutcome::Win, 70),
        ];
        assert!(store
            .persist_settlement(pid, "110.0", Utc::now(), &events)
            .unwrap());

        let settled = store.get_prediction(pid).unwrap().unwrap();
        assert_eq!(settled.status, PredictionStatus::Settled);
        assert_eq!(settled.settlement_price.as_deref(), Some("110.0"));
        assert!(settled.settlement_timestamp.is_some());

        // Second attempt loses the status guard and writes nothing
        let more = vec![event(3, pid, ReputationOutcome::Loss, -70)];
        assert!(!store
            .persist_settlement(pid, "999.0", Utc::now(), &more)
            .unwrap());
        assert!(store.events_for_user(3, None, None).unwrap().is_empty());
        let unchanged = store.get_prediction(pid).unwrap().unwrap();
        assert_eq!(unchanged.settlement_price.as_deref(), Some("110.0"));
    }

    #[test]
    fn test_reputation_append_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let pid = store.insert_prediction(&open_prediction(1)).unwrap();

        assert!(store
            .append_reputation_event(&event(5, pid, ReputationOutcome::Win, 70))
            .unwrap());
        // Same (user, prediction): no-op, not an error
        assert!(!store
            .append_reputation_event(&event(5, pid, ReputationOutcome::Win, 70))
            .unwrap());

        let events = store.events_for_user(5, None, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta_score, 70);
    }

    #[test]
    fn test_score_rows_filters_and_orders() {
        let store = Store::open_in_memory().unwrap();
        let p1 = store.insert_prediction(&open_prediction(1)).unwrap();
        let p2 = store.insert_prediction(&open_prediction(1)).unwrap();

        store.append_reputation_event(&event(10, p1, ReputationOutcome::Win, 50)).unwrap();
        store.append_reputation_event(&event(10, p2, ReputationOutcome::Loss, -20)).unwrap();
        store.append_reputation_event(&event(11, p1, ReputationOutcome::Win, 80)).unwrap();
        store.append_reputation_event(&event(12, p1, ReputationOutcome::Win, 30)).unwrap();

        let rows = store.score_rows(&EventFilter::default(), 10).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].user_id, 11);
        assert_eq!(rows[0].score, 80);
        assert_eq!(rows[1].user_id, 10);
        assert_eq!(rows[1].score, 30);
        assert_eq!(rows[1].wins, 1);
        assert_eq!(rows[1].losses, 1);

        // Subset filter
        let filter = EventFilter {
            since: None,
            user_ids: Some(vec![10, 12]),
        };
        let rows = store.score_rows(&filter, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.user_id == 10 || r.user_id == 12));

        // Empty subset matches nothing
        let filter = EventFilter {
            since: None,
            user_ids: Some(Vec::new()),
        };
        assert!(store.score_rows(&filter, 10).unwrap().is_empty());

        // A future `since` excludes everything
        let filter = EventFilter {
            since: Some(Utc::now() + Duration::hours(1)),
            user_ids: None,
        };
        assert!(store.score_rows(&filter, 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_expired_open() {
        let store = Store::open_in_memory().unwrap();
        let mut expired = open_prediction(1);
        expired.timeframe_end = Utc::now() - Duration::hours(1);
        let expired_id = store.insert_prediction(&expired).unwrap();
        store.insert_prediction(&open_prediction(1)).unwrap();

        let due = store.list_expired_open(Utc::now(), 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, Some(expired_id));

        // Terminal predictions never show up in the sweep
        store.cancel_prediction(expired_id).unwrap();
        assert!(store.list_expired_open(Utc::now(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_on_disk_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.db");
        let path = path.to_str().unwrap();

        let pid = {
            let store = Store::new(path).unwrap();
            store.insert_prediction(&open_prediction(1)).unwrap()
        };

        let store = Store::new(path).unwrap();
        let loaded = store.get_prediction(pid).unwrap().unwrap();
        assert_eq!(loaded.status, PredictionStatus::Open);
    }

    #[test]
    fn test_cancel_is_guarded() {
        let store = Store::open_in_memory().unwrap();
        let pid = store.insert_prediction(&open_prediction(1)).unwrap();

        assert!(store.cancel_prediction(pid).unwrap());
        // Terminal, no transition out
        assert!(!store.cancel_prediction(pid).unwrap());
        let loaded = store.get_prediction(pid).unwrap().unwrap();
        assert_eq!(loaded.status, PredictionStatus::Cancelled);
    }
}
