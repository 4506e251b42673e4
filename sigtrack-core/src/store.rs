//! SQLite-backed signal store.
//!
//! Two tables: `signals` is append-only (no uniqueness constraint, repeated
//! emissions for the same ticker and day are expected) and `outcomes` holds at
//! most one row per signal, written by idempotent upsert.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Outcome, ResolvedSignal, Signal, SignalId, SignalState};
use crate::ingest::{
    coerce_score, map_row_fields, normalize_scan_type, normalize_ticker, parse_price,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL,
        scan_type TEXT NOT NULL,
        signal_date TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        price_at_signal REAL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_signals_signal_date ON signals(signal_date);
    CREATE INDEX IF NOT EXISTS idx_signals_scan_type ON signals(scan_type);

    CREATE TABLE IF NOT EXISTS outcomes (
        signal_id INTEGER PRIMARY KEY REFERENCES signals(id),
        price_t1 REAL,
        price_t3 REAL,
        price_t5 REAL,
        price_t10 REAL,
        pct_t1 REAL,
        pct_t3 REAL,
        pct_t5 REAL,
        pct_t10 REAL,
        updated_at TEXT NOT NULL
    );
";

const SIGNAL_COLUMNS: &str =
    "s.id, s.ticker, s.scan_type, s.signal_date, s.score, s.price_at_signal, s.created_at";

const OUTCOME_COLUMNS: &str = "o.signal_id, o.price_t1, o.price_t3, o.price_t5, o.price_t10, \
     o.pct_t1, o.pct_t3, o.pct_t5, o.pct_t10, o.updated_at";

/// Number of columns produced by `SIGNAL_COLUMNS`.
const SIGNAL_WIDTH: usize = 7;

fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<Signal> {
    Ok(Signal {
        id: SignalId(row.get(0)?),
        ticker: row.get(1)?,
        scan_type: row.get(2)?,
        signal_date: row.get(3)?,
        score: row.get(4)?,
        price_at_signal: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn outcome_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Outcome> {
    Ok(Outcome {
        signal_id: SignalId(row.get(offset)?),
        price_t1: row.get(offset + 1)?,
        price_t3: row.get(offset + 2)?,
        price_t5: row.get(offset + 3)?,
        price_t10: row.get(offset + 4)?,
        pct_t1: row.get(offset + 5)?,
        pct_t3: row.get(offset + 6)?,
        pct_t5: row.get(offset + 7)?,
        pct_t10: row.get(offset + 8)?,
        updated_at: row.get(offset + 9)?,
    })
}

fn resolved_from_row(row: &Row<'_>) -> rusqlite::Result<ResolvedSignal> {
    Ok(ResolvedSignal {
        signal: signal_from_row(row)?,
        outcome: outcome_from_row(row, SIGNAL_WIDTH)?,
    })
}

/// Durable record of emitted signals and their resolved outcomes.
pub struct SignalStore {
    conn: Connection,
}

impl SignalStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // journal_mode answers with the resulting mode, so it has to be read back
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.display(), "opened signal store");
        Self::with_connection(conn)
    }

    /// A throwaway store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Producer API ─────────────────────────────────────────────────

    /// Record a signal dated today.
    ///
    /// See [`SignalStore::record_signal_on`].
    pub fn record_signal(
        &self,
        ticker: &str,
        scan_type: &str,
        score: impl Into<Value>,
        price_at_signal: impl Into<Value>,
    ) -> Result<Option<SignalId>, StoreError> {
        self.record_signal_on(
            Local::now().date_naive(),
            ticker,
            scan_type,
            score,
            price_at_signal,
        )
    }

    /// Record a signal for an explicit date.
    ///
    /// The score is coerced to an integer (0 when non-numeric) and the price
    /// may be a number or a currency-formatted string; an unparsable price is
    /// stored as null. Returns `Ok(None)` without writing when the ticker is
    /// blank.
    pub fn record_signal_on(
        &self,
        signal_date: NaiveDate,
        ticker: &str,
        scan_type: &str,
        score: impl Into<Value>,
        price_at_signal: impl Into<Value>,
    ) -> Result<Option<SignalId>, StoreError> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            warn!(scan_type, "ignoring signal with blank ticker");
            return Ok(None);
        }
        let id = self.insert_signal(
            &ticker,
            &normalize_scan_type(scan_type),
            signal_date,
            coerce_score(&score.into()),
            parse_price(&price_at_signal.into()),
        )?;
        Ok(Some(id))
    }

    /// Record a batch of loosely typed rows under one scan type.
    ///
    /// Each row is a JSON object; key casing is resolved by
    /// [`map_row_fields`]. Rows that are not objects or carry no ticker are
    /// skipped. A row's own `date` field wins over `default_date`. Returns the
    /// number of signals written.
    pub fn record_signals_batch(
        &self,
        rows: &[Value],
        scan_type: &str,
    ) -> Result<usize, StoreError> {
        self.record_signals_batch_on(Local::now().date_naive(), rows, scan_type)
    }

    /// [`SignalStore::record_signals_batch`] with an explicit default date.
    pub fn record_signals_batch_on(
        &self,
        default_date: NaiveDate,
        rows: &[Value],
        scan_type: &str,
    ) -> Result<usize, StoreError> {
        let scan_type = normalize_scan_type(scan_type);
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;

        for (idx, row) in rows.iter().enumerate() {
            let Some(fields) = map_row_fields(row) else {
                warn!(row = idx, scan_type = %scan_type, "skipping non-object row");
                continue;
            };
            let Some(ticker) = fields.ticker else {
                warn!(row = idx, scan_type = %scan_type, "skipping row without ticker");
                continue;
            };
            self.insert_signal(
                &ticker,
                &scan_type,
                fields.signal_date.unwrap_or(default_date),
                coerce_score(&fields.score),
                parse_price(&fields.price),
            )?;
            written += 1;
        }

        tx.commit()?;
        info!(
            scan_type = %scan_type,
            written,
            skipped = rows.len() - written,
            "recorded signal batch"
        );
        Ok(written)
    }

    fn insert_signal(
        &self,
        ticker: &str,
        scan_type: &str,
        signal_date: NaiveDate,
        score: i64,
        price_at_signal: Option<f64>,
    ) -> Result<SignalId, StoreError> {
        self.conn.execute(
            "INSERT INTO signals (ticker, scan_type, signal_date, score, price_at_signal, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![ticker, scan_type, signal_date, score, price_at_signal, now_utc()],
        )?;
        Ok(SignalId(self.conn.last_insert_rowid()))
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn signal(&self, id: SignalId) -> Result<Option<Signal>, StoreError> {
        let sql = format!("SELECT {SIGNAL_COLUMNS} FROM signals s WHERE s.id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.0], signal_from_row)
            .optional()?)
    }

    /// All signals in id order.
    pub fn signals(&self) -> Result<Vec<Signal>, StoreError> {
        let sql = format!("SELECT {SIGNAL_COLUMNS} FROM signals s ORDER BY s.id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], signal_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn signal_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM signals", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn outcome_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outcomes", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn outcome(&self, id: SignalId) -> Result<Option<Outcome>, StoreError> {
        let sql = format!("SELECT {OUTCOME_COLUMNS} FROM outcomes o WHERE o.signal_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.0], |row| outcome_from_row(row, 0))
            .optional()?)
    }

    /// All outcome rows in signal id order.
    pub fn outcomes(&self) -> Result<Vec<Outcome>, StoreError> {
        let sql = format!("SELECT {OUTCOME_COLUMNS} FROM outcomes o ORDER BY o.signal_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| outcome_from_row(row, 0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Signals dated on or before `cutoff` that have no outcome yet, oldest id first.
    pub fn due_signals(&self, cutoff: NaiveDate) -> Result<Vec<Signal>, StoreError> {
        let sql = format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals s
             LEFT JOIN outcomes o ON o.signal_id = s.id
             WHERE o.signal_id IS NULL AND s.signal_date <= ?1
             ORDER BY s.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![cutoff], signal_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Lifecycle state of a signal as of `today`.
    pub fn signal_state(
        &self,
        id: SignalId,
        today: NaiveDate,
        due_after_days: i64,
    ) -> Result<Option<SignalState>, StoreError> {
        let Some(signal) = self.signal(id)? else {
            return Ok(None);
        };
        if self.outcome(id)?.is_some() {
            return Ok(Some(SignalState::Resolved));
        }
        let cutoff = today - chrono::Duration::days(due_after_days);
        Ok(Some(if signal.signal_date <= cutoff {
            SignalState::Due
        } else {
            SignalState::Pending
        }))
    }

    /// Resolved signals for one scan type, in id order.
    pub fn resolved_for_scan_type(
        &self,
        scan_type: &str,
    ) -> Result<Vec<ResolvedSignal>, StoreError> {
        self.resolved_for_scan_types(&[scan_type.to_string()])
    }

    /// Resolved signals whose scan type is one of `scan_types`, in id order.
    pub fn resolved_for_scan_types(
        &self,
        scan_types: &[String],
    ) -> Result<Vec<ResolvedSignal>, StoreError> {
        if scan_types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; scan_types.len()].join(", ");
        let sql = format!(
            "SELECT {SIGNAL_COLUMNS}, {OUTCOME_COLUMNS} FROM signals s
             JOIN outcomes o ON o.signal_id = s.id
             WHERE s.scan_type IN ({placeholders})
             ORDER BY s.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(scan_types.iter().map(|s| normalize_scan_type(s))),
            resolved_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Distinct scan types that have at least one signal, sorted.
    pub fn scan_types(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT scan_type FROM signals ORDER BY scan_type")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Outcome writes ───────────────────────────────────────────────

    /// Insert or replace the outcome for a signal.
    ///
    /// The write is guarded in SQL: nothing is written unless the referenced
    /// signal exists with a positive `price_at_signal`. Returns whether a row
    /// was written.
    pub fn upsert_outcome(&self, outcome: &Outcome) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "INSERT INTO outcomes (signal_id, price_t1, price_t3, price_t5, price_t10,
                                   pct_t1, pct_t3, pct_t5, pct_t10, updated_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
             FROM signals WHERE id = ?1 AND price_at_signal > 0
             ON CONFLICT(signal_id) DO UPDATE SET
                price_t1 = excluded.price_t1,
                price_t3 = excluded.price_t3,
                price_t5 = excluded.price_t5,
                price_t10 = excluded.price_t10,
                pct_t1 = excluded.pct_t1,
                pct_t3 = excluded.pct_t3,
                pct_t5 = excluded.pct_t5,
                pct_t10 = excluded.pct_t10,
                updated_at = excluded.updated_at",
            params![
                outcome.signal_id.0,
                outcome.price_t1,
                outcome.price_t3,
                outcome.price_t5,
                outcome.price_t10,
                outcome.pct_t1,
                outcome.pct_t3,
                outcome.pct_t5,
                outcome.pct_t10,
                outcome.updated_at,
            ],
        )?;
        if changed == 0 {
            debug!(signal_id = %outcome.signal_id, "outcome write refused: degenerate entry price");
        }
        Ok(changed > 0)
    }

    /// Raw access for callers that need ad-hoc reporting queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Current UTC time, truncated to whole microseconds so that values round-trip
/// through SQLite text columns unchanged.
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}
