// =============================================================================
// SQLite ledger backend
// =============================================================================
//
// One connection per operation: the ledger file is shared with other
// processes (calibration jobs, dashboards), so nothing holds a lock between
// calls.  WAL mode lets readers proceed while a writer is active.  The busy
// timeout is kept short so contention surfaces as `LedgerError::Contention`
// and the retry policy in `DecisionLedger` stays in charge of waiting.
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use tracing::{info, warn};

use super::{LedgerBackend, LedgerError};
use crate::decision_record::DecisionRecord;
use crate::types::Action;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Columns added on top of the base `signals` layout other writers create.
/// Missing ones are added on open so a shared store keeps accepting rows.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("percent_change", "REAL NOT NULL DEFAULT 0"),
    ("sample_size", "INTEGER NOT NULL DEFAULT 0"),
];

/// Naive timestamp layouts written by other processes, read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

const SELECT_COLUMNS: &str = "id, timestamp, ticker, signal, price_close, percent_change, \
     sentiment_score, raw_ml_prob, final_prob, sample_size, rationale";

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                LedgerError::Contention(err.to_string())
            }
            _ => LedgerError::Storage(err.to_string()),
        }
    }
}

pub struct SqliteLedger {
    path: PathBuf,
}

impl SqliteLedger {
    /// Create the file, parent directory and schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::Storage(format!(
                    "failed to create ledger directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let ledger = Self { path };
        let conn = ledger.connect()?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                ticker TEXT NOT NULL,
                signal TEXT NOT NULL,
                price_close REAL NOT NULL,
                percent_change REAL NOT NULL DEFAULT 0,
                sentiment_score REAL NOT NULL,
                raw_ml_prob REAL NOT NULL,
                final_prob REAL NOT NULL,
                sample_size INTEGER NOT NULL DEFAULT 0,
                rationale TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_ticker ON signals(ticker, id DESC);",
        )?;
        add_missing_columns(&conn)?;

        info!(path = %ledger.path.display(), "SQLite ledger initialized with WAL mode");
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, LedgerError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Read-only connection, or `None` when the file does not exist.
    fn connect_read_only(&self) -> Result<Option<Connection>, LedgerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Some(conn))
    }
}

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn add_missing_columns(conn: &Connection) -> Result<(), LedgerError> {
    let existing = {
        let mut stmt = conn.prepare("PRAGMA table_info(signals)")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names.collect::<rusqlite::Result<Vec<_>>>()?
    };

    for (column, decl) in ADDED_COLUMNS {
        if existing.iter().any(|c| c == column) {
            continue;
        }
        conn.execute_batch(&format!("ALTER TABLE signals ADD COLUMN {column} {decl}"))?;
        info!(column, "added missing ledger column");
    }
    Ok(())
}

fn parse_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(stamp) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(stamp, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Collect decoded rows, skipping ones another writer left in a shape we
/// cannot read.  Anything other than a decode failure still aborts.
fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, LedgerError> {
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(value) => out.push(value),
            Err(
                e @ (rusqlite::Error::FromSqlConversionFailure(..)
                | rusqlite::Error::InvalidColumnType(..)),
            ) => warn!(error = %e, "skipping unreadable ledger row"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DecisionRecord> {
    let stamp: String = row.get(1)?;
    let recorded_at = parse_timestamp(&stamp)
        .ok_or_else(|| conversion_error(1, format!("unrecognised timestamp {stamp:?}")))?;
    let action: String = row.get(3)?;
    let action = action.parse::<Action>().map_err(|e| conversion_error(3, e))?;

    Ok(DecisionRecord {
        id: Some(row.get(0)?),
        recorded_at,
        symbol: row.get(2)?,
        close_price: row.get(4)?,
        percent_change: row.get(5)?,
        sentiment_score: row.get(6)?,
        price_prob: row.get(7)?,
        fused_prob: row.get(8)?,
        action,
        sample_size: row.get(9)?,
        rationale: row.get(10)?,
    })
}

impl LedgerBackend for SqliteLedger {
    fn insert(&self, record: &DecisionRecord) -> Result<i64, LedgerError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO signals
             (timestamp, ticker, signal, price_close, percent_change, sentiment_score,
              raw_ml_prob, final_prob, sample_size, rationale)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.recorded_at.to_rfc3339(),
                record.symbol,
                record.action.as_str(),
                record.close_price,
                record.percent_change,
                record.sentiment_score,
                record.price_prob,
                record.fused_prob,
                record.sample_size,
                record.rationale,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<DecisionRecord>, LedgerError> {
        let Some(conn) = self.connect_read_only()? else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = match symbol {
            Some(sym) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM signals WHERE ticker = ?1 ORDER BY id DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![sym, limit], record_from_row)?;
                collect_rows(rows)?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM signals ORDER BY id DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], record_from_row)?;
                collect_rows(rows)?
            }
        };
        Ok(rows)
    }

    fn confidence_rows(&self) -> Result<Vec<(Action, f64)>, LedgerError> {
        let Some(conn) = self.connect_read_only()? else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare("SELECT signal, final_prob FROM signals")?;
        let rows = stmt.query_map([], |row| {
            let action: String = row.get(0)?;
            let action = action.parse::<Action>().map_err(|e| conversion_error(0, e))?;
            Ok((action, row.get::<_, f64>(1)?))
        })?;
        collect_rows(rows)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
