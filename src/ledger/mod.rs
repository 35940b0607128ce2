// =============================================================================
// Decision Ledger — append-only store with bounded write retry
// =============================================================================
//
// Contract:
//   append(record) -> AppendOutcome   (Written { id, attempts } | Dropped)
//   read(symbol?, limit) -> Vec<DecisionRecord>, newest first
//
// Writes retry only on contention (another process holds the lock), at most
// MAX_ATTEMPTS times with a fixed backoff.  After the last attempt the record
// is dropped and reported; nothing here is escalated past the caller.
//
// Reads never fail: a missing store or a storage error yields an empty list.
//
// The backend is synchronous.  Every call runs on the blocking pool so a
// locked database cannot stall the runtime threads.
// =============================================================================

pub mod sqlite;

pub use sqlite::SqliteLedger;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::decision_record::DecisionRecord;
use crate::types::Action;

/// Write attempts before a record is dropped.
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed pause between write attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    /// Store is locked by another writer; worth retrying.
    #[error("ledger contention: {0}")]
    Contention(String),

    #[error("ledger storage error: {0}")]
    Storage(String),

    /// The blocking task panicked or was cancelled.
    #[error("ledger task failed: {0}")]
    Join(String),
}

impl LedgerError {
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

/// Storage behind the ledger.  Implementations block.
pub trait LedgerBackend: Send + Sync {
    /// Insert one record and return its assigned id.
    fn insert(&self, record: &DecisionRecord) -> Result<i64, LedgerError>;

    /// Newest-first records, optionally for a single symbol.
    fn query(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<DecisionRecord>, LedgerError>;

    /// `(action, fused_prob)` for every stored record.
    fn confidence_rows(&self) -> Result<Vec<(Action, f64)>, LedgerError>;

    fn backend_type(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Written { id: i64, attempts: u32 },
    Dropped { attempts: u32, reason: String },
}

impl AppendOutcome {
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Written { id, .. } => Some(*id),
            Self::Dropped { .. } => None,
        }
    }
}

/// Cheap to clone; all clones share the backend.
#[derive(Clone)]
pub struct DecisionLedger {
    backend: Arc<dyn LedgerBackend>,
    backoff: Duration,
}

impl DecisionLedger {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self {
            backend,
            backoff: RETRY_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LedgerBackend) -> Result<T, LedgerError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || op(backend.as_ref()))
            .await
            .map_err(|e| LedgerError::Join(e.to_string()))?
    }

    /// Append a record, retrying on contention.
    pub async fn append(&self, record: &DecisionRecord) -> AppendOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let rec = record.clone();
            match self.run_blocking(move |b| b.insert(&rec)).await {
                Ok(id) => {
                    debug!(id, attempts = attempt, symbol = %record.symbol, "decision appended");
                    return AppendOutcome::Written { id, attempts: attempt };
                }
                Err(e) if e.is_contention() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        attempt,
                        max = MAX_ATTEMPTS,
                        symbol = %record.symbol,
                        error = %e,
                        "ledger busy, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    warn!(
                        attempts = attempt,
                        symbol = %record.symbol,
                        error = %e,
                        "decision dropped"
                    );
                    return AppendOutcome::Dropped {
                        attempts: attempt,
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    /// Newest-first records.  Errors are logged and read as empty.
    pub async fn read(&self, symbol: Option<&str>, limit: usize) -> Vec<DecisionRecord> {
        let symbol = symbol.map(str::to_string);
        match self
            .run_blocking(move |b| b.query(symbol.as_deref(), limit))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "ledger read failed, returning empty history");
                Vec::new()
            }
        }
    }

    pub async fn confidence_rows(&self) -> Result<Vec<(Action, f64)>, LedgerError> {
        self.run_blocking(|b| b.confidence_rows()).await
    }

    pub fn backend_type(&self) -> &'static str {
        self.backend.backend_type()
    }
}
