// =============================================================================
// Central Application State — Arcos engine
// =============================================================================
//
// Read-side state shared with the API.  The decision loop does not live here:
// its watchlist, cooldowns and digest buffer are owned by the loop task and
// never shared.  What the API sees is the ledger (re-queried on every
// request), the latest calibration snapshot and a small error log.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the mutable shared pieces.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::calibration::CalibrationSnapshot;
use crate::ledger::DecisionLedger;
use crate::runtime_config::RuntimeConfig;

/// A recorded error event for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

pub struct AppState {
    /// Incremented on every mutation of shared state.
    pub state_version: AtomicU64,

    pub runtime_config: RuntimeConfig,

    pub ledger: DecisionLedger,

    pub latest_calibration: RwLock<Option<CalibrationSnapshot>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub start_time: std::time::Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub ledger_backend: &'static str,
    pub always_watch: Vec<String>,
    pub calibration_generated_at: Option<String>,
    pub recent_errors: Vec<ErrorRecord>,
}

impl AppState {
    pub fn new(config: RuntimeConfig, ledger: DecisionLedger) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: config,
            ledger,
            latest_calibration: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Record an error.  Oldest entries are evicted past
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    pub fn set_calibration(&self, snapshot: CalibrationSnapshot) {
        *self.latest_calibration.write() = Some(snapshot);
        self.increment_version();
    }

    pub fn calibration(&self) -> Option<CalibrationSnapshot> {
        self.latest_calibration.read().clone()
    }

    pub fn build_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            ledger_backend: self.ledger.backend_type(),
            always_watch: self.runtime_config.always_watch.clone(),
            calibration_generated_at: self
                .latest_calibration
                .read()
                .as_ref()
                .map(|s| s.generated_at.to_rfc3339()),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> AppState {
    use crate::ledger::SqliteLedger;
    use std::sync::Arc;

    let ledger = SqliteLedger::open(dir.join("vault.db")).unwrap();
    AppState::new(RuntimeConfig::default(), DecisionLedger::new(Arc::new(ledger)))
}
