// =============================================================================
// Calibration Monitor — confidence statistics over the whole ledger
// =============================================================================
//
// Recomputed wholesale on every run:
//   per action:  count, mean fused probability
//   drift:       any action whose mean is below DRIFT_FLOOR
//
// Runs as its own task on a fixed interval.  It reads the ledger through the
// same blocking pool as the decision loop but never waits on the loop, and a
// failed run only costs one snapshot.
// =============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::app_state::AppState;
use crate::artifacts::{artifact_stamp, latest_artifact, sha256_file, write_artifact};
use crate::ledger::DecisionLedger;
use crate::types::Action;

/// Mean confidence below this flags an action as drifted.
pub const DRIFT_FLOOR: f64 = 0.5;

const ARTIFACT_CATEGORY: &str = "calibration";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub count: usize,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAlert {
    pub action: Action,
    pub issue: String,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub generated_at: DateTime<Utc>,
    pub total_records: usize,
    pub stats: BTreeMap<Action, ActionStats>,
    pub drifted: Vec<DriftAlert>,
}

impl CalibrationSnapshot {
    pub fn is_drifted(&self, action: Action) -> bool {
        self.drifted.iter().any(|d| d.action == action)
    }
}

/// Aggregate `(action, fused_prob)` rows into a snapshot.
pub fn compute_snapshot(rows: &[(Action, f64)], generated_at: DateTime<Utc>) -> CalibrationSnapshot {
    let mut sums: BTreeMap<Action, (usize, f64)> = BTreeMap::new();
    for (action, prob) in rows {
        let entry = sums.entry(*action).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += prob;
    }

    let stats: BTreeMap<Action, ActionStats> = sums
        .into_iter()
        .map(|(action, (count, sum))| {
            (
                action,
                ActionStats {
                    count,
                    mean_confidence: sum / count as f64,
                },
            )
        })
        .collect();

    let drifted = stats
        .iter()
        .filter(|(_, s)| s.mean_confidence < DRIFT_FLOOR)
        .map(|(action, s)| DriftAlert {
            action: *action,
            issue: "low_confidence".to_string(),
            mean_confidence: s.mean_confidence,
        })
        .collect();

    CalibrationSnapshot {
        generated_at,
        total_records: rows.len(),
        stats,
        drifted,
    }
}

#[derive(Serialize)]
struct DriftArtifact<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    generated_at: DateTime<Utc>,
    alerts: &'a [DriftAlert],
}

pub struct CalibrationMonitor {
    ledger: DecisionLedger,
    workspace: PathBuf,
}

impl CalibrationMonitor {
    pub fn new(ledger: DecisionLedger, workspace: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            workspace: workspace.into(),
        }
    }

    /// Read the full ledger and aggregate it.  A missing store yields an
    /// empty snapshot.
    #[instrument(skip(self), name = "calibration::snapshot")]
    pub async fn snapshot(&self) -> Result<CalibrationSnapshot> {
        let rows = self
            .ledger
            .confidence_rows()
            .await
            .context("failed to read ledger for calibration")?;
        let snapshot = compute_snapshot(&rows, Utc::now());

        for alert in &snapshot.drifted {
            warn!(
                action = %alert.action,
                mean = alert.mean_confidence,
                floor = DRIFT_FLOOR,
                "calibration drift"
            );
        }
        Ok(snapshot)
    }

    /// Write the snapshot and drift list as artifacts.  Returns the path of
    /// the calibration state artifact.
    pub fn write_artifacts(&self, snapshot: &CalibrationSnapshot) -> Result<PathBuf> {
        let stamp = artifact_stamp(snapshot.generated_at);
        let state_path = write_artifact(&self.workspace, ARTIFACT_CATEGORY, "calibration_state", &stamp, snapshot)?;
        write_artifact(
            &self.workspace,
            ARTIFACT_CATEGORY,
            "drift_alerts",
            &stamp,
            &DriftArtifact {
                kind: "DriftAlerts",
                generated_at: snapshot.generated_at,
                alerts: &snapshot.drifted,
            },
        )?;

        let digest = sha256_file(&state_path)?;
        info!(path = %state_path.display(), sha256 = %digest, "calibration artifact written");
        Ok(state_path)
    }

    /// Most recent calibration state artifact on disk, if any.
    pub fn load_latest(&self) -> Result<Option<CalibrationSnapshot>> {
        let Some(path) = latest_artifact(&self.workspace, ARTIFACT_CATEGORY, "calibration_state")? else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Snapshot forever on `interval`, publishing each result to `state`.
    pub async fn run(self, state: Arc<AppState>, interval: Duration) {
        let monitor = Arc::new(self);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match monitor.snapshot().await {
                Ok(snapshot) => {
                    info!(
                        records = snapshot.total_records,
                        drifted = snapshot.drifted.len(),
                        "calibration snapshot"
                    );
                    let writer = Arc::clone(&monitor);
                    let to_write = snapshot.clone();
                    match tokio::task::spawn_blocking(move || writer.write_artifacts(&to_write)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(error = %e, "calibration artifact write failed"),
                        Err(e) => warn!(error = %e, "calibration artifact task failed"),
                    }
                    state.set_calibration(snapshot);
                }
                Err(e) => {
                    warn!(error = %e, "calibration snapshot failed");
                    state.push_error(format!("calibration: {e:#}"));
                }
            }
        }
    }
}
