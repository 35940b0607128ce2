// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Arcos engine.  Paths, collaborator
// endpoints, pacing and model tunables live here.  Decision thresholds,
// alert timings and the ledger retry bound are fixed constants in their own
// modules and are intentionally not configurable.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_always_watch() -> Vec<String> {
    ["SPY", "QQQ", "BTC-USD", "ETH-USD", "NVDA", "TSLA", "AMD", "GME"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("workspace/arcos_vault.db")
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_discovery_url() -> String {
    "https://query2.finance.yahoo.com/v1/finance/trending/US".to_string()
}

fn default_market_data_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_llm_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}

fn default_watchlist_refresh_secs() -> u64 {
    1800
}

fn default_cycle_delay_secs() -> u64 {
    3
}

fn default_error_pause_secs() -> u64 {
    1
}

fn default_calibration_interval_secs() -> u64 {
    300
}

fn default_model_seed() -> u64 {
    42
}

fn default_training_window() -> usize {
    100
}

fn default_lookback() -> usize {
    5
}

fn default_epochs() -> usize {
    200
}

fn default_learning_rate() -> f64 {
    0.5
}

// =============================================================================
// ModelParams
// =============================================================================

/// Tunables for the per-cycle probability model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Seed for the initial weights.  Same seed + same window => same output.
    #[serde(default = "default_model_seed")]
    pub seed: u64,

    /// Number of trailing bars the model is retrained on each cycle.
    #[serde(default = "default_training_window")]
    pub training_window: usize,

    /// Bars per training sample.
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            seed: default_model_seed(),
            training_window: default_training_window(),
            lookback: default_lookback(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Arcos engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Storage ------------------------------------------------------------

    /// Root for artifacts and the alert outbox.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// SQLite decision ledger.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    // --- Liveness / API ------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // --- Watchlist -----------------------------------------------------------

    /// Symbols tracked regardless of what discovery returns.  Also the
    /// fallback set when discovery fails on the very first refresh.
    #[serde(default = "default_always_watch")]
    pub always_watch: Vec<String>,

    #[serde(default = "default_watchlist_refresh_secs")]
    pub watchlist_refresh_secs: u64,

    // --- Collaborators -------------------------------------------------------

    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    #[serde(default = "default_market_data_url")]
    pub market_data_url: String,

    /// Score post titles with a local LLM before falling back to the lexicon.
    #[serde(default = "default_true")]
    pub enable_llm_sentiment: bool,

    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Optional push endpoint; alerts always land in the outbox regardless.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// HMAC key used to sign webhook payloads.
    #[serde(default, skip_serializing)]
    pub webhook_secret: Option<String>,

    // --- Pacing --------------------------------------------------------------

    #[serde(default = "default_cycle_delay_secs")]
    pub cycle_delay_secs: u64,

    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,

    #[serde(default = "default_calibration_interval_secs")]
    pub calibration_interval_secs: u64,

    // --- Model ---------------------------------------------------------------

    #[serde(default)]
    pub model: ModelParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            always_watch: default_always_watch(),
            watchlist_refresh_secs: default_watchlist_refresh_secs(),
            discovery_url: default_discovery_url(),
            market_data_url: default_market_data_url(),
            enable_llm_sentiment: true,
            llm_url: default_llm_url(),
            llm_model: default_llm_model(),
            webhook_url: None,
            webhook_secret: None,
            cycle_delay_secs: default_cycle_delay_secs(),
            error_pause_secs: default_error_pause_secs(),
            calibration_interval_secs: default_calibration_interval_secs(),
            model: ModelParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            db_path = %config.db_path.display(),
            always_watch = ?config.always_watch,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply environment overrides on top of the file/default values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ARCOS_WORKSPACE") {
            self.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("ARCOS_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ARCOS_BIND_ADDR") {
            self.bind_addr = v;
        } else if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(v) = lookup("ARCOS_SYMBOLS") {
            let symbols: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                self.always_watch = symbols;
            }
        }
        if let Some(v) = lookup("ARCOS_WEBHOOK_URL").filter(|v| !v.is_empty()) {
            self.webhook_url = Some(v);
        }
        if let Some(v) = lookup("ARCOS_WEBHOOK_SECRET").filter(|v| !v.is_empty()) {
            self.webhook_secret = Some(v);
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.llm_url = v;
        }
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.workspace_root.join("outbox")
    }
}
