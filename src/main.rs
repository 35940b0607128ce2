// =============================================================================
// Arcos Sentinel — Main Entry Point
// =============================================================================
//
// Three independent tasks:
//   - decision loop        (one symbol per cycle, ledger + alerts)
//   - calibration monitor  (periodic statistics over the ledger)
//   - API server           (liveness + read-only views)
// The process runs until Ctrl-C.
//
// `arcos-sentinel backtest SYMBOL...` instead replays the price model over
// each symbol's intraday history, writes a report artifact and exits.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod api;
mod app_state;
mod artifacts;
mod backtest;
mod calibration;
mod decision_loop;
mod decision_record;
mod discovery;
mod fallback;
mod ledger;
mod market_data;
mod runtime_config;
mod sentiment;
mod signals;
mod types;
mod watchlist;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::{AlertSink, FanoutSink, OutboxSink, WebhookSink};
use crate::app_state::AppState;
use crate::artifacts::{artifact_stamp, write_artifact};
use crate::calibration::CalibrationMonitor;
use crate::decision_loop::{Collaborators, DecisionLoop, LoopState};
use crate::discovery::YahooTrending;
use crate::ledger::{DecisionLedger, SqliteLedger};
use crate::market_data::{MarketDataSource, Resolution, YahooChartClient};
use crate::runtime_config::RuntimeConfig;
use crate::sentiment::RedditSentiment;

const CONFIG_PATH: &str = "arcos_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Arcos Sentinel — Starting Up                      ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();

    info!(
        workspace = %config.workspace_root.display(),
        db_path = %config.db_path.display(),
        always_watch = ?config.always_watch,
        webhook = config.webhook_url.is_some(),
        "Configuration resolved"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("backtest") {
        return run_backtests(&config, &args[1..]).await;
    }

    // ── 2. Ledger & shared state ─────────────────────────────────────────
    let sqlite = SqliteLedger::open(&config.db_path)
        .with_context(|| format!("failed to open ledger at {}", config.db_path.display()))?;
    let ledger = DecisionLedger::new(Arc::new(sqlite));
    let state = Arc::new(AppState::new(config.clone(), ledger.clone()));

    // ── 3. API server ────────────────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = api::rest::serve(&bind_addr, api_state).await {
            error!(error = %e, "API server stopped");
        }
    });

    // ── 4. Calibration monitor ───────────────────────────────────────────
    let monitor = CalibrationMonitor::new(ledger.clone(), config.workspace_root.clone());
    match monitor.load_latest() {
        Ok(Some(previous)) => {
            info!(generated_at = %previous.generated_at, "Restored last calibration snapshot");
            state.set_calibration(previous);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not restore calibration snapshot"),
    }
    let calib_state = state.clone();
    let calib_interval = Duration::from_secs(config.calibration_interval_secs.max(1));
    tokio::spawn(monitor.run(calib_state, calib_interval));

    // ── 5. Collaborators ─────────────────────────────────────────────────
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(OutboxSink::new(config.outbox_dir()))];
    if let Some(url) = &config.webhook_url {
        sinks.push(Arc::new(WebhookSink::new(url.clone(), config.webhook_secret.clone())));
    }
    let llm = config
        .enable_llm_sentiment
        .then(|| (config.llm_url.clone(), config.llm_model.clone()));

    let collaborators = Collaborators {
        discovery: Arc::new(YahooTrending::new(config.discovery_url.clone())),
        market_data: Arc::new(YahooChartClient::new(config.market_data_url.clone())),
        sentiment: Arc::new(RedditSentiment::new(llm)),
        sink: Arc::new(FanoutSink::new(sinks)),
    };

    // ── 6. Decision loop ─────────────────────────────────────────────────
    let seed: u64 = rand::random();
    info!(seed, "Decision loop seeded");
    let loop_state = LoopState::new(
        config.always_watch.clone(),
        Duration::from_secs(config.watchlist_refresh_secs),
        seed,
        Instant::now(),
    );
    let decision_loop = DecisionLoop::new(&config, collaborators, ledger, loop_state);
    tokio::spawn(decision_loop.run());

    // ── 7. Wait for shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received, exiting");
    Ok(())
}

/// Backtest each symbol on intraday bars and write one report artifact per
/// symbol under `<workspace>/backtests`.
async fn run_backtests(config: &RuntimeConfig, symbols: &[String]) -> anyhow::Result<()> {
    if symbols.is_empty() {
        anyhow::bail!("usage: arcos-sentinel backtest SYMBOL...");
    }
    let client = YahooChartClient::new(config.market_data_url.clone());
    let stamp = artifact_stamp(chrono::Utc::now());

    for symbol in symbols {
        let symbol = symbol.trim().to_uppercase();
        let bars = client
            .fetch_bars(&symbol, Resolution::Intraday)
            .await
            .with_context(|| format!("failed to fetch history for {symbol}"))?;
        let report = backtest::walk_forward(&symbol, &bars, &config.model)?;

        info!(
            symbol = %report.symbol,
            final_value = %format!("{:.2}", report.final_value),
            buy_and_hold = %format!("{:.2}", report.buy_and_hold_value),
            beats_market = report.beats_buy_and_hold(),
            "backtest report"
        );
        let path = write_artifact(
            &config.workspace_root,
            "backtests",
            &format!("backtest_{symbol}"),
            &stamp,
            &report,
        )?;
        info!(path = %path.display(), "backtest artifact written");
    }
    Ok(())
}
