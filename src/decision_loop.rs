// =============================================================================
// Decision Loop — one symbol per cycle, forever
// =============================================================================
//
// Cycle:
//   1. Refresh the watchlist when due.
//   2. Draw one symbol uniformly at random.
//   3. Fetch history (intraday -> daily fallback); skip below MIN_HISTORY.
//   4. Score sentiment (neutral on failure).
//   5. Fuse into a DecisionRecord.
//   6. Append to the ledger (bounded retry; a dropped write is reported).
//   7. Route through the alert router; deliver fire-and-forget.
//
// Watchlist, cooldowns, digest buffer and the RNG live in `LoopState`, owned
// by this task alone.  A failed cycle is logged, the loop pauses briefly and
// carries on; nothing here ends the process.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, field, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::alerts::{dispatch, AlertRouter, AlertSink};
use crate::discovery::Discovery;
use crate::ledger::{AppendOutcome, DecisionLedger};
use crate::market_data::{fetch_history, MarketDataSource};
use crate::runtime_config::RuntimeConfig;
use crate::sentiment::SentimentSource;
use crate::signals::fusion::MIN_HISTORY;
use crate::signals::FusionEngine;
use crate::types::Action;
use crate::watchlist::WatchlistManager;

/// External services the loop talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn Discovery>,
    pub market_data: Arc<dyn MarketDataSource>,
    pub sentiment: Arc<dyn SentimentSource>,
    pub sink: Arc<dyn AlertSink>,
}

/// Mutable state owned by the loop.
pub struct LoopState {
    pub watchlist: WatchlistManager,
    pub router: AlertRouter,
    rng: StdRng,
}

impl LoopState {
    /// `seed` drives symbol selection and message ids.
    pub fn new(always_watch: Vec<String>, refresh_interval: Duration, seed: u64, now: Instant) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let router_rng = StdRng::seed_from_u64(rng.gen());
        Self {
            watchlist: WatchlistManager::new(always_watch, refresh_interval),
            router: AlertRouter::new(now, router_rng),
            rng,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Watchlist empty; nothing to evaluate.
    Idle,
    /// Not enough history for the drawn symbol.
    Skipped { symbol: String, bars: usize },
    Evaluated {
        symbol: String,
        action: Action,
        ledger: AppendOutcome,
        alerts: usize,
    },
}

pub struct DecisionLoop {
    collaborators: Collaborators,
    engine: FusionEngine,
    ledger: DecisionLedger,
    state: LoopState,
    cycle_delay: Duration,
    error_pause: Duration,
}

impl DecisionLoop {
    pub fn new(
        config: &RuntimeConfig,
        collaborators: Collaborators,
        ledger: DecisionLedger,
        state: LoopState,
    ) -> Self {
        Self {
            collaborators,
            engine: FusionEngine::new(config.model.clone()),
            ledger,
            state,
            cycle_delay: Duration::from_secs(config.cycle_delay_secs),
            error_pause: Duration::from_secs(config.error_pause_secs),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run one evaluation cycle at monotonic time `now`.
    pub async fn run_cycle(&mut self, now: Instant) -> Result<CycleOutcome> {
        let span = info_span!("cycle", cycle_id = %Uuid::new_v4(), symbol = field::Empty);
        self.cycle_inner(now, span.clone()).instrument(span).await
    }

    async fn cycle_inner(&mut self, now: Instant, span: tracing::Span) -> Result<CycleOutcome> {
        if self.state.watchlist.needs_refresh(now) {
            self.state
                .watchlist
                .refresh(self.collaborators.discovery.as_ref(), now)
                .await;
        }

        let Some(symbol) = self
            .state
            .watchlist
            .pick(&mut self.state.rng)
            .map(str::to_string)
        else {
            warn!("watchlist is empty, nothing to evaluate");
            return Ok(CycleOutcome::Idle);
        };
        span.record("symbol", field::display(&symbol));

        let bars = fetch_history(self.collaborators.market_data.as_ref(), &symbol)
            .await
            .into_value();
        if bars.len() < MIN_HISTORY {
            info!(bars = bars.len(), "insufficient history, skipping");
            return Ok(CycleOutcome::Skipped {
                symbol,
                bars: bars.len(),
            });
        }

        let sentiment = self.collaborators.sentiment.score(&symbol).await;
        if let Some(reason) = sentiment.reason() {
            warn!(reason, "sentiment degraded, using neutral reading");
        }
        let sentiment = sentiment.into_value();

        let Some(mut record) = self.engine.evaluate(&symbol, &bars, &sentiment)? else {
            return Ok(CycleOutcome::Skipped {
                symbol,
                bars: bars.len(),
            });
        };

        let ledger = self.ledger.append(&record).await;
        record.id = ledger.id();

        info!(
            action = %record.action,
            prob = record.fused_prob,
            pct = record.percent_change,
            sentiment = record.sentiment_score,
            id = ?record.id,
            "decision"
        );

        let messages = self.state.router.process(&record, now);
        let alerts = messages.len();
        for message in messages {
            dispatch(Arc::clone(&self.collaborators.sink), message);
        }

        Ok(CycleOutcome::Evaluated {
            symbol,
            action: record.action,
            ledger,
            alerts,
        })
    }

    /// Evaluate forever.  Never returns.
    pub async fn run(mut self) {
        info!(
            cycle_delay_secs = self.cycle_delay.as_secs(),
            ledger = self.ledger.backend_type(),
            "decision loop starting"
        );
        loop {
            match self.run_cycle(Instant::now()).await {
                Ok(_) => tokio::time::sleep(self.cycle_delay).await,
                Err(e) => {
                    error!(error = %e, "cycle failed, pausing");
                    tokio::time::sleep(self.error_pause).await;
                }
            }
        }
    }
}
