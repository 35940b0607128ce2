// =============================================================================
// Watchlist Manager — tracked symbol set with periodic rediscovery
// =============================================================================
//
// Refresh policy:
//   - refresh when the list is empty or REFRESH_INTERVAL has elapsed;
//   - discovered symbols are kept only if they are short alphabetic tickers
//     (drops rights / warrants / units such as "ABCDW" suffixes and "X.U");
//   - the always-watch core set is unioned in on every refresh;
//   - on discovery failure the previous list is kept, or the always-watch set
//     when there is no previous list.  The list is never empty afterwards.
//
// Owned exclusively by the decision loop; no locking.
// =============================================================================

use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::discovery::Discovery;

/// Maximum length of a discovered ticker.
const MAX_SYMBOL_LEN: usize = 5;

pub struct WatchlistManager {
    symbols: Vec<String>,
    last_refresh: Option<Instant>,
    refresh_interval: Duration,
    always_watch: Vec<String>,
}

impl WatchlistManager {
    pub fn new(always_watch: Vec<String>, refresh_interval: Duration) -> Self {
        Self {
            symbols: Vec::new(),
            last_refresh: None,
            refresh_interval,
            always_watch,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    pub fn needs_refresh(&self, now: Instant) -> bool {
        match self.last_refresh {
            _ if self.symbols.is_empty() => true,
            None => true,
            Some(at) => now.saturating_duration_since(at) > self.refresh_interval,
        }
    }

    /// Re-query discovery and rebuild the ordered symbol set.
    pub async fn refresh(&mut self, discovery: &dyn Discovery, now: Instant) -> &[String] {
        let mut next: Vec<String> = match discovery.discover().await {
            Ok(found) => {
                let accepted: Vec<String> = found
                    .into_iter()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| is_plain_ticker(s))
                    .collect();
                info!(discovered = ?accepted, "trending symbols accepted");
                accepted
            }
            Err(e) => {
                warn!(error = %e, kept = self.symbols.len(), "discovery failed, keeping previous watchlist");
                self.symbols.clone()
            }
        };

        next.extend(self.always_watch.iter().cloned());
        dedup_in_order(&mut next);

        self.symbols = next;
        self.last_refresh = Some(now);
        info!(count = self.symbols.len(), "watchlist refreshed");
        &self.symbols
    }

    /// Uniform random pick from the current list.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.symbols.choose(rng).map(String::as_str)
    }
}

fn is_plain_ticker(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().all(|c| c.is_ascii_alphabetic())
}

fn dedup_in_order(symbols: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    symbols.retain(|s| seen.insert(s.clone()));
}
