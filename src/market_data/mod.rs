// =============================================================================
// Market Data Module
// =============================================================================
//
// OHLCV history for one symbol at a time.  The decision loop asks for
// intraday bars first and falls back to daily bars when the intraday series
// is unavailable or too short to train on.

pub mod candle;
pub mod yahoo;

use async_trait::async_trait;
use tracing::{debug, warn};

pub use candle::{percent_change, Candle, Resolution};
pub use yahoo::YahooChartClient;

use crate::fallback::Fallback;

/// Intraday series with this many bars or fewer trigger the daily fallback.
pub const MIN_INTRADAY_BARS: usize = 20;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch bars for `symbol`, oldest first.
    async fn fetch_bars(&self, symbol: &str, resolution: Resolution) -> anyhow::Result<Vec<Candle>>;
}

/// Fetch history with the intraday -> daily fallback.
///
/// Never fails: when both resolutions error the result is an empty series
/// marked as degraded.
pub async fn fetch_history(source: &dyn MarketDataSource, symbol: &str) -> Fallback<Vec<Candle>> {
    match source.fetch_bars(symbol, Resolution::Intraday).await {
        Ok(bars) if bars.len() > MIN_INTRADAY_BARS => return Fallback::Fresh(bars),
        Ok(bars) => {
            debug!(symbol, bars = bars.len(), "intraday series too short, trying daily");
        }
        Err(e) => {
            warn!(symbol, error = %e, "intraday fetch failed, trying daily");
        }
    }

    let daily = source.fetch_bars(symbol, Resolution::Daily).await;
    Fallback::from_result(daily, Vec::new(), "market_data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::synthetic_series;
    use parking_lot::Mutex;

    struct ScriptedSource {
        intraday: anyhow::Result<Vec<Candle>>,
        daily: anyhow::Result<Vec<Candle>>,
        calls: Mutex<Vec<Resolution>>,
    }

    impl ScriptedSource {
        fn new(intraday: anyhow::Result<Vec<Candle>>, daily: anyhow::Result<Vec<Candle>>) -> Self {
            Self {
                intraday,
                daily,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MarketDataSource for ScriptedSource {
        async fn fetch_bars(&self, _symbol: &str, resolution: Resolution) -> anyhow::Result<Vec<Candle>> {
            self.calls.lock().push(resolution);
            let scripted = match resolution {
                Resolution::Intraday => &self.intraday,
                Resolution::Daily => &self.daily,
            };
            match scripted {
                Ok(bars) => Ok(bars.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[tokio::test]
    async fn long_intraday_series_is_used_directly() {
        let source = ScriptedSource::new(Ok(synthetic_series(&closes(40))), Ok(Vec::new()));
        let history = fetch_history(&source, "NVDA").await;
        assert!(!history.is_degraded());
        assert_eq!(history.value().len(), 40);
        assert_eq!(*source.calls.lock(), vec![Resolution::Intraday]);
    }

    #[tokio::test]
    async fn short_intraday_series_falls_back_to_daily() {
        let source = ScriptedSource::new(
            Ok(synthetic_series(&closes(20))),
            Ok(synthetic_series(&closes(22))),
        );
        let history = fetch_history(&source, "BTC-USD").await;
        assert_eq!(history.value().len(), 22);
        assert_eq!(
            *source.calls.lock(),
            vec![Resolution::Intraday, Resolution::Daily]
        );
    }

    #[tokio::test]
    async fn both_failures_degrade_to_empty() {
        let source = ScriptedSource::new(Err(anyhow::anyhow!("timeout")), Err(anyhow::anyhow!("503")));
        let history = fetch_history(&source, "SPY").await;
        assert!(history.is_degraded());
        assert!(history.value().is_empty());
    }
}
