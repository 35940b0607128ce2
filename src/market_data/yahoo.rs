// =============================================================================
// Yahoo Chart Client — OHLCV history over HTTP
// =============================================================================
//
// GET {base}/v8/finance/chart/{symbol}?range=5d&interval=15m
//
// The chart payload stores each OHLCV column as a parallel array next to a
// `timestamp` array.  Rows where any column is null (halted / pre-market
// bars) are skipped rather than zero-filled.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Candle, MarketDataSource, Resolution};

#[derive(Clone)]
pub struct YahooChartClient {
    base_url: String,
    client: reqwest::Client,
}

impl YahooChartClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl MarketDataSource for YahooChartClient {
    #[instrument(skip(self), name = "yahoo::fetch_bars")]
    async fn fetch_bars(&self, symbol: &str, resolution: Resolution) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval={}",
            self.base_url,
            symbol,
            resolution.range(),
            resolution.interval()
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET chart for {symbol} failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse chart response for {symbol}"))?;

        if !status.is_success() {
            anyhow::bail!("chart endpoint returned {} for {}: {}", status, symbol, body);
        }

        let bars = parse_chart(&body)?;
        debug!(symbol, %resolution, bars = bars.len(), "chart fetched");
        Ok(bars)
    }
}

/// Parse a chart response into candles, oldest first.
pub fn parse_chart(root: &serde_json::Value) -> Result<Vec<Candle>> {
    let result = root["chart"]["result"]
        .get(0)
        .context("chart response has no result")?;

    let timestamps = result["timestamp"]
        .as_array()
        .context("missing field chart.result[0].timestamp")?;

    let quote = result["indicators"]["quote"]
        .get(0)
        .context("missing field indicators.quote[0]")?;

    let open = quote_column(quote, "open")?;
    let high = quote_column(quote, "high")?;
    let low = quote_column(quote, "low")?;
    let close = quote_column(quote, "close")?;
    let volume = quote_column(quote, "volume")?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let row = (
            ts.as_i64(),
            open.get(i).and_then(|v| v.as_f64()),
            high.get(i).and_then(|v| v.as_f64()),
            low.get(i).and_then(|v| v.as_f64()),
            close.get(i).and_then(|v| v.as_f64()),
            volume.get(i).and_then(|v| v.as_f64()),
        );
        if let (Some(timestamp), Some(open), Some(high), Some(low), Some(close), Some(volume)) = row {
            bars.push(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    bars.sort_by_key(|c| c.timestamp);
    Ok(bars)
}

fn quote_column<'a>(quote: &'a serde_json::Value, name: &str) -> Result<&'a Vec<serde_json::Value>> {
    quote[name]
        .as_array()
        .with_context(|| format!("missing quote column {name}"))
}
