// =============================================================================
// Trending Symbol Discovery
// =============================================================================
//
// Best-effort feed of currently trending symbols.  Callers must tolerate an
// error or an empty list; the watchlist manager owns the fallback policy.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<String>>;
}

/// Yahoo Finance trending endpoint.
pub struct YahooTrending {
    url: String,
    client: reqwest::Client,
}

impl YahooTrending {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build reqwest client");

        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Discovery for YahooTrending {
    #[instrument(skip(self), name = "yahoo::trending")]
    async fn discover(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("GET trending failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse trending response")?;

        if !status.is_success() {
            anyhow::bail!("trending endpoint returned {}: {}", status, body);
        }

        let symbols = parse_trending(&body)?;
        debug!(count = symbols.len(), "trending symbols fetched");
        Ok(symbols)
    }
}

/// Extract `finance.result[0].quotes[*].symbol`.
pub fn parse_trending(root: &serde_json::Value) -> Result<Vec<String>> {
    let quotes = root["finance"]["result"]
        .get(0)
        .and_then(|r| r["quotes"].as_array())
        .context("trending response missing finance.result[0].quotes")?;

    Ok(quotes
        .iter()
        .filter_map(|q| q["symbol"].as_str())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trending_reads_symbols() {
        let json = serde_json::json!({
            "finance": {
                "result": [{
                    "count": 3,
                    "quotes": [
                        { "symbol": "PLTR" },
                        { "symbol": "SOFI" },
                        { "name": "missing symbol" }
                    ]
                }],
                "error": null
            }
        });
        assert_eq!(parse_trending(&json).unwrap(), vec!["PLTR", "SOFI"]);
    }

    #[test]
    fn parse_trending_rejects_bad_shape() {
        assert!(parse_trending(&serde_json::json!({ "finance": { "result": [] } })).is_err());
    }
}
