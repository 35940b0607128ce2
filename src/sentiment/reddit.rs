// =============================================================================
// Reddit Sentiment — subreddit search + LLM / lexicon headline scoring
// =============================================================================
//
// 1. Search the symbol's home subreddit (JSON listing, newest first).
// 2. Take the first MAX_TITLES post titles.
// 3. Score each title with the local LLM endpoint when enabled; any LLM
//    failure drops to the offline lexicon for that title.
// 4. Reading = mean title score, sample count = titles scored.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{lexicon, SentimentSource};
use crate::fallback::Fallback;
use crate::types::SentimentReading;

/// Titles scored per symbol.  LLM calls are slow; more adds little.
const MAX_TITLES: usize = 5;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
];

/// Symbol -> (subreddit, search query).
const SUBREDDITS: &[(&str, &str, &str)] = &[
    ("AAPL", "stocks", "AAPL"),
    ("TSLA", "wallstreetbets", "TSLA"),
    ("NVDA", "investing", "NVDA"),
    ("GME", "Superstonk", "GME"),
    ("BTC-USD", "Bitcoin", "Bitcoin"),
    ("SPY", "stocks", "SPY"),
];

/// Search URL for `symbol`; unknown symbols search r/stocks.
pub fn search_url(symbol: &str) -> String {
    let (sub, query) = SUBREDDITS
        .iter()
        .find(|(s, _, _)| *s == symbol)
        .map(|(_, sub, q)| (*sub, *q))
        .unwrap_or(("stocks", symbol));
    format!("https://www.reddit.com/r/{sub}/search.json?q={query}&sort=new&restrict_sr=1")
}

/// Post titles from a listing, in listing order, empty titles dropped.
pub fn extract_titles(listing: &serde_json::Value, max: usize) -> Vec<String> {
    listing["data"]["children"]
        .as_array()
        .map(|posts| {
            posts
                .iter()
                .filter_map(|p| p["data"]["title"].as_str())
                .filter(|t| !t.trim().is_empty())
                .take(max)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Interpret an LLM reply.  The model is asked for a bare number; anything
/// else counts as neutral.
pub fn parse_llm_score(reply: &str) -> f64 {
    match reply.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.clamp(-1.0, 1.0),
        _ => 0.0,
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

pub struct RedditSentiment {
    client: reqwest::Client,
    llm: Option<LlmEndpoint>,
}

struct LlmEndpoint {
    url: String,
    model: String,
}

impl RedditSentiment {
    pub fn new(llm_url: Option<(String, String)>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            llm: llm_url.map(|(url, model)| LlmEndpoint { url, model }),
        }
    }

    async fn try_score(&self, symbol: &str) -> Result<SentimentReading> {
        let url = search_url(symbol);
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let resp = self
            .client
            .get(&url)
            .header("User-Agent", user_agent)
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .with_context(|| format!("reddit search for {symbol} failed"))?;

        if !resp.status().is_success() {
            anyhow::bail!("reddit search returned {}", resp.status());
        }

        let listing: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse reddit listing")?;

        let titles = extract_titles(&listing, MAX_TITLES);
        if titles.is_empty() {
            return Ok(SentimentReading::neutral());
        }

        let mut scores = Vec::with_capacity(titles.len());
        let mut llm_used = false;
        for title in &titles {
            let score = match self.score_with_llm(title).await {
                Some(s) => {
                    llm_used = true;
                    s
                }
                None => lexicon::score_text(title),
            };
            scores.push(score);
        }

        debug!(
            symbol,
            top_title = %titles[0].chars().take(50).collect::<String>(),
            scorer = if llm_used { "llm" } else { "lexicon" },
            "headlines scored"
        );

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        Ok(SentimentReading::new(mean, scores.len() as u32))
    }

    /// `None` when the LLM is disabled or unreachable.
    async fn score_with_llm(&self, title: &str) -> Option<f64> {
        let llm = self.llm.as_ref()?;
        let request = GenerateRequest {
            model: &llm.model,
            prompt: format!(
                "Analyze the sentiment of this stock market headline: \"{title}\"\n\
                 Reply with ONLY a number between -1.0 (Bearish/Negative) and 1.0 (Bullish/Positive).\n\
                 0.0 is neutral. Do not write any words, just the number."
            ),
            stream: false,
        };

        let resp = self.client.post(&llm.url).json(&request).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: serde_json::Value = resp.json().await.ok()?;
        Some(parse_llm_score(body["response"].as_str().unwrap_or_default()))
    }
}

#[async_trait]
impl SentimentSource for RedditSentiment {
    #[instrument(skip(self), name = "reddit::score")]
    async fn score(&self, symbol: &str) -> Fallback<SentimentReading> {
        let result = self.try_score(symbol).await;
        Fallback::from_result(result, SentimentReading::neutral(), "sentiment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_symbols_use_their_subreddit() {
        assert!(search_url("GME").contains("/r/Superstonk/search.json?q=GME"));
        assert!(search_url("BTC-USD").contains("/r/Bitcoin/search.json?q=Bitcoin"));
    }

    #[test]
    fn unknown_symbols_search_stocks() {
        assert_eq!(
            search_url("PLTR"),
            "https://www.reddit.com/r/stocks/search.json?q=PLTR&sort=new&restrict_sr=1"
        );
    }

    #[test]
    fn extract_titles_caps_and_skips_blank() {
        let listing = serde_json::json!({
            "data": { "children": [
                { "data": { "title": "NVDA rally continues" } },
                { "data": { "title": "   " } },
                { "data": { "selftext": "no title here" } },
                { "data": { "title": "Is this the top?" } },
                { "data": { "title": "third" } }
            ]}
        });
        let titles = extract_titles(&listing, 2);
        assert_eq!(titles, vec!["NVDA rally continues", "Is this the top?"]);
        assert!(extract_titles(&serde_json::json!({}), 5).is_empty());
    }

    #[test]
    fn llm_reply_parsing() {
        assert_eq!(parse_llm_score(" 0.6\n"), 0.6);
        assert_eq!(parse_llm_score("-4"), -1.0);
        assert_eq!(parse_llm_score("I think it's bullish"), 0.0);
        assert_eq!(parse_llm_score("NaN"), 0.0);
    }
}
