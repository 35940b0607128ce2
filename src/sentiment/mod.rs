// =============================================================================
// Sentiment Module
// =============================================================================
//
// Social sentiment per symbol.  A source never raises: any internal failure
// resolves to a degraded neutral reading (0.0 over 0 samples).

pub mod lexicon;
pub mod reddit;

use async_trait::async_trait;

pub use reddit::RedditSentiment;

use crate::fallback::Fallback;
use crate::types::SentimentReading;

#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn score(&self, symbol: &str) -> Fallback<SentimentReading>;
}

/// Fixed reading, used when sentiment scoring is switched off and in tests.
pub struct StaticSentiment(pub SentimentReading);

#[async_trait]
impl SentimentSource for StaticSentiment {
    async fn score(&self, _symbol: &str) -> Fallback<SentimentReading> {
        Fallback::Fresh(self.0)
    }
}
