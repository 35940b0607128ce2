// =============================================================================
// Signal Fusion Engine — price model + sentiment -> action
// =============================================================================
//
// Pipeline per symbol:
//   1. Skip when fewer than MIN_HISTORY bars are available (not an error).
//   2. Percent change of the latest close (0.0 when it cannot be computed).
//   3. Retrain the price model on the trailing window; on failure use the
//      neutral prior 0.5.
//   4. fused = price_prob + sentiment * SENTIMENT_WEIGHT
//   5. Classify with fixed, asymmetric thresholds.
//   6. Build the rationale text.
// =============================================================================

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use super::model::predict_up_probability;
use crate::decision_record::DecisionRecord;
use crate::fallback::Fallback;
use crate::market_data::{percent_change, Candle};
use crate::runtime_config::ModelParams;
use crate::types::{Action, SentimentReading};

/// Minimum bars required to evaluate a symbol.
pub const MIN_HISTORY: usize = 20;

/// Sentiment moves the probability by at most this much either way.
pub const SENTIMENT_WEIGHT: f64 = 0.20;

pub const BUY_THRESHOLD: f64 = 0.70;
pub const SELL_THRESHOLD: f64 = 0.30;

/// |percent change| above this adds a volatility note to the rationale.
pub const VOLATILITY_NOTE_PCT: f64 = 2.0;

/// Prior used when the model cannot be trained.
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// Map a fused probability onto an action.
pub fn classify(fused_prob: f64) -> Action {
    if fused_prob >= BUY_THRESHOLD {
        Action::BuyCandidate
    } else if fused_prob <= SELL_THRESHOLD {
        Action::SellAvoid
    } else {
        Action::Wait
    }
}

pub fn build_rationale(
    price_prob: &Fallback<f64>,
    sentiment: f64,
    fused_prob: f64,
    percent_change: f64,
) -> String {
    let mut text = format!(
        "Model predicted {:.2}. Sentiment ({:.2}) adjusted it to {:.2}.",
        price_prob.value(),
        sentiment,
        fused_prob,
    );
    if price_prob.is_degraded() {
        text.push_str(" [MODEL FALLBACK]");
    }
    if percent_change.abs() > VOLATILITY_NOTE_PCT {
        text.push_str(&format!(" [VOLATILITY: {percent_change:+.2}%]"));
    }
    text
}

pub struct FusionEngine {
    params: ModelParams,
}

impl FusionEngine {
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }

    /// Evaluate one symbol.  `Ok(None)` means not enough history this cycle.
    ///
    /// Errors only on malformed input (non-finite or non-positive latest
    /// close), which aborts the current cycle.
    pub fn evaluate(
        &self,
        symbol: &str,
        bars: &[Candle],
        sentiment: &SentimentReading,
    ) -> Result<Option<DecisionRecord>> {
        if bars.len() < MIN_HISTORY {
            debug!(symbol, bars = bars.len(), "insufficient history, skipping");
            return Ok(None);
        }

        let close_price = bars[bars.len() - 1].close;
        if !close_price.is_finite() || close_price <= 0.0 {
            anyhow::bail!("invalid latest close for {symbol}: {close_price}");
        }

        let pct = percent_change(bars);
        let price_prob = Fallback::from_result(
            predict_up_probability(bars, &self.params),
            NEUTRAL_PRIOR,
            "price_model",
        );

        let fused_prob = price_prob.value() + sentiment.score * SENTIMENT_WEIGHT;
        let action = classify(fused_prob);
        let rationale = build_rationale(&price_prob, sentiment.score, fused_prob, pct);

        Ok(Some(DecisionRecord {
            id: None,
            recorded_at: Utc::now(),
            symbol: symbol.to_string(),
            close_price,
            percent_change: pct,
            sentiment_score: sentiment.score,
            price_prob: *price_prob.value(),
            fused_prob,
            action,
            sample_size: bars.len() as u32,
            rationale,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::synthetic_series;

    fn engine() -> FusionEngine {
        FusionEngine::new(ModelParams::default())
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 200.0 + (i as f64 * 0.45).sin() * 4.0)
            .collect()
    }

    #[test]
    fn classification_boundaries() {
        let cases = [
            (0.299, Action::SellAvoid),
            (0.30, Action::SellAvoid),
            (0.301, Action::Wait),
            (0.699, Action::Wait),
            (0.70, Action::BuyCandidate),
            (0.701, Action::BuyCandidate),
        ];
        for (p, expected) in cases {
            assert_eq!(classify(p), expected, "fused = {p}");
        }
        assert_eq!(classify(1.15), Action::BuyCandidate);
        assert_eq!(classify(-0.2), Action::SellAvoid);
    }

    #[test]
    fn rationale_mentions_sentiment_once() {
        let text = build_rationale(&Fallback::Fresh(0.62), 0.4, 0.70, 0.5);
        assert_eq!(text, "Model predicted 0.62. Sentiment (0.40) adjusted it to 0.70.");
        assert_eq!(text.matches("0.40").count(), 1);
    }

    #[test]
    fn short_history_is_skipped() {
        let bars = synthetic_series(&wavy(19));
        let out = engine().evaluate("NVDA", &bars, &SentimentReading::neutral()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn identical_inputs_yield_identical_records() {
        let bars = synthetic_series(&wavy(90));
        let sentiment = SentimentReading::new(0.35, 5);
        let a = engine().evaluate("TSLA", &bars, &sentiment).unwrap().unwrap();
        let b = engine().evaluate("TSLA", &bars, &sentiment).unwrap().unwrap();
        assert_eq!(a.without_timing(), b.without_timing());
    }

    #[test]
    fn sentiment_shifts_by_at_most_twenty_points() {
        let bars = synthetic_series(&wavy(90));
        let neutral = engine().evaluate("AMD", &bars, &SentimentReading::neutral()).unwrap().unwrap();
        let bullish = engine().evaluate("AMD", &bars, &SentimentReading::new(1.0, 5)).unwrap().unwrap();
        let bearish = engine().evaluate("AMD", &bars, &SentimentReading::new(-1.0, 5)).unwrap().unwrap();

        assert!((bullish.fused_prob - neutral.fused_prob - 0.20).abs() < 1e-12);
        assert!((neutral.fused_prob - bearish.fused_prob - 0.20).abs() < 1e-12);
        assert_eq!(neutral.price_prob, bullish.price_prob);
        assert_eq!(bullish.action, classify(bullish.fused_prob));
    }

    #[test]
    fn model_failure_falls_back_to_neutral_prior() {
        // 20 bars -> 16 feature rows; a 12-row lookback leaves 4 samples.
        let bars = synthetic_series(&wavy(20));
        let params = ModelParams {
            lookback: 12,
            ..ModelParams::default()
        };
        let rec = FusionEngine::new(params)
            .evaluate("GME", &bars, &SentimentReading::new(0.5, 3))
            .unwrap()
            .unwrap();
        assert_eq!(rec.price_prob, NEUTRAL_PRIOR);
        assert!((rec.fused_prob - 0.6).abs() < 1e-12);
        assert_eq!(rec.action, Action::Wait);
        assert!(rec.rationale.contains("[MODEL FALLBACK]"));
        assert_eq!(rec.sample_size, 20);
    }

    #[test]
    fn large_move_adds_volatility_note() {
        let mut closes = wavy(40);
        closes.push(closes[closes.len() - 1] * 0.969);
        let bars = synthetic_series(&closes);
        let rec = engine().evaluate("SPY", &bars, &SentimentReading::neutral()).unwrap().unwrap();
        assert!((rec.percent_change - (-3.1)).abs() < 1e-9);
        assert!(rec.rationale.ends_with("[VOLATILITY: -3.10%]"), "{}", rec.rationale);
    }

    #[test]
    fn small_move_has_no_volatility_note() {
        let bars = synthetic_series(&wavy(40));
        let rec = engine().evaluate("SPY", &bars, &SentimentReading::neutral()).unwrap().unwrap();
        assert!(rec.percent_change.abs() <= 2.0);
        assert!(!rec.rationale.contains("VOLATILITY"));
    }

    #[test]
    fn non_positive_close_aborts_cycle() {
        let mut closes = wavy(30);
        closes.push(0.0);
        let bars = synthetic_series(&closes);
        assert!(engine().evaluate("BAD", &bars, &SentimentReading::neutral()).is_err());
    }
}
