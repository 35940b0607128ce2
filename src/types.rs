// =============================================================================
// Shared types used across the Arcos decision engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Discrete recommendation produced for every evaluated symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "WAIT")]
    Wait,
    #[serde(rename = "BUY_CANDIDATE")]
    BuyCandidate,
    #[serde(rename = "SELL_AVOID")]
    SellAvoid,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "WAIT",
            Self::BuyCandidate => "BUY_CANDIDATE",
            Self::SellAvoid => "SELL_AVOID",
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::Wait
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAIT" => Ok(Self::Wait),
            "BUY_CANDIDATE" => Ok(Self::BuyCandidate),
            "SELL_AVOID" => Ok(Self::SellAvoid),
            other => anyhow::bail!("unknown action '{other}'"),
        }
    }
}

/// Direction of a large price move that qualifies for an immediate alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanicKind {
    Crash,
    Moon,
}

impl PanicKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Crash => "CRASH",
            Self::Moon => "MOON",
        }
    }
}

impl std::fmt::Display for PanicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Social sentiment for one symbol: a score in [-1, 1] and the number of
/// posts it was averaged over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub score: f64,
    pub sample_count: u32,
}

impl SentimentReading {
    pub fn new(score: f64, sample_count: u32) -> Self {
        let score = if score.is_finite() { score.clamp(-1.0, 1.0) } else { 0.0 };
        Self {
            score,
            sample_count,
        }
    }

    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            sample_count: 0,
        }
    }
}

impl Default for SentimentReading {
    fn default() -> Self {
        Self::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_names_roundtrip() {
        for action in [Action::Wait, Action::BuyCandidate, Action::SellAvoid] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            let parsed: Action = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
        assert!("HOLD".parse::<Action>().is_err());
    }

    #[test]
    fn sentiment_reading_is_clamped() {
        assert_eq!(SentimentReading::new(3.0, 4).score, 1.0);
        assert_eq!(SentimentReading::new(-1.5, 4).score, -1.0);
        assert_eq!(SentimentReading::new(f64::NAN, 2).score, 0.0);
    }
}
