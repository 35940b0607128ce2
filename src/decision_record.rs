// =============================================================================
// Decision Record — auditable record of every evaluated symbol
// =============================================================================
//
// One record per evaluation cycle.  The record is appended to the decision
// ledger before the alert router sees it, so a failed alert delivery never
// loses the decision.
//
// `action` is a pure function of `fused_prob` (see `signals::fusion::classify`).
// `id` is assigned by the ledger and is the canonical ordering key.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Action;

/// Complete auditable record of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Ledger row id.  `None` until the record has been appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Wall-clock time of the evaluation.
    pub recorded_at: DateTime<Utc>,

    pub symbol: String,

    /// Latest close of the evaluated series.
    pub close_price: f64,

    /// Percent change of the latest close against the prior close.
    pub percent_change: f64,

    /// Sentiment input in [-1, 1].
    pub sentiment_score: f64,

    /// Raw output of the price model in [0, 1].
    pub price_prob: f64,

    /// Price probability plus sentiment adjustment.  Not clamped.
    pub fused_prob: f64,

    pub action: Action,

    /// Number of bars the evaluation was based on.
    pub sample_size: u32,

    /// Human-readable explanation.  Stored raw; escaped when rendered into
    /// an outbound message.
    pub rationale: String,
}

impl DecisionRecord {
    /// Copy of the record with the timestamp and ledger id cleared, used to
    /// compare two evaluations of the same inputs.
    pub fn without_timing(&self) -> Self {
        Self {
            id: None,
            recorded_at: DateTime::<Utc>::default(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(symbol: &str, action: Action, fused_prob: f64, percent_change: f64) -> DecisionRecord {
    DecisionRecord {
        id: None,
        recorded_at: Utc::now(),
        symbol: symbol.to_string(),
        close_price: 100.0,
        percent_change,
        sentiment_score: 0.0,
        price_prob: fused_prob,
        fused_prob,
        action,
        sample_size: 60,
        rationale: format!("Model predicted {fused_prob:.2}."),
    }
}
