// =============================================================================
// Alert Router — panic channel + digest channel
// =============================================================================
//
// Runs once per evaluated record, after the record is in the ledger.
//
// Panic channel:
//   |percent_change| > 3.0 and the symbol's last panic alert is older than
//   600 s (or absent)  =>  one immediate URGENT_CRASH / URGENT_MOON message,
//   cooldown for the symbol moves to `now`.
//
// Digest channel:
//   BUY_CANDIDATE not claimed by the panic channel  =>  buffered entry.
//   Every cycle: more than 3600 s since the last flush and at least one
//   entry  =>  one briefing message, buffer cleared, timer reset.
//
// The two channels are exclusive per evaluation.  State is owned by the
// decision loop; times are monotonic `Instant`s supplied by the caller.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use tracing::info;

use super::message::{new_message_id, MessageBody, MessageHeader, MessageKind, OutboundMessage, SIGNATURE};
use crate::decision_record::DecisionRecord;
use crate::types::{Action, PanicKind};

/// Percent move (either direction) that qualifies for an immediate alert.
pub const PANIC_MOVE_PCT: f64 = 3.0;

/// Minimum time between two panic alerts for the same symbol.
pub const PANIC_COOLDOWN: Duration = Duration::from_secs(600);

/// Time between digest flushes.
pub const DIGEST_INTERVAL: Duration = Duration::from_secs(3600);

/// Entries required before a digest is sent.
pub const MIN_DIGEST_ENTRIES: usize = 1;

const PANIC_SENDER: &str = "HUNTER_KILLER_URGENT";
const DIGEST_SENDER: &str = "ARCOS_BRIEFING";
const DIGEST_SYMBOL: &str = "MARKET_BRIEF";
const RULE: &str = "--------------------------------";

pub fn panic_kind(percent_change: f64) -> Option<PanicKind> {
    if percent_change < -PANIC_MOVE_PCT {
        Some(PanicKind::Crash)
    } else if percent_change > PANIC_MOVE_PCT {
        Some(PanicKind::Moon)
    } else {
        None
    }
}

// =============================================================================
// CooldownState
// =============================================================================

/// Last panic alert per symbol.  Entries are only ever overwritten.
#[derive(Debug, Default)]
pub struct CooldownState {
    last_panic: HashMap<String, Instant>,
}

impl CooldownState {
    pub fn last_panic(&self, symbol: &str) -> Option<Instant> {
        self.last_panic.get(symbol).copied()
    }

    pub fn ready(&self, symbol: &str, now: Instant) -> bool {
        self.last_panic(symbol)
            .map_or(true, |at| now.saturating_duration_since(at) > PANIC_COOLDOWN)
    }

    fn arm(&mut self, symbol: &str, now: Instant) {
        self.last_panic.insert(symbol.to_string(), now);
    }
}

// =============================================================================
// DigestBuffer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DigestEntry {
    pub symbol: String,
    pub action: Action,
    pub probability: f64,
    pub percent_change: f64,
    pub sentiment_note: String,
}

impl DigestEntry {
    fn from_record(record: &DecisionRecord) -> Self {
        Self {
            symbol: record.symbol.clone(),
            action: record.action,
            probability: record.fused_prob,
            percent_change: record.percent_change,
            sentiment_note: format!("Sent:{:.2}", record.sentiment_score),
        }
    }
}

#[derive(Debug)]
pub struct DigestBuffer {
    entries: Vec<DigestEntry>,
    last_flush: Instant,
}

impl DigestBuffer {
    pub fn new(now: Instant) -> Self {
        Self {
            entries: Vec::new(),
            last_flush: now,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DigestEntry] {
        &self.entries
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) > DIGEST_INTERVAL
            && self.entries.len() >= MIN_DIGEST_ENTRIES
    }

    fn drain(&mut self, now: Instant) -> Vec<DigestEntry> {
        self.last_flush = now;
        std::mem::take(&mut self.entries)
    }
}

/// Plain-text briefing, one line per buffered entry.
pub fn format_briefing(entries: &[DigestEntry]) -> String {
    let mut lines = vec!["ARCOS NEURAL BRIEFING".to_string(), RULE.to_string()];
    for e in entries {
        let label = match e.action {
            Action::BuyCandidate => "BUY",
            other => other.as_str(),
        };
        lines.push(format!(
            "• {:<5} {} ({:.2}) | {:+.1}% | {}",
            e.symbol, label, e.probability, e.percent_change, e.sentiment_note
        ));
    }
    lines.push(RULE.to_string());
    lines.push(format!("Active Targets: {}", entries.len()));
    lines.join("\n")
}

// =============================================================================
// AlertRouter
// =============================================================================

pub struct AlertRouter {
    cooldowns: CooldownState,
    digest: DigestBuffer,
    rng: StdRng,
}

impl AlertRouter {
    /// `now` starts the first digest interval.  `rng` draws message ids.
    pub fn new(now: Instant, rng: StdRng) -> Self {
        Self {
            cooldowns: CooldownState::default(),
            digest: DigestBuffer::new(now),
            rng,
        }
    }

    pub fn cooldowns(&self) -> &CooldownState {
        &self.cooldowns
    }

    pub fn digest(&self) -> &DigestBuffer {
        &self.digest
    }

    /// Route one record.  Returns zero, one or two messages to deliver.
    pub fn process(&mut self, record: &DecisionRecord, now: Instant) -> Vec<OutboundMessage> {
        let mut out = Vec::new();

        let panic = panic_kind(record.percent_change)
            .filter(|_| self.cooldowns.ready(&record.symbol, now));

        if let Some(kind) = panic {
            info!(
                symbol = %record.symbol,
                kind = %kind,
                pct = record.percent_change,
                "panic alert"
            );
            out.push(self.panic_message(record, kind));
            self.cooldowns.arm(&record.symbol, now);
        } else if record.action == Action::BuyCandidate {
            self.digest.entries.push(DigestEntry::from_record(record));
            info!(
                symbol = %record.symbol,
                prob = record.fused_prob,
                pending = self.digest.len(),
                "buy candidate added to digest"
            );
        }

        if self.digest.due(now) {
            let entries = self.digest.drain(now);
            info!(entries = entries.len(), "flushing digest");
            out.push(self.digest_message(&entries));
        }

        out
    }

    fn panic_message(&mut self, record: &DecisionRecord, kind: PanicKind) -> OutboundMessage {
        OutboundMessage {
            header: MessageHeader {
                message_id: new_message_id(MessageKind::Signal, &mut self.rng),
                sender: PANIC_SENDER.to_string(),
                timestamp: Utc::now(),
            },
            body: MessageBody {
                symbol: record.symbol.clone(),
                signal: format!("URGENT_{}", kind.tag()),
                probability: record.fused_prob,
                win_rate: 0.0,
                uncertainty: 0.0,
                sample_size: record.sample_size,
                rationale: format!("IMMEDIATE VOLATILITY: {:+.2}%", record.percent_change),
                signature: SIGNATURE.to_string(),
                tags: vec!["panic".to_string(), kind.tag().to_lowercase()],
            },
        }
    }

    fn digest_message(&mut self, entries: &[DigestEntry]) -> OutboundMessage {
        OutboundMessage {
            header: MessageHeader {
                message_id: new_message_id(MessageKind::Report, &mut self.rng),
                sender: DIGEST_SENDER.to_string(),
                timestamp: Utc::now(),
            },
            body: MessageBody {
                symbol: DIGEST_SYMBOL.to_string(),
                signal: "INFO".to_string(),
                probability: 1.0,
                win_rate: 0.0,
                uncertainty: 0.0,
                sample_size: entries.len() as u32,
                rationale: format_briefing(entries),
                signature: SIGNATURE.to_string(),
                tags: vec!["digest".to_string()],
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_record::sample_record;
    use rand::SeedableRng;

    fn router(now: Instant) -> AlertRouter {
        AlertRouter::new(now, StdRng::seed_from_u64(11))
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn panic_thresholds_are_strict() {
        assert_eq!(panic_kind(-3.0), None);
        assert_eq!(panic_kind(3.0), None);
        assert_eq!(panic_kind(-3.01), Some(PanicKind::Crash));
        assert_eq!(panic_kind(3.01), Some(PanicKind::Moon));
    }

    #[test]
    fn crash_fires_once_within_cooldown() {
        let t0 = Instant::now();
        let mut r = router(t0);
        let rec = sample_record("SPY", Action::Wait, 0.48, -3.1);

        let first = r.process(&rec, t0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].body.signal, "URGENT_CRASH");
        assert_eq!(first[0].body.rationale, "IMMEDIATE VOLATILITY: -3.10%");
        assert_eq!(first[0].body.tags, vec!["panic", "crash"]);
        assert!(first[0].message_id().starts_with("SIG-"));
        assert_eq!(r.cooldowns().last_panic("SPY"), Some(t0));

        assert!(r.process(&rec, t0 + secs(10)).is_empty());
        assert_eq!(r.cooldowns().last_panic("SPY"), Some(t0));

        assert!(r.process(&rec, t0 + secs(600)).is_empty());

        let again = r.process(&rec, t0 + secs(601));
        assert_eq!(again.len(), 1);
        assert_eq!(r.cooldowns().last_panic("SPY"), Some(t0 + secs(601)));
    }

    #[test]
    fn cooldown_is_per_symbol() {
        let t0 = Instant::now();
        let mut r = router(t0);
        r.process(&sample_record("GME", Action::Wait, 0.5, 7.5), t0);

        let other = r.process(&sample_record("AMD", Action::Wait, 0.5, 4.2), t0 + secs(5));
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].body.signal, "URGENT_MOON");
        assert_eq!(other[0].body.tags, vec!["panic", "moon"]);
    }

    #[test]
    fn buy_candidate_is_buffered_without_flush() {
        let t0 = Instant::now();
        let mut r = router(t0);

        let out = r.process(&sample_record("NVDA", Action::BuyCandidate, 0.85, 1.2), t0 + secs(30));
        assert!(out.is_empty());
        assert_eq!(r.digest().len(), 1);
        assert_eq!(r.digest().entries()[0].probability, 0.85);
        assert_eq!(r.digest().last_flush(), t0);
    }

    #[test]
    fn panic_cycle_does_not_enqueue_digest() {
        let t0 = Instant::now();
        let mut r = router(t0);

        let out = r.process(&sample_record("TSLA", Action::BuyCandidate, 0.9, 5.0), t0);
        assert_eq!(out.len(), 1);
        assert!(r.digest().is_empty());

        // In cooldown the panic channel does not claim the cycle.
        let out = r.process(&sample_record("TSLA", Action::BuyCandidate, 0.9, 5.0), t0 + secs(20));
        assert!(out.is_empty());
        assert_eq!(r.digest().len(), 1);
    }

    #[test]
    fn digest_flushes_after_interval() {
        let t0 = Instant::now();
        let mut r = router(t0);
        r.process(&sample_record("NVDA", Action::BuyCandidate, 0.85, 1.2), t0 + secs(10));
        r.process(&sample_record("AMD", Action::BuyCandidate, 0.74, -0.4), t0 + secs(20));

        assert!(r.process(&sample_record("SPY", Action::Wait, 0.5, 0.0), t0 + secs(3600)).is_empty());

        let flush_at = t0 + secs(3601);
        let out = r.process(&sample_record("SPY", Action::Wait, 0.5, 0.0), flush_at);
        assert_eq!(out.len(), 1);
        let digest = &out[0];
        assert!(digest.is_digest());
        assert_eq!(digest.header.sender, "ARCOS_BRIEFING");
        assert_eq!(digest.body.symbol, "MARKET_BRIEF");
        assert_eq!(digest.body.signal, "INFO");
        assert_eq!(digest.body.sample_size, 2);
        assert!(digest.body.rationale.contains("• NVDA  BUY (0.85) | +1.2% | Sent:0.00"));
        assert!(digest.body.rationale.ends_with("Active Targets: 2"));

        assert!(r.digest().is_empty());
        assert_eq!(r.digest().last_flush(), flush_at);
    }

    #[test]
    fn empty_buffer_never_flushes() {
        let t0 = Instant::now();
        let mut r = router(t0);
        assert!(r.process(&sample_record("SPY", Action::Wait, 0.5, 0.0), t0 + secs(7200)).is_empty());
        assert_eq!(r.digest().last_flush(), t0);

        // Timer already elapsed: the first entry goes out in the same cycle.
        let out = r.process(&sample_record("NVDA", Action::BuyCandidate, 0.8, 0.5), t0 + secs(7300));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_digest());
        assert_eq!(out[0].body.sample_size, 1);
    }

    #[test]
    fn panic_and_digest_can_share_a_cycle() {
        let t0 = Instant::now();
        let mut r = router(t0);
        r.process(&sample_record("NVDA", Action::BuyCandidate, 0.8, 0.5), t0 + secs(1));

        let out = r.process(&sample_record("GME", Action::SellAvoid, 0.2, -8.0), t0 + secs(3700));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].body.signal, "URGENT_CRASH");
        assert!(out[1].is_digest());
    }
}
