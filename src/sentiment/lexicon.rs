// =============================================================================
// Lexicon Sentiment Scorer — offline headline scoring
// =============================================================================
//
// Sums per-word valences over a headline, flips the sign of a word preceded
// by a negator ("not", "no", "never") and normalises the raw sum into [-1, 1]
// with the compound formula:
//
//   compound = s / sqrt(s^2 + ALPHA)
//
// Hard risk flags (fraud, investigation, ...) carry a heavy negative valence
// so a single one dominates an otherwise upbeat headline.
// =============================================================================

/// Normalisation constant for the compound score.
const ALPHA: f64 = 15.0;

const NEGATORS: &[&str] = &["not", "no", "never", "without", "isn't", "wasn't", "don't", "won't"];

const HARD_FLAGS: &[(&str, f64)] = &[
    ("fraud", -3.5),
    ("investigation", -3.0),
    ("regulatory", -2.0),
    ("layoffs", -2.5),
    ("bankruptcy", -3.5),
    ("lawsuit", -2.5),
];

const VALENCES: &[(&str, f64)] = &[
    ("beat", 2.0),
    ("beats", 2.0),
    ("bull", 2.0),
    ("bullish", 2.5),
    ("breakout", 2.0),
    ("buy", 1.5),
    ("calls", 1.0),
    ("gain", 1.8),
    ("gains", 1.8),
    ("growth", 1.6),
    ("moon", 2.5),
    ("outperform", 2.0),
    ("profit", 1.8),
    ("rally", 2.2),
    ("record", 1.5),
    ("soar", 2.5),
    ("soars", 2.5),
    ("strong", 1.6),
    ("surge", 2.3),
    ("surges", 2.3),
    ("upgrade", 2.0),
    ("win", 1.5),
    ("bear", -2.0),
    ("bearish", -2.5),
    ("crash", -3.0),
    ("dump", -2.5),
    ("downgrade", -2.0),
    ("drop", -1.8),
    ("drops", -1.8),
    ("fall", -1.6),
    ("falls", -1.6),
    ("loss", -2.0),
    ("losses", -2.0),
    ("miss", -1.8),
    ("misses", -1.8),
    ("plunge", -2.8),
    ("plunges", -2.8),
    ("puts", -1.0),
    ("sell", -1.5),
    ("selloff", -2.5),
    ("short", -1.2),
    ("slump", -2.2),
    ("weak", -1.6),
];

fn valence(token: &str) -> Option<f64> {
    HARD_FLAGS
        .iter()
        .chain(VALENCES.iter())
        .find(|(word, _)| *word == token)
        .map(|(_, v)| *v)
}

/// Score a single headline into [-1, 1].  Headlines with no known words
/// score 0.0.
pub fn score_text(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .collect();

    let mut sum = 0.0;
    for (i, token) in tokens.iter().enumerate() {
        let Some(v) = valence(token) else { continue };
        let negated = i > 0 && NEGATORS.iter().any(|n| *n == tokens[i - 1]);
        sum += if negated { -v * 0.74 } else { v };
    }

    // Multi-word phrases are matched on the lowered text directly.
    if lowered.contains("guidance cut") {
        sum += -2.5;
    }

    if sum == 0.0 {
        return 0.0;
    }
    (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Hard risk flags present in `text`, in lexicon order.
pub fn hard_flags(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    HARD_FLAGS
        .iter()
        .map(|(flag, _)| *flag)
        .filter(|flag| lowered.contains(flag))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullish_headline_is_positive() {
        let s = score_text("NVDA soars to record on strong earnings beat");
        assert!(s > 0.5, "score was {s}");
        assert!(s <= 1.0);
    }

    #[test]
    fn bearish_headline_is_negative() {
        let s = score_text("TSLA plunges after weak deliveries, analysts downgrade");
        assert!(s < -0.5, "score was {s}");
    }

    #[test]
    fn negation_flips_sign() {
        assert!(score_text("this is not bullish") < 0.0);
    }

    #[test]
    fn unknown_words_are_neutral() {
        assert_eq!(score_text("Quarterly filing posted today"), 0.0);
        assert_eq!(score_text(""), 0.0);
    }

    #[test]
    fn hard_flag_dominates() {
        let s = score_text("Strong rally fades as SEC opens fraud investigation");
        assert!(s < 0.0, "score was {s}");
        assert_eq!(hard_flags("SEC opens fraud investigation"), vec!["fraud", "investigation"]);
    }
}
