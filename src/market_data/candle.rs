use serde::{Deserialize, Serialize};

/// A single OHLCV bar.  Series are always ordered oldest-to-newest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, UNIX seconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Bar resolution requested from a market data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// 15-minute bars over the last five days.
    Intraday,
    /// Daily bars over the last month.
    Daily,
}

impl Resolution {
    pub fn interval(&self) -> &'static str {
        match self {
            Self::Intraday => "15m",
            Self::Daily => "1d",
        }
    }

    pub fn range(&self) -> &'static str {
        match self {
            Self::Intraday => "5d",
            Self::Daily => "1mo",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.interval(), self.range())
    }
}

/// Percent change between the last two closes.
///
/// `(latest - prior) / prior * 100`.  Returns 0.0 when there is no prior
/// close or the result is not a finite number.
pub fn percent_change(candles: &[Candle]) -> f64 {
    let n = candles.len();
    if n < 2 {
        return 0.0;
    }
    let latest = candles[n - 1].close;
    let prior = candles[n - 2].close;
    if prior == 0.0 {
        return 0.0;
    }
    let pct = (latest - prior) / prior * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

#[cfg(test)]
pub(crate) fn synthetic_series(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                timestamp: 1_700_000_000 + i as i64 * 900,
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 1_000.0 + (i % 7) as f64 * 150.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_change_uses_prior_close() {
        let series = synthetic_series(&[100.0, 96.9]);
        let pct = percent_change(&series);
        assert!((pct - (-3.1)).abs() < 1e-9);
    }

    #[test]
    fn percent_change_defaults_to_zero() {
        assert_eq!(percent_change(&[]), 0.0);
        assert_eq!(percent_change(&synthetic_series(&[50.0])), 0.0);
        assert_eq!(percent_change(&synthetic_series(&[0.0, 10.0])), 0.0);
    }

    #[test]
    fn range_and_body() {
        let c = Candle {
            timestamp: 0,
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 11.0,
            volume: 5.0,
        };
        assert_eq!(c.range(), 3.0);
        assert_eq!(c.body(), 1.0);
        assert!(c.is_finite());
    }
}
