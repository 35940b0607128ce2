// =============================================================================
// Walk-Forward Backtest — replay the price model over a historical series
// =============================================================================
//
// For every bar after the first `training_window` bars:
//   1. Retrain on the trailing window ending at that bar (nothing leaks from
//      later bars).
//   2. Classify the raw model probability.  Sentiment cannot be replayed, so
//      the test measures price action alone.
//   3. BUY_CANDIDATE spends all cash on whole shares, SELL_AVOID liquidates,
//      WAIT holds.
//
// The result is compared with buying at the first evaluated close and
// holding to the last close of the series.
// =============================================================================

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::market_data::Candle;
use crate::runtime_config::ModelParams;
use crate::signals::fusion::MIN_HISTORY;
use crate::signals::model::predict_up_probability;
use crate::signals::classify;
use crate::types::Action;

pub const INITIAL_CAPITAL: f64 = 10_000.0;

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub bars: usize,
    /// Bars the model produced a probability for.
    pub evaluated: usize,
    /// Bars where training failed and the position was left untouched.
    pub skipped: usize,
    pub trades: usize,
    pub actions: BTreeMap<Action, usize>,
    pub final_value: f64,
    pub buy_and_hold_value: f64,
    pub strategy_return_pct: f64,
    pub buy_and_hold_return_pct: f64,
}

impl BacktestReport {
    pub fn beats_buy_and_hold(&self) -> bool {
        self.final_value > self.buy_and_hold_value
    }
}

#[derive(Debug, Default)]
struct Portfolio {
    cash: f64,
    shares: f64,
}

impl Portfolio {
    /// Apply an action at `price`.  Returns true when a trade happened.
    fn apply(&mut self, action: Action, price: f64) -> bool {
        match action {
            Action::BuyCandidate if self.cash > price => {
                let bought = (self.cash / price).floor();
                self.cash -= bought * price;
                self.shares += bought;
                true
            }
            Action::SellAvoid if self.shares > 0.0 => {
                self.cash += self.shares * price;
                self.shares = 0.0;
                true
            }
            _ => false,
        }
    }

    fn value(&self, price: f64) -> f64 {
        self.cash + self.shares * price
    }
}

fn return_pct(value: f64) -> f64 {
    (value - INITIAL_CAPITAL) / INITIAL_CAPITAL * 100.0
}

/// Walk the model forward over `bars` (oldest first).
#[instrument(skip(bars, params), fields(bars = bars.len()), name = "backtest::walk_forward")]
pub fn walk_forward(symbol: &str, bars: &[Candle], params: &ModelParams) -> Result<BacktestReport> {
    let window = params.training_window.max(MIN_HISTORY);
    if bars.len() < window + 2 {
        anyhow::bail!(
            "not enough bars to backtest {symbol}: {} < {}",
            bars.len(),
            window + 2
        );
    }
    if let Some(i) = bars.iter().position(|b| !b.is_finite() || b.close <= 0.0) {
        anyhow::bail!("malformed bar at index {i} for {symbol}");
    }

    let mut portfolio = Portfolio {
        cash: INITIAL_CAPITAL,
        shares: 0.0,
    };
    let mut actions: BTreeMap<Action, usize> = BTreeMap::new();
    let mut evaluated = 0;
    let mut skipped = 0;
    let mut trades = 0;
    let mut last_value = INITIAL_CAPITAL;

    // The last bar only serves as the buy-and-hold exit price.
    for i in window..bars.len() - 1 {
        let visible = &bars[i - window..=i];
        let price = bars[i].close;

        let prob = match predict_up_probability(visible, params) {
            Ok(p) => p,
            Err(e) => {
                debug!(index = i, error = %e, "training failed, holding position");
                skipped += 1;
                last_value = portfolio.value(price);
                continue;
            }
        };

        let action = classify(prob);
        *actions.entry(action).or_insert(0) += 1;
        evaluated += 1;
        if portfolio.apply(action, price) {
            trades += 1;
        }
        last_value = portfolio.value(price);
    }

    let start_price = bars[window].close;
    let end_price = bars[bars.len() - 1].close;
    let buy_and_hold_value = INITIAL_CAPITAL / start_price * end_price;

    let report = BacktestReport {
        symbol: symbol.to_string(),
        bars: bars.len(),
        evaluated,
        skipped,
        trades,
        actions,
        final_value: last_value,
        buy_and_hold_value,
        strategy_return_pct: return_pct(last_value),
        buy_and_hold_return_pct: return_pct(buy_and_hold_value),
    };

    info!(
        symbol,
        strategy = %format!("{:+.2}%", report.strategy_return_pct),
        buy_and_hold = %format!("{:+.2}%", report.buy_and_hold_return_pct),
        trades = report.trades,
        "backtest complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::synthetic_series;

    fn params() -> ModelParams {
        ModelParams {
            training_window: 40,
            ..ModelParams::default()
        }
    }

    fn linear(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| start + i as f64 * step).collect()
    }

    #[test]
    fn portfolio_table() {
        let cases = [
            // (cash, shares, action, price, traded, cash after, shares after)
            (1_000.0, 0.0, Action::BuyCandidate, 300.0, true, 100.0, 3.0),
            (100.0, 3.0, Action::BuyCandidate, 300.0, false, 100.0, 3.0),
            (100.0, 3.0, Action::SellAvoid, 250.0, true, 850.0, 0.0),
            (850.0, 0.0, Action::SellAvoid, 250.0, false, 850.0, 0.0),
            (850.0, 2.0, Action::Wait, 250.0, false, 850.0, 2.0),
        ];
        for (cash, shares, action, price, traded, cash_after, shares_after) in cases {
            let mut p = Portfolio { cash, shares };
            assert_eq!(p.apply(action, price), traded, "{action:?} at {price}");
            assert!((p.cash - cash_after).abs() < 1e-9);
            assert_eq!(p.shares, shares_after);
        }
    }

    #[test]
    fn rising_series_buys_and_tracks_the_market() {
        let bars = synthetic_series(&linear(80, 100.0, 1.0));
        let report = walk_forward("NVDA", &bars, &params()).unwrap();

        assert_eq!(report.bars, 80);
        assert_eq!(report.evaluated + report.skipped, 80 - 40 - 1);
        assert_eq!(report.actions.get(&Action::BuyCandidate), Some(&report.evaluated));
        assert_eq!(report.trades, 1);
        assert!(report.strategy_return_pct > 0.0);
        // Exits one bar before the final close and keeps leftover cash.
        assert!(report.final_value <= report.buy_and_hold_value);
    }

    #[test]
    fn falling_series_never_opens_a_position() {
        let bars = synthetic_series(&linear(80, 200.0, -1.0));
        let report = walk_forward("GME", &bars, &params()).unwrap();

        assert_eq!(report.trades, 0);
        assert_eq!(report.actions.get(&Action::BuyCandidate), None);
        assert_eq!(report.final_value, INITIAL_CAPITAL);
        assert!(report.buy_and_hold_return_pct < 0.0);
        assert!(report.beats_buy_and_hold());
    }

    #[test]
    fn short_or_malformed_series_is_rejected() {
        let short = synthetic_series(&linear(41, 100.0, 1.0));
        assert!(walk_forward("AMD", &short, &params()).is_err());

        let mut bars = synthetic_series(&linear(80, 100.0, 1.0));
        bars[50].volume = f64::NAN;
        assert!(walk_forward("AMD", &bars, &params()).is_err());
    }
}
