// =============================================================================
// Bar Features — per-bar inputs for the probability model
// =============================================================================
//
// Five features per bar:
//   0. close
//   1. volume
//   2. range  = high - low
//   3. body   = close - open
//   4. sma_5  = simple moving average of the last five closes
//
// The first SMA_PERIOD - 1 bars have no SMA and are dropped.  Columns are
// min-max scaled to [0, 1] over the window being trained on; a constant
// column scales to 0.0.
// =============================================================================

use crate::market_data::Candle;

pub const FEATURE_COUNT: usize = 5;
pub const SMA_PERIOD: usize = 5;

pub type FeatureRow = [f64; FEATURE_COUNT];

/// Simple moving average aligned to the end of `values`.  Element `i` of the
/// result is the mean of `values[i..i + period]`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Raw feature rows for `bars`, one per bar from index `SMA_PERIOD - 1`.
pub fn bar_features(bars: &[Candle]) -> Vec<FeatureRow> {
    let closes: Vec<f64> = bars.iter().map(|c| c.close).collect();
    let sma_5 = sma(&closes, SMA_PERIOD);

    bars[SMA_PERIOD.saturating_sub(1).min(bars.len())..]
        .iter()
        .zip(sma_5)
        .map(|(bar, avg)| [bar.close, bar.volume, bar.range(), bar.body(), avg])
        .collect()
}

/// Scale every column of `rows` into [0, 1] in place.
pub fn min_max_scale(rows: &mut [FeatureRow]) {
    for col in 0..FEATURE_COUNT {
        let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r[col]), hi.max(r[col]))
        });
        let span = max - min;
        for row in rows.iter_mut() {
            row[col] = if span > f64::EPSILON {
                (row[col] - min) / span
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::candle::synthetic_series;

    #[test]
    fn sma_aligns_to_window_end() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 5);
        assert_eq!(out, vec![3.0, 4.0]);
        assert!(sma(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn bar_features_drop_warmup_rows() {
        let bars = synthetic_series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let rows = bar_features(&bars);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], 14.0);
        assert_eq!(rows[0][4], 12.0);
        assert_eq!(rows[2][3], 1.0);
    }

    #[test]
    fn bar_features_on_short_series_is_empty() {
        let bars = synthetic_series(&[10.0, 11.0]);
        assert!(bar_features(&bars).is_empty());
    }

    #[test]
    fn min_max_scaling_bounds_columns() {
        let mut rows = vec![[1.0, 5.0, 2.0, 0.0, 7.0], [3.0, 5.0, 4.0, 1.0, 9.0], [2.0, 5.0, 3.0, 0.5, 8.0]];
        min_max_scale(&mut rows);
        assert_eq!(rows[0], [0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(rows[1], [1.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(rows[2], [0.5, 0.0, 0.5, 0.5, 0.5]);
    }
}
