// =============================================================================
// Price Model — rolling-window logistic regression
// =============================================================================
//
// Retrained from scratch on every call; nothing is kept between cycles.
//
//   window  = last `training_window` feature rows, min-max scaled
//   sample  = `lookback` consecutive rows flattened (+ bias term)
//   target  = 1 if the next close is higher than the sample's last close
//   fit     = full-batch gradient descent on log-loss with L2 shrinkage,
//             weights seeded from `seed`
//   output  = P(next close higher | last `lookback` rows)
//
// Identical bars + identical params => identical probability.
// =============================================================================

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::features::{bar_features, min_max_scale, FeatureRow, FEATURE_COUNT};
use crate::market_data::Candle;
use crate::runtime_config::ModelParams;

/// Fewer training samples than this and the model refuses to predict.
pub const MIN_SAMPLES: usize = 10;

const L2_PENALTY: f64 = 1e-3;
const INIT_SCALE: f64 = 0.05;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn dot(w: &[f64], x: &[f64]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

/// Flatten `rows` into one input vector with a trailing bias term.
fn flatten(rows: &[FeatureRow]) -> Vec<f64> {
    let mut x = Vec::with_capacity(rows.len() * FEATURE_COUNT + 1);
    for row in rows {
        x.extend_from_slice(row);
    }
    x.push(1.0);
    x
}

/// Probability that the bar after `bars` closes higher than the last one.
pub fn predict_up_probability(bars: &[Candle], params: &ModelParams) -> Result<f64> {
    if params.lookback == 0 {
        anyhow::bail!("lookback must be at least 1");
    }

    let rows = bar_features(bars);
    let start = rows.len().saturating_sub(params.training_window);
    let mut window: Vec<FeatureRow> = rows[start..].to_vec();
    min_max_scale(&mut window);

    // One sample per position that has a following bar to label it.
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for end in params.lookback..window.len() {
        let current = window[end - 1][0];
        let next = window[end][0];
        xs.push(flatten(&window[end - params.lookback..end]));
        ys.push(if next > current { 1.0 } else { 0.0 });
    }

    if xs.len() < MIN_SAMPLES {
        anyhow::bail!(
            "insufficient training samples: {} < {}",
            xs.len(),
            MIN_SAMPLES
        );
    }

    let dims = params.lookback * FEATURE_COUNT + 1;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut w: Vec<f64> = (0..dims).map(|_| rng.gen_range(-INIT_SCALE..INIT_SCALE)).collect();

    let m = xs.len() as f64;
    let mut grad = vec![0.0; dims];
    for _ in 0..params.epochs {
        grad.iter_mut().for_each(|g| *g = 0.0);
        for (x, y) in xs.iter().zip(&ys) {
            let err = sigmoid(dot(&w, x)) - y;
            for (g, xi) in grad.iter_mut().zip(x) {
                *g += err * xi;
            }
        }
        for (wi, g) in w.iter_mut().zip(&grad) {
            *wi -= params.learning_rate * (g / m + L2_PENALTY * *wi);
        }
    }

    let latest = flatten(&window[window.len() - params.lookback..]);
    let p = sigmoid(dot(&w, &latest));
    if !p.is_finite() {
        anyhow::bail!("model produced a non-finite probability");
    }
    Ok(p)
}
