//! Loss functions for binary classification

/// Probabilities are clipped to [EPS, 1 - EPS] before taking logs
const EPS: f64 = 1e-15;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Mean binary cross-entropy
pub fn binary_logloss(labels: &[f64], probabilities: &[f64]) -> f64 {
    debug_assert_eq!(labels.len(), probabilities.len());
    if labels.is_empty() {
        return 0.0;
    }

    let total: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();

    total / labels.len() as f64
}

/// Binary log-loss computed from raw scores (log-odds)
pub fn binary_logloss_raw(labels: &[f64], raw_scores: &[f64]) -> f64 {
    let probabilities: Vec<f64> = raw_scores.iter().map(|&s| sigmoid(s)).collect();
    binary_logloss(labels, &probabilities)
}
