//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Binary log-loss boosting. A [`BoostingSession`] adds one tree per call so
//! that cross-validation can advance several folds in lockstep and stop them
//! together; [`GbdtTrainer::train`] runs a session for the full round budget.

use tracing::debug;

use crate::binning::BinnedFeatures;
use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::{GbdtError, Result};
use crate::metrics::sigmoid;
use crate::model::{Booster, MODEL_VERSION};
use crate::params::BoosterParams;
use crate::tree::Tree;

/// Hessians are floored to keep leaf values finite
const MIN_HESSIAN: f64 = 1e-16;
const PROB_EPS: f64 = 1e-15;

/// GBDT trainer
pub struct GbdtTrainer {
    params: BoosterParams,
}

impl GbdtTrainer {
    pub fn new(params: BoosterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    /// Train exactly `num_boost_round` trees on the given dataset
    pub fn train(&self, dataset: &Dataset) -> Result<Booster> {
        let mut session = BoostingSession::new(self.params.clone(), dataset)?;
        while !session.is_exhausted() {
            session.boost_round();
        }
        Ok(session.into_booster())
    }
}

/// In-progress boosting run over one dataset
pub struct BoostingSession<'a> {
    params: BoosterParams,
    config: TreeConfig,
    dataset: &'a Dataset,
    binned: BinnedFeatures,
    weights: Vec<f64>,
    scores: Vec<f64>,
    base_score: f64,
    trees: Vec<Tree>,
    rng: LcgRng,
}

impl<'a> BoostingSession<'a> {
    pub fn new(params: BoosterParams, dataset: &'a Dataset) -> Result<Self> {
        params.validate()?;
        if dataset.is_empty() {
            return Err(GbdtError::EmptyDataset);
        }

        let weights = class_weights(dataset, params.is_unbalance);
        let base_score = initial_score(&dataset.labels, &weights);
        let binned = BinnedFeatures::from_dataset(dataset, params.max_bin);
        let rng = LcgRng::new(params.seed);

        debug!(
            rows = dataset.len(),
            features = dataset.feature_count,
            base_score,
            "boosting session initialised"
        );

        Ok(Self {
            config: TreeConfig::from(&params),
            params,
            dataset,
            binned,
            weights,
            scores: vec![base_score; dataset.len()],
            base_score,
            trees: Vec::new(),
            rng,
        })
    }

    pub fn rounds(&self) -> usize {
        self.trees.len()
    }

    /// True once `num_boost_round` trees exist
    pub fn is_exhausted(&self) -> bool {
        self.trees.len() >= self.params.num_boost_round
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Fit one more tree and return it. No-op once the round budget is spent.
    pub fn boost_round(&mut self) -> Option<&Tree> {
        if self.is_exhausted() {
            return None;
        }

        let (gradients, hessians) = self.calculate_gradients_hessians();
        let rows = self.sample_rows();
        let features = self.sample_features();

        let tree = CartBuilder::new(&self.config, &self.binned, &gradients, &hessians, &features)
            .build(rows);

        for (score, row) in self.scores.iter_mut().zip(&self.dataset.features) {
            *score += tree.predict(row);
        }

        debug!(
            round = self.trees.len() + 1,
            leaves = tree.num_leaves(),
            "tree added"
        );
        self.trees.push(tree);
        self.trees.last()
    }

    pub fn into_booster(self) -> Booster {
        let rounds = self.trees.len();
        self.into_booster_truncated(rounds)
    }

    /// Keep only the first `rounds` trees
    pub fn into_booster_truncated(mut self, rounds: usize) -> Booster {
        self.trees.truncate(rounds);
        Booster {
            version: MODEL_VERSION,
            base_score: self.base_score,
            trees: self.trees,
            feature_names: self.dataset.feature_names.clone(),
            categorical_features: self.dataset.categorical_features.clone(),
            params: self.params,
        }
    }

    /// Log-loss gradient p - y and hessian p(1 - p), both weighted
    fn calculate_gradients_hessians(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.scores.len();
        let mut gradients = Vec::with_capacity(n);
        let mut hessians = Vec::with_capacity(n);

        for i in 0..n {
            let p = sigmoid(self.scores[i]);
            let w = self.weights[i];
            gradients.push(w * (p - self.dataset.labels[i]));
            hessians.push((w * p * (1.0 - p)).max(MIN_HESSIAN));
        }

        (gradients, hessians)
    }

    /// Row bagging for this round
    fn sample_rows(&mut self) -> Vec<usize> {
        let n = self.dataset.len();
        if self.params.subsample >= 1.0 {
            return (0..n).collect();
        }

        let fraction = self.params.subsample;
        let rows: Vec<usize> = (0..n).filter(|_| self.rng.next_f64() < fraction).collect();
        if rows.is_empty() {
            (0..n).collect()
        } else {
            rows
        }
    }

    /// Column sampling for this tree
    fn sample_features(&mut self) -> Vec<usize> {
        let n = self.binned.feature_count();
        let mut features: Vec<usize> = (0..n).collect();
        if self.params.colsample_bytree >= 1.0 {
            return features;
        }

        let keep = ((self.params.colsample_bytree * n as f64).round() as usize).clamp(1, n.max(1));
        self.rng.shuffle(&mut features);
        features.truncate(keep);
        features.sort_unstable();
        features
    }
}

/// Per-row weights; positives scaled by n_neg / n_pos when unbalanced
fn class_weights(dataset: &Dataset, is_unbalance: bool) -> Vec<f64> {
    let (negatives, positives) = dataset.class_counts();
    let positive_weight = if is_unbalance && positives > 0 && negatives > 0 {
        negatives as f64 / positives as f64
    } else {
        1.0
    };

    dataset
        .labels
        .iter()
        .map(|&y| if y > 0.5 { positive_weight } else { 1.0 })
        .collect()
}

/// Log-odds of the weighted positive rate
fn initial_score(labels: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let positive: f64 = labels.iter().zip(weights).map(|(&y, &w)| y * w).sum();
    let p = (positive / total).clamp(PROB_EPS, 1.0 - PROB_EPS);
    (p / (1.0 - p)).ln()
}
