//! K-fold cross-validation with early stopping
//!
//! All folds boost in lockstep, one round at a time. After every round the
//! held-out log-loss is averaged across folds; when the mean has not improved
//! for `early_stopping_rounds` rounds the run stops and the history is cut
//! back to the best round.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::dataset::Dataset;
use crate::deterministic::LcgRng;
use crate::errors::{GbdtError, Result};
use crate::metrics::binary_logloss_raw;
use crate::params::BoosterParams;
use crate::trainer::BoostingSession;
use crate::tree::Tree;

/// Cross-validation settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvConfig {
    pub nfold: usize,
    pub stratified: bool,
    pub shuffle: bool,
    /// Rounds without improvement before stopping; `None` trains every round
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            nfold: 3,
            stratified: true,
            shuffle: true,
            early_stopping_rounds: Some(20),
            seed: 0,
        }
    }
}

/// Per-round validation history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub mean_logloss: Vec<f64>,
    pub std_logloss: Vec<f64>,
}

impl CvResult {
    /// Number of boosting rounds the history covers
    pub fn rounds(&self) -> usize {
        self.mean_logloss.len()
    }

    /// Mean held-out loss at the final kept round
    pub fn final_loss(&self) -> f64 {
        self.mean_logloss.last().copied().unwrap_or(f64::INFINITY)
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Class-preserving folds: each class is dealt round-robin across folds
pub fn stratified_folds(labels: &[f64], nfold: usize, shuffle: bool, seed: u64) -> Result<Vec<Fold>> {
    check_fold_count(labels.len(), nfold)?;

    let mut rng = LcgRng::new(seed);
    let mut negatives: Vec<usize> = Vec::new();
    let mut positives: Vec<usize> = Vec::new();
    for (idx, &y) in labels.iter().enumerate() {
        if y > 0.5 {
            positives.push(idx);
        } else {
            negatives.push(idx);
        }
    }

    let mut assignments: Vec<Vec<usize>> = vec![Vec::new(); nfold];
    let mut slot = 0usize;
    for mut class_indices in [negatives, positives] {
        if shuffle {
            rng.shuffle(&mut class_indices);
        }
        for idx in class_indices {
            assignments[slot % nfold].push(idx);
            slot += 1;
        }
    }

    Ok(folds_from_assignments(assignments))
}

/// Plain contiguous k-fold over (optionally shuffled) row indices
pub fn kfold_folds(n_samples: usize, nfold: usize, shuffle: bool, seed: u64) -> Result<Vec<Fold>> {
    check_fold_count(n_samples, nfold)?;

    let mut indices: Vec<usize> = (0..n_samples).collect();
    if shuffle {
        LcgRng::new(seed).shuffle(&mut indices);
    }

    let mut assignments = Vec::with_capacity(nfold);
    let mut current = 0;
    for fold_idx in 0..nfold {
        let size = n_samples / nfold + usize::from(fold_idx < n_samples % nfold);
        assignments.push(indices[current..current + size].to_vec());
        current += size;
    }

    Ok(folds_from_assignments(assignments))
}

fn check_fold_count(n_samples: usize, nfold: usize) -> Result<()> {
    if nfold < 2 {
        return Err(GbdtError::InvalidParams(format!(
            "nfold must be at least 2, got {}",
            nfold
        )));
    }
    if n_samples < nfold {
        return Err(GbdtError::InvalidParams(format!(
            "n_samples ({}) must be >= nfold ({})",
            n_samples, nfold
        )));
    }
    Ok(())
}

fn folds_from_assignments(mut assignments: Vec<Vec<usize>>) -> Vec<Fold> {
    for fold in &mut assignments {
        fold.sort_unstable();
    }

    (0..assignments.len())
        .map(|fold_idx| {
            let mut train_indices: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train_indices.sort_unstable();

            Fold {
                train_indices,
                test_indices: assignments[fold_idx].clone(),
                fold_idx,
            }
        })
        .collect()
}

struct FoldState<'a> {
    session: BoostingSession<'a>,
    valid: &'a Dataset,
    valid_scores: Vec<f64>,
}

impl<'a> FoldState<'a> {
    fn new(params: BoosterParams, train: &'a Dataset, valid: &'a Dataset) -> Result<Self> {
        let session = BoostingSession::new(params, train)?;
        let valid_scores = vec![session.base_score(); valid.len()];
        Ok(Self {
            session,
            valid,
            valid_scores,
        })
    }

    /// Add one tree and return the held-out loss
    fn step(&mut self) -> f64 {
        if let Some(tree) = self.session.boost_round() {
            add_tree(&mut self.valid_scores, tree, &self.valid.features);
        }
        binary_logloss_raw(&self.valid.labels, &self.valid_scores)
    }
}

fn add_tree(scores: &mut [f64], tree: &Tree, rows: &[Vec<f64>]) {
    for (score, row) in scores.iter_mut().zip(rows) {
        *score += tree.predict(row);
    }
}

/// Cross-validate `params` on `dataset`, training at most
/// `params.num_boost_round` rounds per fold
#[instrument(skip_all, fields(rows = dataset.len(), nfold = config.nfold))]
pub fn cv(params: &BoosterParams, dataset: &Dataset, config: &CvConfig) -> Result<CvResult> {
    params.validate()?;

    let folds = if config.stratified {
        stratified_folds(&dataset.labels, config.nfold, config.shuffle, config.seed)?
    } else {
        kfold_folds(dataset.len(), config.nfold, config.shuffle, config.seed)?
    };

    let fold_data: Vec<(Dataset, Dataset)> = folds
        .iter()
        .map(|f| (dataset.subset(&f.train_indices), dataset.subset(&f.test_indices)))
        .collect();

    let mut states = fold_data
        .iter()
        .map(|(train, valid)| FoldState::new(params.clone(), train, valid))
        .collect::<Result<Vec<_>>>()?;

    let mut mean_logloss = Vec::new();
    let mut std_logloss = Vec::new();
    let mut best_round = 0usize;
    let mut best_loss = f64::INFINITY;

    for round in 0..params.num_boost_round {
        let losses: Vec<f64> = states.par_iter_mut().map(FoldState::step).collect();

        let mean = losses.iter().sum::<f64>() / losses.len() as f64;
        let variance = losses.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / losses.len() as f64;
        mean_logloss.push(mean);
        std_logloss.push(variance.sqrt());

        if mean < best_loss {
            best_loss = mean;
            best_round = round;
        }

        if let Some(patience) = config.early_stopping_rounds {
            if round - best_round >= patience {
                debug!(round, best_round, "early stopping");
                break;
            }
        }
    }

    if config.early_stopping_rounds.is_some() {
        mean_logloss.truncate(best_round + 1);
        std_logloss.truncate(best_round + 1);
    }

    let result = CvResult {
        mean_logloss,
        std_logloss,
    };
    info!(
        rounds = result.rounds(),
        loss = result.final_loss(),
        "cross-validation finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize, positives_every: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % positives_every == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_stratified_folds_partition_rows() {
        let y = labels(30, 3);
        let folds = stratified_folds(&y, 3, true, 1).unwrap();

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());

        for fold in &folds {
            let positives = fold.test_indices.iter().filter(|&&i| y[i] > 0.5).count();
            assert!((3..=4).contains(&positives));
            assert_eq!(fold.train_indices.len() + fold.test_indices.len(), 30);
        }
    }

    #[test]
    fn test_stratified_folds_are_seeded() {
        let y = labels(40, 4);
        assert_eq!(
            stratified_folds(&y, 3, true, 5).unwrap(),
            stratified_folds(&y, 3, true, 5).unwrap()
        );
    }

    #[test]
    fn test_kfold_sizes() {
        let folds = kfold_folds(10, 3, false, 0).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(folds[0].test_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rejects_too_few_samples() {
        assert!(stratified_folds(&[0.0, 1.0], 3, false, 0).is_err());
        assert!(kfold_folds(5, 1, false, 0).is_err());
    }
}
