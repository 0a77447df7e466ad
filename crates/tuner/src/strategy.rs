//! Search strategies
//!
//! A strategy proposes the next configuration from the space and the trial
//! history so far, and may refine its internal model after each trial.
//! All shipped strategies draw from a seeded [`LcgRng`] and are reproducible.

use hyperboost_gbdt::LcgRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, TunerError};
use crate::space::{Configuration, SearchSpace};
use crate::trial::TrialRecord;

/// Sequential proposal capability used by the optimizer
pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    /// Next configuration to evaluate; must lie inside `space`
    fn propose(&mut self, space: &SearchSpace, history: &[TrialRecord]) -> Result<Configuration>;

    /// Observe the history after a trial has been appended
    fn update(&mut self, _history: &[TrialRecord]) {}
}

impl<S: SearchStrategy + ?Sized> SearchStrategy for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn propose(&mut self, space: &SearchSpace, history: &[TrialRecord]) -> Result<Configuration> {
        (**self).propose(space, history)
    }

    fn update(&mut self, history: &[TrialRecord]) {
        (**self).update(history)
    }
}

/// Independent uniform draws over the unit cube
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: LcgRng,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: LcgRng::new(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn propose(&mut self, space: &SearchSpace, _history: &[TrialRecord]) -> Result<Configuration> {
        let point: Vec<f64> = (0..space.len()).map(|_| self.rng.next_f64()).collect();
        Ok(space.from_unit(&point))
    }
}

/// Cartesian grid walked in order; wraps around once exhausted
#[derive(Debug, Clone)]
pub struct GridSearch {
    points_per_param: usize,
    position: usize,
}

impl GridSearch {
    pub fn new(points_per_param: usize) -> Self {
        Self {
            points_per_param: points_per_param.max(2),
            position: 0,
        }
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn propose(&mut self, space: &SearchSpace, _history: &[TrialRecord]) -> Result<Configuration> {
        let axes: Vec<Vec<f64>> = space
            .params()
            .iter()
            .map(|p| p.domain.grid(self.points_per_param))
            .collect();
        let total = axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
            .ok_or_else(|| TunerError::Configuration("grid is too large to enumerate".into()))?;

        let mut index = self.position % total;
        if self.position == total {
            debug!(total, "grid exhausted, starting over");
        }
        self.position += 1;

        // Last parameter varies fastest
        let mut values = vec![0.0; axes.len()];
        for (slot, axis) in values.iter_mut().zip(&axes).rev() {
            *slot = axis[index % axis.len()];
            index /= axis.len();
        }

        Ok(space
            .params()
            .iter()
            .map(|p| p.name.clone())
            .zip(values)
            .collect())
    }
}

/// Tree-structured Parzen Estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TpeConfig {
    /// Random proposals before the density model is used
    pub n_startup_trials: usize,
    /// Fraction of observations treated as good
    pub gamma: f64,
    /// Candidates drawn from the good density per proposal
    pub n_candidates: usize,
    /// Weight of the broad prior component in each density
    pub prior_weight: f64,
    pub seed: u64,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            n_startup_trials: 20,
            gamma: 0.25,
            n_candidates: 24,
            prior_weight: 1.0,
            seed: 0,
        }
    }
}

/// Per-dimension Gaussian mixture over the unit interval with a broad prior
struct Parzen {
    centers: Vec<f64>,
    bandwidth: f64,
    prior_weight: f64,
}

impl Parzen {
    const PRIOR_MEAN: f64 = 0.5;
    const PRIOR_SIGMA: f64 = 1.0;

    fn fit(centers: Vec<f64>, prior_weight: f64) -> Self {
        let n = centers.len().max(1) as f64;
        let mean = centers.iter().sum::<f64>() / n;
        let variance = centers.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        // Scott's rule with a floor so a collapsed group still explores
        let bandwidth = (variance.sqrt() * n.powf(-0.2)).clamp(0.01, 1.0);
        Self {
            centers,
            bandwidth,
            prior_weight,
        }
    }

    fn density(&self, x: f64) -> f64 {
        let kernels: f64 = self
            .centers
            .iter()
            .map(|&c| gaussian_pdf(x, c, self.bandwidth))
            .sum();
        let prior = self.prior_weight * gaussian_pdf(x, Self::PRIOR_MEAN, Self::PRIOR_SIGMA);
        (kernels + prior) / (self.centers.len() as f64 + self.prior_weight)
    }

    fn sample(&self, rng: &mut LcgRng) -> f64 {
        let total = self.centers.len() as f64 + self.prior_weight;
        let pick = rng.next_f64() * total;
        let (mu, sigma) = match self.centers.get(pick as usize) {
            Some(&c) if pick < self.centers.len() as f64 => (c, self.bandwidth),
            _ => (Self::PRIOR_MEAN, Self::PRIOR_SIGMA),
        };

        // Resample a few times before clipping into the unit interval
        for _ in 0..8 {
            let x = mu + sigma * standard_normal(rng);
            if (0.0..=1.0).contains(&x) {
                return x;
            }
        }
        mu.clamp(0.0, 1.0)
    }
}

fn gaussian_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// Box-Muller transform
fn standard_normal(rng: &mut LcgRng) -> f64 {
    let u1 = 1.0 - rng.next_f64();
    let u2 = rng.next_f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Sequential model-based search (Bergstra et al., 2011)
///
/// After `n_startup_trials` random proposals, the best
/// `ceil(gamma * sqrt(n))` observations form the good group and the rest the
/// bad group. Candidates are
/// drawn from the good density `l(x)` and the one maximising `l(x) / g(x)`
/// is proposed. Failed trials (infinite loss) always fall in the bad group.
#[derive(Debug, Clone)]
pub struct TpeStrategy {
    config: TpeConfig,
    rng: LcgRng,
    observations: Vec<(Configuration, f64)>,
}

impl TpeStrategy {
    pub fn new(config: TpeConfig) -> Self {
        let rng = LcgRng::new(config.seed);
        Self {
            config,
            rng,
            observations: Vec::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(TpeConfig {
            seed,
            ..TpeConfig::default()
        })
    }

    pub fn config(&self) -> &TpeConfig {
        &self.config
    }

    fn random_point(&mut self, dims: usize) -> Vec<f64> {
        (0..dims).map(|_| self.rng.next_f64()).collect()
    }

    /// Good/bad split of unit-cube observations, best first
    fn split(&self, space: &SearchSpace) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let mut ranked: Vec<(Vec<f64>, f64)> = self
            .observations
            .iter()
            .filter_map(|(config, loss)| space.to_unit(config).map(|unit| (unit, *loss)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let n = ranked.len();
        let n_good = ((self.config.gamma * (n as f64).sqrt()).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
        let bad = ranked.split_off(n_good.min(n));
        (
            ranked.into_iter().map(|(unit, _)| unit).collect(),
            bad.into_iter().map(|(unit, _)| unit).collect(),
        )
    }
}

impl Default for TpeStrategy {
    fn default() -> Self {
        Self::new(TpeConfig::default())
    }
}

impl SearchStrategy for TpeStrategy {
    fn name(&self) -> &'static str {
        "tpe"
    }

    fn propose(&mut self, space: &SearchSpace, _history: &[TrialRecord]) -> Result<Configuration> {
        let dims = space.len();
        if self.observations.len() < self.config.n_startup_trials.max(2) {
            let point = self.random_point(dims);
            return Ok(space.from_unit(&point));
        }

        let (good, bad) = self.split(space);
        let models: Vec<(Parzen, Parzen)> = (0..dims)
            .map(|d| {
                (
                    Parzen::fit(good.iter().map(|u| u[d]).collect(), self.config.prior_weight),
                    Parzen::fit(bad.iter().map(|u| u[d]).collect(), self.config.prior_weight),
                )
            })
            .collect();

        let mut best: Option<(Vec<f64>, f64)> = None;
        for _ in 0..self.config.n_candidates.max(1) {
            let candidate: Vec<f64> = models.iter().map(|(l, _)| l.sample(&mut self.rng)).collect();
            let score: f64 = candidate
                .iter()
                .zip(&models)
                .map(|(&x, (l, g))| l.density(x).ln() - g.density(x).ln())
                .sum();
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((candidate, score));
            }
        }

        let point = match best {
            Some((point, score)) => {
                debug!(score, good = good.len(), bad = bad.len(), "tpe candidate selected");
                point
            }
            None => self.random_point(dims),
        };
        Ok(space.from_unit(&point))
    }

    fn update(&mut self, history: &[TrialRecord]) {
        self.observations = history
            .iter()
            .map(|t| (t.configuration.clone(), t.loss))
            .collect();
    }
}
