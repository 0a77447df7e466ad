//! CART (Classification and Regression Tree) builder
//!
//! Grows one regression tree on gradient/hessian statistics, leaf-wise:
//! the leaf with the largest split gain is expanded next until `num_leaves`
//! is reached or no split improves the objective. Split search runs on
//! per-feature histograms over the precomputed bins.

use crate::binning::BinnedFeatures;
use crate::deterministic::SplitTieBreaker;
use crate::params::BoosterParams;
use crate::tree::{Node, Tree};

/// Splits must beat this gain to be taken
const MIN_SPLIT_GAIN: f64 = 1e-10;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_data_in_leaf: usize,
    pub min_child_weight: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub learning_rate: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::from(&BoosterParams::default())
    }
}

impl From<&BoosterParams> for TreeConfig {
    fn from(params: &BoosterParams) -> Self {
        Self {
            num_leaves: params.num_leaves,
            max_depth: params.max_depth,
            min_data_in_leaf: params.min_data_in_leaf.max(1),
            min_child_weight: params.min_child_weight,
            reg_alpha: params.reg_alpha,
            reg_lambda: params.reg_lambda,
            learning_rate: params.learning_rate,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    bin: usize,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, bin: usize, gain: f64) -> Self {
        Self {
            feature_idx,
            bin,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, bin),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

#[derive(Debug)]
struct Leaf {
    node_idx: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitCandidate>,
}

#[derive(Clone, Copy, Default)]
struct Bucket {
    grad: f64,
    hess: f64,
    count: usize,
}

/// Build a regression tree from gradient statistics
pub(crate) struct CartBuilder<'a> {
    config: &'a TreeConfig,
    binned: &'a BinnedFeatures,
    gradients: &'a [f64],
    hessians: &'a [f64],
    /// Features this tree may split on (column sampling)
    features: &'a [usize],
}

impl<'a> CartBuilder<'a> {
    pub(crate) fn new(
        config: &'a TreeConfig,
        binned: &'a BinnedFeatures,
        gradients: &'a [f64],
        hessians: &'a [f64],
        features: &'a [usize],
    ) -> Self {
        debug_assert_eq!(gradients.len(), hessians.len());
        Self {
            config,
            binned,
            gradients,
            hessians,
            features,
        }
    }

    /// Grow a tree over `rows` (indices into the gradient vectors)
    pub(crate) fn build(&self, rows: Vec<usize>) -> Tree {
        let (sum_g, sum_h) = self.sum_gradients_hessians(&rows);
        let mut nodes = vec![Node::leaf(self.leaf_value(sum_g, sum_h))];
        let mut leaves = vec![self.make_leaf(0, rows, 0)];
        let mut leaf_count = 1;

        while leaf_count < self.config.num_leaves {
            let mut best: Option<usize> = None;
            for (pos, leaf) in leaves.iter().enumerate() {
                let Some(candidate) = &leaf.split else {
                    continue;
                };
                let improves = match best.and_then(|b| leaves[b].split.as_ref()) {
                    None => true,
                    Some(current) => candidate.gain > current.gain,
                };
                if improves {
                    best = Some(pos);
                }
            }

            let Some(pos) = best else {
                break;
            };
            let leaf = leaves.remove(pos);
            let Some(split) = leaf.split else {
                break;
            };

            let (left_rows, right_rows) = self.split_rows(&leaf.rows, &split);
            let (left_g, left_h) = self.sum_gradients_hessians(&left_rows);
            let (right_g, right_h) = self.sum_gradients_hessians(&right_rows);

            let mapper = &self.binned.mappers[split.feature_idx];
            let left_idx = nodes.len();
            let right_idx = left_idx + 1;
            nodes[leaf.node_idx] = Node {
                feature_index: split.feature_idx as u32,
                threshold: mapper.threshold(split.bin),
                categorical: mapper.is_categorical(),
                left: left_idx as u32,
                right: right_idx as u32,
                value: None,
            };
            nodes.push(Node::leaf(self.leaf_value(left_g, left_h)));
            nodes.push(Node::leaf(self.leaf_value(right_g, right_h)));

            leaves.push(self.make_leaf(left_idx, left_rows, leaf.depth + 1));
            leaves.push(self.make_leaf(right_idx, right_rows, leaf.depth + 1));
            leaf_count += 1;
        }

        Tree { nodes }
    }

    fn make_leaf(&self, node_idx: usize, rows: Vec<usize>, depth: usize) -> Leaf {
        let depth_exhausted = self.config.max_depth.is_some_and(|max| depth >= max);
        let split = if depth_exhausted || rows.len() < 2 * self.config.min_data_in_leaf {
            None
        } else {
            self.find_best_split(&rows)
        };

        Leaf {
            node_idx,
            rows,
            depth,
            split,
        }
    }

    /// Histogram scan over every allowed feature
    fn find_best_split(&self, rows: &[usize]) -> Option<SplitCandidate> {
        let (sum_g, sum_h) = self.sum_gradients_hessians(rows);
        let parent_score = self.score(sum_g, sum_h);
        let mut best_split: Option<SplitCandidate> = None;

        for &feature_idx in self.features {
            let mapper = &self.binned.mappers[feature_idx];
            let num_bins = mapper.num_bins();
            if num_bins < 2 {
                continue;
            }

            let bins = &self.binned.bins[feature_idx];
            let mut histogram = vec![Bucket::default(); num_bins];
            for &row in rows {
                let bucket = &mut histogram[bins[row] as usize];
                bucket.grad += self.gradients[row];
                bucket.hess += self.hessians[row];
                bucket.count += 1;
            }

            let mut left = Bucket::default();
            for (bin, bucket) in histogram.iter().take(num_bins - 1).enumerate() {
                if mapper.is_categorical() {
                    left = *bucket;
                } else {
                    left.grad += bucket.grad;
                    left.hess += bucket.hess;
                    left.count += bucket.count;
                }

                let right = Bucket {
                    grad: sum_g - left.grad,
                    hess: sum_h - left.hess,
                    count: rows.len() - left.count,
                };
                if !self.is_admissible(&left) || !self.is_admissible(&right) {
                    continue;
                }

                let gain = self.score(left.grad, left.hess) + self.score(right.grad, right.hess)
                    - parent_score;
                if gain <= MIN_SPLIT_GAIN {
                    continue;
                }

                let candidate = SplitCandidate::new(feature_idx, bin, gain);
                best_split = match best_split {
                    Some(current) if !candidate.beats(&current) => Some(current),
                    _ => Some(candidate),
                };
            }
        }

        best_split
    }

    fn is_admissible(&self, bucket: &Bucket) -> bool {
        bucket.count >= self.config.min_data_in_leaf && bucket.hess >= self.config.min_child_weight
    }

    fn split_rows(&self, rows: &[usize], split: &SplitCandidate) -> (Vec<usize>, Vec<usize>) {
        let bins = &self.binned.bins[split.feature_idx];
        let categorical = self.binned.mappers[split.feature_idx].is_categorical();
        let bin = split.bin as u32;

        rows.iter().partition(|&&row| {
            if categorical {
                bins[row] == bin
            } else {
                bins[row] <= bin
            }
        })
    }

    /// Sum gradients and hessians for a set of samples
    fn sum_gradients_hessians(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &row| {
            (g + self.gradients[row], h + self.hessians[row])
        })
    }

    /// Soft-thresholded gradient sum (L1 penalty)
    fn threshold_l1(&self, sum_g: f64) -> f64 {
        let alpha = self.config.reg_alpha;
        if sum_g > alpha {
            sum_g - alpha
        } else if sum_g < -alpha {
            sum_g + alpha
        } else {
            0.0
        }
    }

    /// Structure score: T(G)² / (H + λ)
    fn score(&self, sum_g: f64, sum_h: f64) -> f64 {
        let denom = sum_h + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        let g = self.threshold_l1(sum_g);
        g * g / denom
    }

    /// Optimal leaf value -T(G) / (H + λ), shrunk by the learning rate
    fn leaf_value(&self, sum_g: f64, sum_h: f64) -> f64 {
        let denom = sum_h + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.threshold_l1(sum_g) / denom * self.config.learning_rate
    }
}
