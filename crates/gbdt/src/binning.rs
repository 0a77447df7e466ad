//! Feature discretization for histogram split search
//!
//! Numerical features are cut at midpoints between distinct values (at most
//! `max_bin` bins). Categorical features get one bin per code seen in
//! training plus a trailing bin for everything else.

use crate::dataset::Dataset;

#[derive(Debug, Clone)]
pub(crate) struct BinMapper {
    /// Numerical: ascending upper bounds. Categorical: ascending codes.
    bounds: Vec<f64>,
    categorical: bool,
}

impl BinMapper {
    pub(crate) fn fit(values: &[f64], max_bin: usize, categorical: bool) -> Self {
        let mut distinct: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();

        if categorical {
            return Self {
                bounds: distinct,
                categorical,
            };
        }

        let bounds = if distinct.len() <= max_bin {
            distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
        } else {
            let mut bounds: Vec<f64> = (1..max_bin)
                .map(|j| {
                    let idx = j * distinct.len() / max_bin;
                    (distinct[idx - 1] + distinct[idx]) / 2.0
                })
                .collect();
            bounds.dedup();
            bounds
        };

        Self { bounds, categorical }
    }

    pub(crate) fn num_bins(&self) -> usize {
        self.bounds.len() + 1
    }

    pub(crate) fn is_categorical(&self) -> bool {
        self.categorical
    }

    pub(crate) fn bin(&self, value: f64) -> u32 {
        if self.categorical {
            return match self.bounds.binary_search_by(|b| b.total_cmp(&value)) {
                Ok(idx) => idx as u32,
                Err(_) => self.bounds.len() as u32,
            };
        }
        if value.is_nan() {
            return self.bounds.len() as u32;
        }
        self.bounds.partition_point(|&b| b < value) as u32
    }

    /// Raw-space threshold a split at `bin` translates to
    pub(crate) fn threshold(&self, bin: usize) -> f64 {
        self.bounds[bin]
    }
}

/// Column-major bin indices for every training row
#[derive(Debug, Clone)]
pub(crate) struct BinnedFeatures {
    pub(crate) mappers: Vec<BinMapper>,
    pub(crate) bins: Vec<Vec<u32>>,
}

impl BinnedFeatures {
    pub(crate) fn from_dataset(dataset: &Dataset, max_bin: usize) -> Self {
        let mut mappers = Vec::with_capacity(dataset.feature_count);
        let mut bins = Vec::with_capacity(dataset.feature_count);

        for feature_idx in 0..dataset.feature_count {
            let column: Vec<f64> = dataset.features.iter().map(|row| row[feature_idx]).collect();
            let mapper = BinMapper::fit(&column, max_bin, dataset.is_categorical(feature_idx));
            bins.push(column.iter().map(|&v| mapper.bin(v)).collect());
            mappers.push(mapper);
        }

        Self { mappers, bins }
    }

    pub(crate) fn feature_count(&self) -> usize {
        self.mappers.len()
    }
}
