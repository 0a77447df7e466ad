//! Hyperparameter search space
//!
//! Each parameter has a continuous (`Uniform`) or quantized (`QUniform`)
//! domain. Strategies work in the unit cube and map points back through
//! [`ParamDomain::from_unit`], so every proposal lies inside the bounds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TunerError};

/// One candidate point: parameter name to value
pub type Configuration = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamDomain {
    Uniform { low: f64, high: f64 },
    /// Multiples of `step` inside `[low, high]`
    QUniform { low: f64, high: f64, step: f64 },
}

impl ParamDomain {
    pub fn low(&self) -> f64 {
        match *self {
            ParamDomain::Uniform { low, .. } | ParamDomain::QUniform { low, .. } => low,
        }
    }

    pub fn high(&self) -> f64 {
        match *self {
            ParamDomain::Uniform { high, .. } | ParamDomain::QUniform { high, .. } => high,
        }
    }

    /// Quantized with whole-number grid points
    pub fn is_integer(&self) -> bool {
        match *self {
            ParamDomain::Uniform { .. } => false,
            ParamDomain::QUniform { step, .. } => step.fract() == 0.0,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let (low, high) = (self.low(), self.high());
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(TunerError::Configuration(format!(
                "parameter '{}' has an empty range [{}, {}]",
                name, low, high
            )));
        }
        if let ParamDomain::QUniform { step, .. } = *self {
            if !(step > 0.0 && step.is_finite()) {
                return Err(TunerError::Configuration(format!(
                    "parameter '{}' has a non-positive step {}",
                    name, step
                )));
            }
            if (low / step).ceil() > (high / step).floor() {
                return Err(TunerError::Configuration(format!(
                    "parameter '{}' has no multiple of {} in [{}, {}]",
                    name, step, low, high
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low() && value <= self.high()
    }

    /// Snap to the nearest multiple of `step`, then to the nearest one in bounds
    pub fn quantize(&self, value: f64) -> f64 {
        match *self {
            ParamDomain::Uniform { low, high } => value.clamp(low, high),
            ParamDomain::QUniform { low, high, step } => {
                let first = (low / step).ceil() * step;
                let last = (high / step).floor() * step;
                ((value / step).round() * step).clamp(first, last)
            }
        }
    }

    /// Map `u` in `[0, 1]` onto the domain
    pub fn from_unit(&self, u: f64) -> f64 {
        let u = u.clamp(0.0, 1.0);
        self.quantize(self.low() + u * (self.high() - self.low()))
    }

    /// Inverse of [`from_unit`](Self::from_unit) up to quantization
    pub fn to_unit(&self, value: f64) -> f64 {
        ((value - self.low()) / (self.high() - self.low())).clamp(0.0, 1.0)
    }

    /// Evenly spaced values, deduplicated after quantization
    pub fn grid(&self, points: usize) -> Vec<f64> {
        let points = points.max(2);
        let mut values: Vec<f64> = (0..points)
            .map(|i| self.from_unit(i as f64 / (points - 1) as f64))
            .collect();
        values.dedup();
        values
    }
}

/// Named parameter domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub domain: ParamDomain,
}

/// Ordered set of parameter domains
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    params: Vec<Param>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; a repeated name replaces the earlier domain
    pub fn with(mut self, name: impl Into<String>, domain: ParamDomain) -> Self {
        self.insert(name, domain);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, domain: ParamDomain) {
        let name = name.into();
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.domain = domain,
            None => self.params.push(Param { name, domain }),
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamDomain> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.domain)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.params.is_empty() {
            return Err(TunerError::Configuration("search space is empty".into()));
        }
        for param in &self.params {
            param.domain.validate(&param.name)?;
        }
        Ok(())
    }

    /// Point of the unit cube to a configuration
    pub fn from_unit(&self, point: &[f64]) -> Configuration {
        self.params
            .iter()
            .zip(point)
            .map(|(param, &u)| (param.name.clone(), param.domain.from_unit(u)))
            .collect()
    }

    /// Configuration to unit-cube coordinates in parameter order
    pub fn to_unit(&self, configuration: &Configuration) -> Option<Vec<f64>> {
        self.params
            .iter()
            .map(|param| {
                configuration
                    .get(&param.name)
                    .map(|&v| param.domain.to_unit(v))
            })
            .collect()
    }

    /// Every parameter present and inside its bounds
    pub fn contains(&self, configuration: &Configuration) -> bool {
        self.params.iter().all(|param| {
            configuration
                .get(&param.name)
                .is_some_and(|&v| param.domain.contains(v))
        })
    }

    /// Round integer-valued parameters to whole numbers
    pub fn round_integers(&self, configuration: &mut Configuration) {
        for param in self.params.iter().filter(|p| p.domain.is_integer()) {
            if let Some(value) = configuration.get_mut(&param.name) {
                *value = value.round();
            }
        }
    }
}

/// LightGBM-style space used for the income model
pub fn default_search_space() -> SearchSpace {
    SearchSpace::new()
        .with("learning_rate", ParamDomain::Uniform { low: 0.01, high: 0.2 })
        .with(
            "num_boost_round",
            ParamDomain::QUniform { low: 50.0, high: 500.0, step: 20.0 },
        )
        .with(
            "num_leaves",
            ParamDomain::QUniform { low: 31.0, high: 256.0, step: 4.0 },
        )
        .with("min_child_weight", ParamDomain::Uniform { low: 0.1, high: 10.0 })
        .with("colsample_bytree", ParamDomain::Uniform { low: 0.5, high: 1.0 })
        .with("subsample", ParamDomain::Uniform { low: 0.5, high: 1.0 })
        .with("reg_alpha", ParamDomain::Uniform { low: 0.01, high: 0.1 })
        .with("reg_lambda", ParamDomain::Uniform { low: 0.01, high: 0.1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_space_is_valid() {
        let space = default_search_space();
        assert_eq!(space.len(), 8);
        assert!(space.validate().is_ok());
        assert!(space.get("num_leaves").unwrap().is_integer());
        assert!(!space.get("learning_rate").unwrap().is_integer());
    }

    #[test]
    fn test_quantize_snaps_to_grid_and_clamps() {
        let rounds = ParamDomain::QUniform { low: 50.0, high: 500.0, step: 20.0 };
        assert_eq!(rounds.quantize(61.0), 60.0);
        assert_eq!(rounds.quantize(71.0), 80.0);
        assert_eq!(rounds.quantize(499.0), 500.0);
        assert_eq!(rounds.quantize(505.0), 500.0);
        assert_eq!(rounds.from_unit(0.0), 60.0);
        assert_eq!(rounds.from_unit(1.0), 500.0);

        let leaves = ParamDomain::QUniform { low: 31.0, high: 256.0, step: 4.0 };
        assert_eq!(leaves.from_unit(0.5), 144.0);
    }

    #[test]
    fn test_quantized_values_are_step_multiples_and_reach_bounds() {
        let space = default_search_space();

        let leaves = space.get("num_leaves").unwrap();
        assert_eq!(leaves.from_unit(0.0), 32.0);
        assert_eq!(leaves.from_unit(1.0), 256.0);
        let grid = leaves.grid(200);
        assert!(grid.iter().all(|v| v % 4.0 == 0.0 && leaves.contains(*v)));
        assert_eq!(grid.last(), Some(&256.0));

        let rounds = space.get("num_boost_round").unwrap();
        let grid = rounds.grid(100);
        assert!(grid.iter().all(|v| v % 20.0 == 0.0));
        assert_eq!(&grid[grid.len() - 3..], &[460.0, 480.0, 500.0]);
    }

    #[test]
    fn test_quantized_range_without_a_multiple_rejected() {
        let space = SearchSpace::new().with(
            "n",
            ParamDomain::QUniform { low: 1.1, high: 1.9, step: 1.0 },
        );
        assert!(matches!(space.validate(), Err(TunerError::Configuration(_))));
    }

    #[test]
    fn test_empty_space_rejected() {
        let err = SearchSpace::new().validate().unwrap_err();
        assert!(matches!(err, TunerError::Configuration(_)));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let space = SearchSpace::new().with("lr", ParamDomain::Uniform { low: 0.2, high: 0.1 });
        assert!(space.validate().is_err());
    }

    #[test]
    fn test_unit_round_trip() {
        let space = default_search_space();
        let config = space.from_unit(&[0.5; 8]);
        assert!(space.contains(&config));

        let unit = space.to_unit(&config).unwrap();
        for (name, value) in space.from_unit(&unit) {
            assert!((value - config[&name]).abs() < 1e-12, "{name}");
        }
    }

    #[test]
    fn test_grid_deduplicates() {
        let domain = ParamDomain::QUniform { low: 0.0, high: 2.0, step: 1.0 };
        assert_eq!(domain.grid(5), vec![0.0, 1.0, 2.0]);
    }
}
