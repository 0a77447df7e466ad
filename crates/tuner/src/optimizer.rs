//! Hyperparameter optimizer
//!
//! One run moves through `NotStarted -> Searching -> Refitting -> Logging ->
//! Done`. Searching evaluates up to `max_evaluations` proposals; Refitting
//! trains the winner on all data with the round count its trial settled on;
//! Logging writes the local store first and the tracking sink second, and a
//! failure in one never prevents the other.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::errors::{Result, TunerError};
use crate::evaluator::Objective;
use crate::space::{Configuration, SearchSpace};
use crate::store::{BestExperiment, LocalStore};
use crate::strategy::SearchStrategy;
use crate::tracking::{ExperimentSink, RunRecord};
use crate::trial::{best_trial, TrialRecord};

/// Metric name reported to the tracking sink
pub const METRIC_NAME: &str = "binary_logloss";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    NotStarted,
    Searching,
    Refitting,
    Logging,
    Done,
}

/// Result of one persistence path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SinkStatus {
    Written { location: String },
    Failed { error: String },
}

impl SinkStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, SinkStatus::Written { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceOutcome {
    pub local: SinkStatus,
    pub tracking: SinkStatus,
}

impl PersistenceOutcome {
    pub fn is_complete(&self) -> bool {
        self.local.is_written() && self.tracking.is_written()
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct BestResult<M> {
    pub run_id: u32,
    pub best_trial_id: usize,
    /// `num_boost_round` replaced by the rounds the trial actually used
    pub best_configuration: Configuration,
    pub model: M,
    pub validation_loss: f64,
    /// Every trial in evaluation order
    pub trials: Vec<TrialRecord>,
    pub persistence: PersistenceOutcome,
}

/// Sequential search driver
pub struct Optimizer<S, O> {
    space: SearchSpace,
    strategy: S,
    objective: O,
    max_evaluations: usize,
    run_id: u32,
    reuse_experiment: bool,
    phase: Phase,
    history: Vec<TrialRecord>,
}

impl<S, O> Optimizer<S, O>
where
    S: SearchStrategy,
    O: Objective,
{
    pub fn new(space: SearchSpace, strategy: S, objective: O, max_evaluations: usize) -> Self {
        Self {
            space,
            strategy,
            objective,
            max_evaluations,
            run_id: 0,
            reuse_experiment: false,
            phase: Phase::NotStarted,
            history: Vec::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: u32) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_reuse_experiment(mut self, reuse: bool) -> Self {
        self.reuse_experiment = reuse;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[TrialRecord] {
        &self.history
    }

    pub fn objective(&self) -> &O {
        &self.objective
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Run the full search once
    #[instrument(skip_all, fields(run_id = self.run_id, strategy = self.strategy.name()))]
    pub fn optimize(
        &mut self,
        store: &LocalStore,
        sink: &mut dyn ExperimentSink,
    ) -> Result<BestResult<O::Model>> {
        if self.phase != Phase::NotStarted {
            return Err(TunerError::Configuration(format!(
                "optimizer already ran (phase {:?})",
                self.phase
            )));
        }
        if self.max_evaluations == 0 {
            return Err(TunerError::Configuration(
                "max_evaluations must be at least 1".into(),
            ));
        }
        self.space.validate()?;

        self.phase = Phase::Searching;
        self.search()?;

        self.phase = Phase::Refitting;
        let (best, model) = self.refit()?;

        self.phase = Phase::Logging;
        let persistence = self.persist(&best, &model, store, sink);

        self.phase = Phase::Done;
        info!(
            best_trial = best.trial_id,
            loss = best.loss,
            trials = self.history.len(),
            "optimization finished"
        );

        Ok(BestResult {
            run_id: self.run_id,
            best_trial_id: best.trial_id,
            best_configuration: best.configuration,
            model,
            validation_loss: best.loss,
            trials: self.history.clone(),
            persistence,
        })
    }

    fn search(&mut self) -> Result<()> {
        for trial_id in 0..self.max_evaluations {
            let configuration = self.strategy.propose(&self.space, &self.history)?;
            if !self.space.contains(&configuration) {
                return Err(TunerError::Configuration(format!(
                    "strategy '{}' proposed a configuration outside the space: {:?}",
                    self.strategy.name(),
                    configuration
                )));
            }

            let record = match self.objective.evaluate(trial_id, &configuration) {
                Ok(evaluation) => TrialRecord::succeeded(
                    trial_id,
                    configuration,
                    evaluation.loss,
                    evaluation.boosting_rounds,
                ),
                Err(err @ TunerError::Configuration(_)) => return Err(err),
                Err(err) => {
                    warn!(trial_id, %err, "trial failed, continuing search");
                    TrialRecord::failed(trial_id, configuration, err.to_string())
                }
            };

            self.history.push(record);
            self.strategy.update(&self.history);
        }
        Ok(())
    }

    fn refit(&mut self) -> Result<(BestExperiment, O::Model)> {
        let best = best_trial(&self.history).ok_or_else(|| {
            TunerError::Training(format!("all {} trials failed", self.history.len()))
        })?;

        let mut configuration = best.configuration.clone();
        if let Some(rounds) = best.boosting_rounds {
            configuration.insert("num_boost_round".to_string(), rounds as f64);
        }
        self.space.round_integers(&mut configuration);

        let best = BestExperiment {
            run_id: self.run_id,
            trial_id: best.trial_id,
            configuration,
            loss: best.loss,
        };
        let model = self.objective.refit(&best.configuration)?;
        Ok((best, model))
    }

    fn persist(
        &self,
        best: &BestExperiment,
        model: &O::Model,
        store: &LocalStore,
        sink: &mut dyn ExperimentSink,
    ) -> PersistenceOutcome {
        let local = match store.save_run(best, model, &self.history) {
            Ok(path) => SinkStatus::Written {
                location: path.display().to_string(),
            },
            Err(err) => {
                error!(%err, "local persistence failed");
                SinkStatus::Failed {
                    error: err.to_string(),
                }
            }
        };

        let tracking = match self.track(best, model, sink) {
            Ok(location) => SinkStatus::Written {
                location: location.display().to_string(),
            },
            Err(err) => {
                error!(%err, "experiment tracking failed");
                SinkStatus::Failed {
                    error: err.to_string(),
                }
            }
        };

        PersistenceOutcome { local, tracking }
    }

    fn track(
        &self,
        best: &BestExperiment,
        model: &O::Model,
        sink: &mut dyn ExperimentSink,
    ) -> Result<PathBuf> {
        let record = RunRecord {
            params: best.configuration.clone(),
            metrics: [(METRIC_NAME.to_string(), best.loss)].into_iter().collect(),
            model: serde_json::to_value(model).map_err(|e| TunerError::Tracking(e.to_string()))?,
        };
        let experiment = sink.ensure_experiment(self.reuse_experiment)?;
        let run = sink.log_run(&experiment, &record)?;
        Ok(PathBuf::from(experiment).join(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluation;
    use crate::space::ParamDomain;
    use crate::strategy::RandomSearch;
    use tempfile::tempdir;

    struct Bowl {
        calls: usize,
    }

    impl Objective for Bowl {
        type Model = Configuration;

        fn evaluate(&mut self, _trial_id: usize, configuration: &Configuration) -> Result<Evaluation> {
            self.calls += 1;
            Ok(Evaluation {
                loss: (configuration["x"] - 0.3).abs(),
                boosting_rounds: 17,
            })
        }

        fn refit(&mut self, configuration: &Configuration) -> Result<Configuration> {
            Ok(configuration.clone())
        }
    }

    struct NullSink;

    impl ExperimentSink for NullSink {
        fn ensure_experiment(&mut self, _reuse_latest: bool) -> Result<String> {
            Ok("experiment_0".into())
        }

        fn log_run(&mut self, _experiment: &str, _run: &RunRecord) -> Result<String> {
            Ok("run".into())
        }
    }

    fn space() -> SearchSpace {
        SearchSpace::new()
            .with("x", ParamDomain::Uniform { low: 0.0, high: 1.0 })
            .with("num_boost_round", ParamDomain::QUniform { low: 50.0, high: 500.0, step: 20.0 })
    }

    #[test]
    fn test_phases_and_round_substitution() {
        let dir = tempdir().unwrap();
        let mut optimizer = Optimizer::new(space(), RandomSearch::new(1), Bowl { calls: 0 }, 5);
        assert_eq!(optimizer.phase(), Phase::NotStarted);

        let result = optimizer
            .optimize(&LocalStore::new(dir.path()), &mut NullSink)
            .unwrap();

        assert_eq!(optimizer.phase(), Phase::Done);
        assert_eq!(optimizer.objective().calls, 5);
        assert_eq!(result.trials.len(), 5);
        assert_eq!(result.best_configuration["num_boost_round"], 17.0);
        assert_eq!(result.model, result.best_configuration);
        assert!(result.persistence.is_complete());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let mut optimizer = Optimizer::new(space(), RandomSearch::new(1), Bowl { calls: 0 }, 2);

        optimizer.optimize(&store, &mut NullSink).unwrap();
        let err = optimizer.optimize(&store, &mut NullSink).unwrap_err();
        assert!(matches!(err, TunerError::Configuration(_)));
        assert_eq!(optimizer.objective().calls, 2);
    }

    #[test]
    fn test_empty_space_makes_no_calls() {
        let dir = tempdir().unwrap();
        let mut optimizer =
            Optimizer::new(SearchSpace::new(), RandomSearch::new(1), Bowl { calls: 0 }, 10);

        let err = optimizer
            .optimize(&LocalStore::new(dir.path()), &mut NullSink)
            .unwrap_err();
        assert!(matches!(err, TunerError::Configuration(_)));
        assert_eq!(optimizer.objective().calls, 0);
        assert_eq!(optimizer.phase(), Phase::NotStarted);
    }
}
