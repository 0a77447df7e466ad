//! Integration tests for the search loop, its failure handling and the
//! two persistence paths

use std::collections::BTreeSet;

use anyhow::Result;
use hyperboost_features::{classify, CrossedColumn, FeatureTools, RawDataset, TrainedDataset, Value};
use hyperboost_gbdt::{Booster, CvConfig, LcgRng};
use hyperboost_tuner::{
    default_search_space, Configuration, Evaluation, ExperimentSink, FileTracker, GbdtObjective,
    LocalStore, Objective, Optimizer, ParamDomain, Phase, RandomSearch, RunRecord, SearchSpace,
    SinkStatus, TpeConfig, TpeStrategy, TrialStatus, TunerConfig, TunerError,
};
use tempfile::tempdir;

/// Smooth deterministic loss with its minimum at learning_rate 0.1, num_leaves 100
#[derive(Default)]
struct QuadraticObjective {
    calls: usize,
    fail_trials: BTreeSet<usize>,
    abort_at: Option<usize>,
}

impl Objective for QuadraticObjective {
    type Model = Configuration;

    fn evaluate(&mut self, trial_id: usize, configuration: &Configuration) -> hyperboost_tuner::errors::Result<Evaluation> {
        self.calls += 1;
        if self.abort_at == Some(trial_id) {
            return Err(TunerError::Configuration("bad parameter".into()));
        }
        if self.fail_trials.contains(&trial_id) {
            return Err(TunerError::Training("diverged".into()));
        }

        let lr = configuration["learning_rate"];
        let leaves = configuration["num_leaves"];
        let rounds = configuration["num_boost_round"];
        Ok(Evaluation {
            loss: (lr - 0.1).powi(2) * 100.0 + ((leaves - 100.0) / 100.0).powi(2),
            boosting_rounds: (rounds as usize / 2).max(1),
        })
    }

    fn refit(&mut self, configuration: &Configuration) -> hyperboost_tuner::errors::Result<Configuration> {
        Ok(configuration.clone())
    }
}

/// Sink that rejects everything
struct BrokenSink;

impl ExperimentSink for BrokenSink {
    fn ensure_experiment(&mut self, _reuse_latest: bool) -> hyperboost_tuner::errors::Result<String> {
        Err(TunerError::Tracking("tracking server unreachable".into()))
    }

    fn log_run(&mut self, _experiment: &str, _run: &RunRecord) -> hyperboost_tuner::errors::Result<String> {
        Err(TunerError::Tracking("tracking server unreachable".into()))
    }
}

fn tpe(seed: u64) -> TpeStrategy {
    TpeStrategy::new(TpeConfig {
        n_startup_trials: 5,
        seed,
        ..TpeConfig::default()
    })
}

#[test]
fn test_zero_evaluations_makes_no_calls() -> Result<()> {
    let dir = tempdir()?;
    let mut optimizer = Optimizer::new(default_search_space(), tpe(1), QuadraticObjective::default(), 0);

    let err = optimizer
        .optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))
        .unwrap_err();

    assert!(matches!(err, TunerError::Configuration(_)));
    assert_eq!(optimizer.objective().calls, 0);
    assert!(optimizer.history().is_empty());
    Ok(())
}

#[test]
fn test_seeded_search_is_reproducible() -> Result<()> {
    let run = |seed: u64| -> Result<(Configuration, usize, f64)> {
        let dir = tempdir()?;
        let mut optimizer =
            Optimizer::new(default_search_space(), tpe(seed), QuadraticObjective::default(), 30);
        let result = optimizer.optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))?;
        Ok((result.best_configuration, result.trials.len(), result.validation_loss))
    };

    let (first_config, first_trials, first_loss) = run(42)?;
    let (second_config, second_trials, second_loss) = run(42)?;

    assert_eq!(first_config, second_config);
    assert_eq!(first_loss, second_loss);
    assert_eq!(first_trials, 30);
    assert_eq!(second_trials, 30);
    Ok(())
}

#[test]
fn test_proposals_stay_in_bounds_and_integers_are_whole() -> Result<()> {
    let dir = tempdir()?;
    let space = default_search_space();
    let mut optimizer = Optimizer::new(space.clone(), tpe(5), QuadraticObjective::default(), 40);
    let result = optimizer.optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))?;

    for trial in &result.trials {
        assert!(space.contains(&trial.configuration));
        assert_eq!(trial.configuration["num_leaves"].fract(), 0.0);
        assert_eq!(trial.configuration["num_boost_round"].fract(), 0.0);
    }
    let best = &result.trials[result.best_trial_id];
    assert_eq!(
        result.best_configuration["num_boost_round"],
        best.boosting_rounds.expect("successful trial") as f64
    );
    Ok(())
}

#[test]
fn test_failed_trials_are_recorded_and_skipped() -> Result<()> {
    let dir = tempdir()?;
    let objective = QuadraticObjective {
        fail_trials: [0, 3].into_iter().collect(),
        ..QuadraticObjective::default()
    };
    let mut optimizer = Optimizer::new(default_search_space(), RandomSearch::new(8), objective, 6);
    let result = optimizer.optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))?;

    assert_eq!(result.trials.len(), 6);
    assert!(result.trials[0].loss.is_infinite());
    assert!(matches!(result.trials[3].status, TrialStatus::Failed(_)));
    assert_ne!(result.best_trial_id, 0);
    assert_ne!(result.best_trial_id, 3);
    assert!(result.validation_loss.is_finite());
    Ok(())
}

#[test]
fn test_configuration_error_aborts_search() -> Result<()> {
    let dir = tempdir()?;
    let objective = QuadraticObjective {
        abort_at: Some(2),
        ..QuadraticObjective::default()
    };
    let mut optimizer = Optimizer::new(default_search_space(), RandomSearch::new(8), objective, 10);
    let err = optimizer
        .optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))
        .unwrap_err();

    assert!(matches!(err, TunerError::Configuration(_)));
    assert_eq!(optimizer.objective().calls, 3);
    assert_eq!(optimizer.history().len(), 2);
    assert_eq!(optimizer.phase(), Phase::Searching);
    Ok(())
}

#[test]
fn test_all_trials_failing_is_training_failure() -> Result<()> {
    let dir = tempdir()?;
    let objective = QuadraticObjective {
        fail_trials: (0..4).collect(),
        ..QuadraticObjective::default()
    };
    let mut optimizer = Optimizer::new(default_search_space(), RandomSearch::new(8), objective, 4);
    let err = optimizer
        .optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))
        .unwrap_err();

    assert!(matches!(err, TunerError::Training(_)));
    assert_eq!(optimizer.phase(), Phase::Refitting);
    Ok(())
}

#[test]
fn test_broken_sink_keeps_local_artifacts() -> Result<()> {
    let dir = tempdir()?;
    let store = LocalStore::new(dir.path().join("models"));
    let mut optimizer = Optimizer::new(default_search_space(), RandomSearch::new(3), QuadraticObjective::default(), 4)
        .with_run_id(9);

    let result = optimizer.optimize(&store, &mut BrokenSink)?;

    assert!(result.persistence.local.is_written());
    assert!(matches!(result.persistence.tracking, SinkStatus::Failed { .. }));
    assert!(store.model_path(9).exists());
    assert_eq!(store.load_best_experiment(9)?.configuration, result.best_configuration);
    assert_eq!(store.load_trials(9)?, result.trials);
    assert_eq!(optimizer.phase(), Phase::Done);
    Ok(())
}

#[test]
fn test_broken_store_still_tracks() -> Result<()> {
    let dir = tempdir()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "occupied")?;
    let tracker_root = dir.path().join("mlruns");
    let mut tracker = FileTracker::new(&tracker_root);

    let mut optimizer = Optimizer::new(default_search_space(), RandomSearch::new(3), QuadraticObjective::default(), 3);
    let result = optimizer.optimize(&LocalStore::new(&blocker), &mut tracker)?;

    assert!(matches!(result.persistence.local, SinkStatus::Failed { .. }));
    assert!(result.persistence.tracking.is_written());
    let runs = tracker.runs("experiment_0")?;
    assert_eq!(runs.len(), 1);
    let logged = tracker.load_run("experiment_0", &runs[0])?;
    assert_eq!(logged.metrics["binary_logloss"], result.validation_loss);
    assert_eq!(logged.params, result.best_configuration);
    Ok(())
}

fn census_like(rows: usize) -> Result<TrainedDataset> {
    let mut rng = LcgRng::new(77);
    let educations = ["Bachelors", "HS-grad", "Masters", "Some-college"];
    let occupations = ["Sales", "Tech-support", "Exec-managerial"];
    let mut cells = Vec::with_capacity(rows);
    for _ in 0..rows {
        let age = 18.0 + (rng.next_f64() * 50.0).floor();
        let education = educations[rng.next_range(educations.len())];
        let occupation = occupations[rng.next_range(occupations.len())];
        let score = (age - 18.0) / 50.0
            + if education == "Masters" { 0.4 } else { 0.0 }
            + if occupation == "Exec-managerial" { 0.2 } else { 0.0 }
            + rng.next_f64() * 0.3;
        let label = if score > 0.8 { ">50K" } else { "<=50K" };
        cells.push(vec![
            Value::Number(age),
            Value::Text(education.to_string()),
            Value::Text(occupation.to_string()),
            Value::Text(label.to_string()),
        ]);
    }

    let raw = RawDataset::new(
        vec![
            "age".into(),
            "education".into(),
            "occupation".into(),
            "income_bracket".into(),
        ],
        cells,
    )?;
    let spec = classify(
        &raw,
        "income_bracket",
        vec![CrossedColumn::new("education", "occupation")],
    )?;
    Ok(FeatureTools::default().fit(&raw, &spec)?.transform(&raw)?)
}

#[test]
fn test_round_cap_at_upper_bound() -> Result<()> {
    let dataset = census_like(90)?;
    let mut objective = GbdtObjective::new(&dataset)?;
    let mut config = default_search_space().from_unit(&[0.5; 8]);
    config.insert("num_boost_round".into(), 500.0);

    let evaluation = objective.evaluate(0, &config)?;
    assert!(evaluation.boosting_rounds <= 500);
    assert_eq!(objective.rounds_used(0), Some(evaluation.boosting_rounds));
    Ok(())
}

#[test]
fn test_round_cap_reached_without_early_stopping() -> Result<()> {
    let dataset = census_like(90)?;
    let mut objective = GbdtObjective::new(&dataset)?.with_cv_config(CvConfig {
        early_stopping_rounds: None,
        seed: 1,
        ..CvConfig::default()
    });
    let mut config = default_search_space().from_unit(&[0.5; 8]);
    config.insert("num_boost_round".into(), 500.0);

    let evaluation = objective.evaluate(0, &config)?;
    assert_eq!(evaluation.boosting_rounds, 500);
    assert_eq!(objective.refit(&config)?.num_trees(), 500);
    Ok(())
}

#[test]
fn test_end_to_end_with_boosted_trees() -> Result<()> {
    let dir = tempdir()?;
    let dataset = census_like(120)?;
    let space = SearchSpace::new()
        .with("learning_rate", ParamDomain::Uniform { low: 0.05, high: 0.3 })
        .with("num_boost_round", ParamDomain::QUniform { low: 10.0, high: 40.0, step: 10.0 })
        .with("num_leaves", ParamDomain::QUniform { low: 4.0, high: 16.0, step: 4.0 })
        .with("min_data_in_leaf", ParamDomain::QUniform { low: 5.0, high: 10.0, step: 5.0 });

    let config = TunerConfig {
        max_evaluations: 4,
        run_id: 1,
        output_dir: dir.path().join("models"),
        tracking_dir: dir.path().join("mlruns"),
        space,
        ..TunerConfig::default()
    };
    let result = hyperboost_tuner::tune(&config, &dataset)?;

    assert_eq!(result.trials.len(), 4);
    assert!(result.persistence.is_complete());
    assert_eq!(
        result.model.num_trees(),
        result.best_configuration["num_boost_round"] as usize
    );

    let store = LocalStore::new(&config.output_dir);
    let reloaded: Booster = store.load_model(1)?;
    assert_eq!(reloaded, result.model);
    assert_eq!(
        reloaded.predict_proba_batch(dataset.features()),
        result.model.predict_proba_batch(dataset.features())
    );
    Ok(())
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn best_trial_is_never_a_failed_one(
            seed in any::<u64>(),
            failures in proptest::collection::btree_set(0usize..8, 0..7),
        ) {
            let dir = tempdir().unwrap();
            let objective = QuadraticObjective {
                fail_trials: failures.clone(),
                ..QuadraticObjective::default()
            };
            let mut optimizer = Optimizer::new(default_search_space(), RandomSearch::new(seed), objective, 8);
            let result = optimizer
                .optimize(&LocalStore::new(dir.path()), &mut FileTracker::new(dir.path().join("mlruns")))
                .unwrap();

            prop_assert_eq!(result.trials.len(), 8);
            prop_assert!(!failures.contains(&result.best_trial_id));
            let finite_min = result
                .trials
                .iter()
                .map(|t| t.loss)
                .filter(|l| l.is_finite())
                .fold(f64::INFINITY, f64::min);
            prop_assert_eq!(result.validation_loss, finite_min);
        }
    }
}
