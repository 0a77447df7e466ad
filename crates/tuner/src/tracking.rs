//! Experiment tracking
//!
//! The optimizer reports the winning run to an [`ExperimentSink`].
//! [`FileTracker`] is a directory-backed sink laid out like an `mlruns/`
//! store: one `experiment_{n}` directory per experiment and one directory per
//! run, named by a random UUID.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{Result, TunerError};

/// What gets logged for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub params: BTreeMap<String, f64>,
    pub metrics: BTreeMap<String, f64>,
    /// Serialized model
    pub model: serde_json::Value,
}

/// Destination for experiment runs
pub trait ExperimentSink {
    /// Experiment to log into; a fresh one unless `reuse_latest`
    fn ensure_experiment(&mut self, reuse_latest: bool) -> Result<String>;

    /// Record a run, returning the sink's run id
    fn log_run(&mut self, experiment: &str, run: &RunRecord) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub experiment: String,
    pub status: String,
    pub end_time: String,
}

/// Directory-backed experiment store
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
}

impl FileTracker {
    const PREFIX: &'static str = "experiment_";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Existing experiment numbers, ascending
    pub fn experiments(&self) -> Result<Vec<usize>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(tracking_io)? {
            let entry = entry.map_err(tracking_io)?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(n) = name
                .to_str()
                .and_then(|s| s.strip_prefix(Self::PREFIX))
                .and_then(|s| s.parse::<usize>().ok())
            {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Run ids logged under an experiment
    pub fn runs(&self, experiment: &str) -> Result<Vec<String>> {
        let dir = self.root.join(experiment);
        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir).map_err(tracking_io)? {
            let entry = entry.map_err(tracking_io)?;
            if entry.path().is_dir() {
                runs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        runs.sort();
        Ok(runs)
    }

    pub fn load_run(&self, experiment: &str, run_id: &str) -> Result<RunRecord> {
        let dir = self.root.join(experiment).join(run_id);
        Ok(RunRecord {
            params: read_json(&dir.join("params.json"))?,
            metrics: read_json(&dir.join("metrics.json"))?,
            model: read_json(&dir.join("model.json"))?,
        })
    }

    fn create_experiment(&self, number: usize) -> Result<String> {
        let name = format!("{}{}", Self::PREFIX, number);
        let dir = self.root.join(&name);
        fs::create_dir_all(&dir).map_err(tracking_io)?;
        write_json(
            &dir.join("meta.json"),
            &ExperimentMeta {
                name: name.clone(),
                created_at: Utc::now().to_rfc3339(),
            },
        )?;
        info!(experiment = %name, "created experiment");
        Ok(name)
    }
}

impl ExperimentSink for FileTracker {
    fn ensure_experiment(&mut self, reuse_latest: bool) -> Result<String> {
        let existing = self.experiments()?;
        match existing.last() {
            Some(&latest) if reuse_latest => Ok(format!("{}{}", Self::PREFIX, latest)),
            Some(&latest) => self.create_experiment(latest + 1),
            None => self.create_experiment(0),
        }
    }

    fn log_run(&mut self, experiment: &str, run: &RunRecord) -> Result<String> {
        let experiment_dir = self.root.join(experiment);
        if !experiment_dir.is_dir() {
            return Err(TunerError::Tracking(format!(
                "experiment '{}' does not exist",
                experiment
            )));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let dir = experiment_dir.join(&run_id);
        fs::create_dir_all(&dir).map_err(tracking_io)?;

        write_json(&dir.join("params.json"), &run.params)?;
        write_json(&dir.join("metrics.json"), &run.metrics)?;
        write_json(&dir.join("model.json"), &run.model)?;
        write_json(
            &dir.join("meta.json"),
            &RunMeta {
                run_id: run_id.clone(),
                experiment: experiment.to_string(),
                status: "FINISHED".to_string(),
                end_time: Utc::now().to_rfc3339(),
            },
        )?;

        debug!(experiment, run_id = %run_id, "run logged");
        Ok(run_id)
    }
}

fn tracking_io(err: std::io::Error) -> TunerError {
    TunerError::Tracking(err.to_string())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| TunerError::Tracking(e.to_string()))?;
    fs::write(path, json).map_err(tracking_io)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).map_err(tracking_io)?;
    Ok(serde_json::from_str(&json)?)
}
