//! Trial audit records

use serde::{Deserialize, Serialize};

use crate::space::Configuration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum TrialStatus {
    Ok,
    Failed(String),
}

/// One evaluated configuration. Failed trials carry an infinite loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub configuration: Configuration,
    /// Written as `null` when infinite
    #[serde(with = "loss_repr")]
    pub loss: f64,
    pub boosting_rounds: Option<usize>,
    pub status: TrialStatus,
}

impl TrialRecord {
    pub fn succeeded(trial_id: usize, configuration: Configuration, loss: f64, boosting_rounds: usize) -> Self {
        Self {
            trial_id,
            configuration,
            loss,
            boosting_rounds: Some(boosting_rounds),
            status: TrialStatus::Ok,
        }
    }

    pub fn failed(trial_id: usize, configuration: Configuration, reason: impl Into<String>) -> Self {
        Self {
            trial_id,
            configuration,
            loss: f64::INFINITY,
            boosting_rounds: None,
            status: TrialStatus::Failed(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TrialStatus::Ok
    }
}

mod loss_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(loss: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if loss.is_finite() {
            serializer.serialize_some(loss)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// Lowest finite loss; ties go to the earliest trial
pub fn best_trial(history: &[TrialRecord]) -> Option<&TrialRecord> {
    history
        .iter()
        .filter(|t| t.is_ok() && t.loss.is_finite())
        .fold(None, |best: Option<&TrialRecord>, trial| match best {
            Some(current) if current.loss <= trial.loss => Some(current),
            _ => Some(trial),
        })
}
