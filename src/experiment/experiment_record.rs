//! Experiment Record - root entity for experiment tracking

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Integer identifier of an experiment within one tracking store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(u64);

impl ExperimentId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw integer id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for ExperimentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Experiment Record represents a tracked experiment.
///
/// This is the root entity in the experiment tracking schema.
/// Each experiment can have multiple runs, all stored below
/// `artifact_location`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: ExperimentId,
    name: String,
    artifact_location: PathBuf,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// Create a new experiment record with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Store-unique identifier for the experiment
    /// * `name` - Human-readable, store-unique name
    /// * `artifact_location` - Directory that holds the experiment's runs
    #[must_use]
    pub fn new(
        experiment_id: ExperimentId,
        name: impl Into<String>,
        artifact_location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            experiment_id,
            name: name.into(),
            artifact_location: artifact_location.into(),
            created_at: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub const fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the directory holding this experiment's runs.
    #[must_use]
    pub fn artifact_location(&self) -> &Path {
        &self.artifact_location
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
