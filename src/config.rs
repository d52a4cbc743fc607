//! Session configuration and the run parameter mapping.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::experiment::ExperimentId;
use crate::session::SessionBuilder;
use crate::{Error, Result};

/// Ordered `key -> value` parameters recorded into a run.
///
/// Values are stored in their display form, which is exactly what lands in
/// the run's `params/<key>` file. Inserting an existing key overwrites its
/// value in place (last write wins, original position kept).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Display) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Look up the stored value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parameter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Serializable mirror of [`SessionBuilder`], e.g. for a `run.json` next to
/// a training script.
///
/// ```json
/// {
///   "tracking_dir": "/tmp/mlruns",
///   "experiment_name": "resnet",
///   "log_level": "info",
///   "params": { "lr": 0.01, "optimizer": "adam" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Root of the tracking store.
    pub tracking_dir: PathBuf,
    /// Experiment name to create (or collide with).
    #[serde(default)]
    pub experiment_name: Option<String>,
    /// Append runs to an existing experiment instead of creating one.
    #[serde(default)]
    pub append_to_experiment_id: Option<u64>,
    /// Mirror the run log to stderr.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// Level filter for the run log (`off`, `error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Scalar parameters recorded on every run start.
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

const fn default_verbose() -> bool {
    true
}

fn default_log_level() -> String {
    "error".to_string()
}

impl SessionConfig {
    /// Config with defaults for everything but the tracking directory.
    #[must_use]
    pub fn new(tracking_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracking_dir: tracking_dir.into(),
            experiment_name: None,
            append_to_experiment_id: None,
            verbose: default_verbose(),
            log_level: default_log_level(),
            params: BTreeMap::new(),
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Json` if the document does not match the schema.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, `Json` if it does not parse.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parsed log level.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an unknown level name.
    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|e| Error::InvalidConfig(format!("log_level {:?}: {e}", self.log_level)))
    }

    /// Parameters stringified the way they are persisted: strings verbatim,
    /// numbers and booleans in display form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for null, array or object values.
    pub fn params(&self) -> Result<Params> {
        let mut params = Params::new();
        for (key, value) in &self.params {
            match value {
                serde_json::Value::String(s) => params.insert(key, s),
                serde_json::Value::Number(n) => params.insert(key, n),
                serde_json::Value::Bool(b) => params.insert(key, b),
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "param {key:?} must be a string, number or bool, got {other}"
                    )))
                }
            }
        }
        Ok(params)
    }

    /// Validate and convert into a session builder.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the level or a parameter is invalid.
    pub fn into_builder(self) -> Result<SessionBuilder> {
        let level = self.level_filter()?;
        let params = self.params()?;

        let mut builder = SessionBuilder::new(self.tracking_dir)
            .verbose(self.verbose)
            .log_level(level)
            .params(params);
        if let Some(name) = self.experiment_name {
            builder = builder.experiment_name(name);
        }
        if let Some(id) = self.append_to_experiment_id {
            builder = builder.append_to_experiment(ExperimentId::new(id));
        }
        Ok(builder)
    }
}
