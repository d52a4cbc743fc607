//! Metric Record - time-series metrics for runs

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Metric Record represents a single metric data point.
///
/// Metrics logged through a session carry step 0; the step field keeps
/// the record compatible with step-indexed histories in the file store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `key` - Metric name/key (e.g., "loss", "accuracy")
    /// * `step` - Training step or epoch number
    /// * `value` - Metric value
    ///
    /// # Returns
    ///
    /// A new `MetricRecord` with the current timestamp.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step/epoch number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Render as one line of an mlflow metric file: `<millis> <value> <step>`.
    #[must_use]
    pub fn to_history_line(&self) -> String {
        format!(
            "{} {} {}",
            self.timestamp.timestamp_millis(),
            format_value(self.value),
            self.step
        )
    }

    /// Parse one line of an mlflow metric file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the line does not have three fields or a
    /// field does not parse.
    pub fn from_history_line(
        run_id: impl Into<String>,
        key: impl Into<String>,
        line: &str,
    ) -> Result<Self> {
        let malformed = || Error::StorageError(format!("malformed metric line: {line:?}"));
        let mut fields = line.split_whitespace();
        let (Some(millis), Some(value), Some(step), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        let millis: i64 = millis.parse().map_err(|_| malformed())?;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(malformed)?;

        Ok(Self {
            run_id: run_id.into(),
            key: key.into(),
            step: step.parse().map_err(|_| malformed())?,
            value: value.parse().map_err(|_| malformed())?,
            timestamp,
        })
    }
}

/// Float text as mlflow writes it: `42.0` rather than `42`, `nan`, `inf`.
#[allow(clippy::float_cmp)]
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
