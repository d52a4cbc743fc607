//! Experiment Tracking Schema
//!
//! Record types shared by every tracking backend.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├──< MetricRecord (N) [time-series]
//!                              └──< params (key -> stringified value)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use mlwrapper::experiment::{ExperimentId, ExperimentRecord, MetricRecord, RunRecord, RunStatus};
//!
//! let experiment = ExperimentRecord::new(ExperimentId::new(1), "My Experiment", "/tmp/mlruns/1");
//!
//! let mut run = RunRecord::new("run-001", experiment.experiment_id(), "/tmp/mlruns/1/run-001/artifacts");
//! run.start();
//!
//! let metric = MetricRecord::new(run.run_id(), "loss", 0, 0.5);
//! assert_eq!(metric.key(), "loss");
//!
//! run.complete(RunStatus::Success);
//! ```

mod experiment_record;
mod metric_record;
mod run_record;

pub use experiment_record::{ExperimentId, ExperimentRecord};
pub use metric_record::MetricRecord;
pub use run_record::{RunRecord, RunStatus};
