//! Tracking backends
//!
//! A backend owns experiments, runs, parameters and metrics, and tells the
//! session where the active run's artifacts live. It tracks at most one
//! active run at a time, the way mlflow's fluent API does.
//!
//! - [`FileStore`]: persistent, mlflow-compatible directory layout
//! - [`MemoryBackend`]: in-process store for tests and dry runs
//!
//! # Example
//!
//! ```rust,no_run
//! use mlwrapper::backend::{FileStore, TrackingBackend};
//! use mlwrapper::experiment::RunStatus;
//!
//! let mut store = FileStore::open("/tmp/mlruns")?;
//! let id = store.create_experiment("baseline")?;
//! let run = store.start_run(id)?;
//! store.log_param("lr", "0.01")?;
//! store.log_metric("accuracy", 0.93)?;
//! println!("artifacts at {}", run.artifact_uri().display());
//! store.end_run(RunStatus::Success)?;
//! # Ok::<(), mlwrapper::Error>(())
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryBackend;

use std::path::PathBuf;

use crate::experiment::{ExperimentId, RunRecord, RunStatus};
use crate::Result;

/// Experiment-tracking store consumed by [`RunSession`](crate::RunSession).
pub trait TrackingBackend {
    /// Create an experiment named `name`.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentExists` if the name is taken.
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId>;

    /// Open a new run under `experiment_id` and make it the active run.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentNotFound` for an unknown id and `AlreadyRunning`
    /// if a run is already active.
    fn start_run(&mut self, experiment_id: ExperimentId) -> Result<RunRecord>;

    /// Finalize the active run with `status`.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveRun` if no run is active.
    fn end_run(&mut self, status: RunStatus) -> Result<()>;

    /// Artifact directory of the active run.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveRun` if no run is active.
    fn artifact_uri(&self) -> Result<PathBuf>;

    /// Record a parameter on the active run. Re-logging a key overwrites it.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveRun` if no run is active.
    fn log_param(&mut self, key: &str, value: &str) -> Result<()>;

    /// Record a metric value on the active run.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveRun` if no run is active.
    fn log_metric(&mut self, key: &str, value: f64) -> Result<()>;
}

impl<B: TrackingBackend + ?Sized> TrackingBackend for Box<B> {
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId> {
        (**self).create_experiment(name)
    }

    fn start_run(&mut self, experiment_id: ExperimentId) -> Result<RunRecord> {
        (**self).start_run(experiment_id)
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        (**self).end_run(status)
    }

    fn artifact_uri(&self) -> Result<PathBuf> {
        (**self).artifact_uri()
    }

    fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).log_param(key, value)
    }

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        (**self).log_metric(key, value)
    }
}
