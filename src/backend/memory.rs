//! Memory Backend - in-process storage for experiment tracking data
//!
//! Experiments, runs, params and metrics live in hash maps; only the run
//! artifact directories touch the filesystem, because the session writes its
//! text log and event file there.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::TrackingBackend;
use crate::experiment::{ExperimentId, ExperimentRecord, MetricRecord, RunRecord, RunStatus};
use crate::{Error, Result};

/// In-memory tracking backend.
///
/// ## Time-Series Queries
///
/// [`get_metrics_for_run`](Self::get_metrics_for_run) returns metrics
/// ordered by step, then by logging time.
#[derive(Debug)]
pub struct MemoryBackend {
    artifact_root: PathBuf,
    next_id: ExperimentId,
    experiments: HashMap<ExperimentId, ExperimentRecord>,
    runs: HashMap<String, RunRecord>,
    params: HashMap<String, BTreeMap<String, String>>,
    metrics: Vec<MetricRecord>,
    active: Option<String>,
}

impl MemoryBackend {
    /// Create an empty backend placing run artifacts below `artifact_root`.
    #[must_use]
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            next_id: ExperimentId::new(1),
            experiments: HashMap::new(),
            runs: HashMap::new(),
            params: HashMap::new(),
            metrics: Vec::new(),
            active: None,
        }
    }

    /// Directory below which run artifacts are created.
    #[must_use]
    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Check if the store is empty (no experiments, runs, or metrics).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.runs.is_empty() && self.metrics.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get_experiment(&self, experiment_id: ExperimentId) -> Option<&ExperimentRecord> {
        self.experiments.get(&experiment_id)
    }

    /// Forget an experiment; runs started against its id afterwards fail.
    pub fn delete_experiment(&mut self, experiment_id: ExperimentId) -> Option<ExperimentRecord> {
        self.experiments.remove(&experiment_id)
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Get all runs for an experiment.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment_id: ExperimentId) -> Vec<&RunRecord> {
        self.runs
            .values()
            .filter(|run| run.experiment_id() == experiment_id)
            .collect()
    }

    /// Parameters recorded on a run.
    #[must_use]
    pub fn get_params(&self, run_id: &str) -> Option<&BTreeMap<String, String>> {
        self.params.get(run_id)
    }

    /// Get metrics for a specific run and key, ordered by step.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use mlwrapper::backend::{MemoryBackend, TrackingBackend};
    ///
    /// let dir = std::env::temp_dir().join("mlwrapper-doc-memory");
    /// let mut backend = MemoryBackend::new(&dir);
    /// let id = backend.create_experiment("doc").unwrap();
    /// let run = backend.start_run(id).unwrap();
    ///
    /// backend.log_metric("loss", 0.5).unwrap();
    /// backend.log_metric("loss", 0.25).unwrap();
    ///
    /// let losses = backend.get_metrics_for_run(run.run_id(), "loss");
    /// assert_eq!(losses.len(), 2);
    /// # let _ = std::fs::remove_dir_all(dir);
    /// ```
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();

        // Stable sort keeps logging order within a step
        metrics.sort_by_key(MetricRecord::step);

        metrics
    }

    fn active_run_id(&self) -> Result<&str> {
        self.active.as_deref().ok_or(Error::NoActiveRun)
    }
}

impl TrackingBackend for MemoryBackend {
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId> {
        if self.experiments.values().any(|e| e.name() == name) {
            return Err(Error::ExperimentExists(name.to_string()));
        }
        let id = self.next_id;
        self.next_id = id.next();

        let location = self.artifact_root.join(id.to_string());
        self.experiments
            .insert(id, ExperimentRecord::new(id, name, location));
        Ok(id)
    }

    fn start_run(&mut self, experiment_id: ExperimentId) -> Result<RunRecord> {
        if self.active.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let experiment = self
            .experiments
            .get(&experiment_id)
            .ok_or(Error::ExperimentNotFound(experiment_id))?;

        let run_id = RunRecord::generate_id();
        let artifacts = experiment
            .artifact_location()
            .join(&run_id)
            .join("artifacts");
        fs::create_dir_all(&artifacts)?;

        let mut run = RunRecord::new(run_id.clone(), experiment_id, artifacts);
        run.start();
        self.runs.insert(run_id.clone(), run.clone());
        self.params.insert(run_id.clone(), BTreeMap::new());
        self.active = Some(run_id);
        Ok(run)
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let run_id = self.active.take().ok_or(Error::NoActiveRun)?;
        if let Some(run) = self.runs.get_mut(&run_id) {
            run.complete(status);
        }
        Ok(())
    }

    fn artifact_uri(&self) -> Result<PathBuf> {
        let run_id = self.active_run_id()?;
        self.runs
            .get(run_id)
            .map(|run| run.artifact_uri().to_path_buf())
            .ok_or(Error::NoActiveRun)
    }

    fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        let run_id = self.active_run_id()?.to_string();
        self.params
            .entry(run_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        let record = MetricRecord::new(self.active_run_id()?, key, 0, value);
        self.metrics.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_default() {
        let backend = MemoryBackend::new("/tmp/unused");
        assert!(backend.is_empty());
        assert_eq!(backend.experiment_count(), 0);
        assert_eq!(backend.run_count(), 0);
    }

    #[test]
    fn test_store_run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MemoryBackend::new(dir.path());

        let id = backend.create_experiment("exp").unwrap();
        let run = backend.start_run(id).unwrap();
        assert!(run.artifact_uri().is_dir());
        assert_eq!(backend.artifact_uri().unwrap(), run.artifact_uri());

        backend.log_param("batch", "32").unwrap();
        backend.log_param("batch", "64").unwrap();
        backend.end_run(RunStatus::Failed).unwrap();

        let stored = backend.get_run(run.run_id()).unwrap();
        assert_eq!(stored.status(), RunStatus::Failed);
        assert_eq!(
            backend.get_params(run.run_id()).unwrap().get("batch"),
            Some(&"64".to_string())
        );
        assert_eq!(backend.get_runs_for_experiment(id).len(), 1);
    }

    #[test]
    fn test_deleted_experiment_rejects_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MemoryBackend::new(dir.path());

        let id = backend.create_experiment("gone").unwrap();
        assert!(backend.delete_experiment(id).is_some());
        assert!(matches!(backend.start_run(id), Err(Error::ExperimentNotFound(_))));
        // Ids are never reused after deletion.
        assert_ne!(backend.create_experiment("gone").unwrap(), id);
    }

    #[test]
    fn test_get_metrics_for_run_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = MemoryBackend::new(dir.path());
        let id = backend.create_experiment("metrics").unwrap();
        let run = backend.start_run(id).unwrap();

        backend.log_metric("loss", 0.3).unwrap();
        backend.log_metric("loss", 0.2).unwrap();
        backend.log_metric("acc", 0.9).unwrap();

        let metrics = backend.get_metrics_for_run(run.run_id(), "loss");
        assert_eq!(metrics.len(), 2);
        assert!((metrics[0].value() - 0.3).abs() < f64::EPSILON);
        assert!((metrics[1].value() - 0.2).abs() < f64::EPSILON);
    }
}
