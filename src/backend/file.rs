//! File Store - persistent tracking backend
//!
//! Mirrors mlflow's file store layout so existing tooling can browse it:
//!
//! ```text
//! <root>/<experiment_id>/meta.json
//! <root>/<experiment_id>/<run_id>/meta.json
//! <root>/<experiment_id>/<run_id>/params/<key>      stringified value
//! <root>/<experiment_id>/<run_id>/metrics/<key>     "<millis> <value> <step>" per line
//! <root>/<experiment_id>/<run_id>/artifacts/        run storage
//! <root>/.trash/<experiment_id>/                    deleted experiments
//! ```
//!
//! Deleted experiments keep their id claimed in `.trash`, so an id that went
//! stale is never handed out again.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::TrackingBackend;
use crate::experiment::{ExperimentId, ExperimentRecord, MetricRecord, RunRecord, RunStatus};
use crate::{Error, Result};

const META_FILE: &str = "meta.json";
const PARAMS_DIR: &str = "params";
const METRICS_DIR: &str = "metrics";
const ARTIFACTS_DIR: &str = "artifacts";
const TRASH_DIR: &str = ".trash";

/// Experiment ids start at 1; mlflow reserves 0 for its default experiment.
const FIRST_EXPERIMENT_ID: ExperimentId = ExperimentId::new(1);

/// Tracking backend persisted under a root directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    active: Option<RunRecord>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, active: None })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The active run, if any.
    #[must_use]
    pub const fn active_run(&self) -> Option<&RunRecord> {
        self.active.as_ref()
    }

    fn experiment_dir(&self, experiment_id: ExperimentId) -> PathBuf {
        self.root.join(experiment_id.to_string())
    }

    fn run_dir(&self, experiment_id: ExperimentId, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id).join(run_id)
    }

    /// All experiments, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `Io`/`Json` if a directory or `meta.json` cannot be read.
    pub fn experiments(&self) -> Result<Vec<ExperimentRecord>> {
        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_id = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<u64>().is_ok());
            if !is_id {
                continue;
            }
            // A directory without meta.json is an id being claimed right now.
            if let Some(record) = read_json::<ExperimentRecord>(&entry.path().join(META_FILE))? {
                experiments.push(record);
            }
        }
        experiments.sort_by_key(ExperimentRecord::experiment_id);
        Ok(experiments)
    }

    /// Look up an experiment by id.
    ///
    /// # Errors
    ///
    /// Returns `Io`/`Json` if `meta.json` exists but cannot be read.
    pub fn get_experiment(&self, experiment_id: ExperimentId) -> Result<Option<ExperimentRecord>> {
        read_json(&self.experiment_dir(experiment_id).join(META_FILE))
    }

    /// Look up an experiment by name.
    ///
    /// # Errors
    ///
    /// See [`experiments`](Self::experiments).
    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        Ok(self.experiments()?.into_iter().find(|e| e.name() == name))
    }

    /// Move an experiment and all of its runs into `.trash`.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentNotFound` for an unknown id, `Io` if the move fails.
    pub fn delete_experiment(&mut self, experiment_id: ExperimentId) -> Result<()> {
        if self.get_experiment(experiment_id)?.is_none() {
            return Err(Error::ExperimentNotFound(experiment_id));
        }
        if self
            .active
            .as_ref()
            .is_some_and(|run| run.experiment_id() == experiment_id)
        {
            self.active = None;
        }
        let trash = self.root.join(TRASH_DIR);
        fs::create_dir_all(&trash)?;
        fs::rename(
            self.experiment_dir(experiment_id),
            trash.join(experiment_id.to_string()),
        )?;
        debug!(experiment_id = %experiment_id, "deleted experiment");
        Ok(())
    }

    /// All runs of an experiment, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ExperimentNotFound` for an unknown id, `Io`/`Json` on read
    /// failures.
    pub fn runs(&self, experiment_id: ExperimentId) -> Result<Vec<RunRecord>> {
        if self.get_experiment(experiment_id)?.is_none() {
            return Err(Error::ExperimentNotFound(experiment_id));
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(self.experiment_dir(experiment_id))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(run) = read_json::<RunRecord>(&entry.path().join(META_FILE))? {
                runs.push(run);
            }
        }
        runs.sort_by_key(RunRecord::started_at);
        Ok(runs)
    }

    /// Parameters recorded on a run, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the params directory cannot be read.
    pub fn params(
        &self,
        experiment_id: ExperimentId,
        run_id: &str,
    ) -> Result<BTreeMap<String, String>> {
        let dir = self.run_dir(experiment_id, run_id).join(PARAMS_DIR);
        let mut params = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let key = entry.file_name().to_string_lossy().into_owned();
            params.insert(key, fs::read_to_string(entry.path())?);
        }
        Ok(params)
    }

    /// Recorded history of metric `key` on a run, in logging order.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the metric file cannot be read, `StorageError` for a
    /// malformed line.
    pub fn metric_history(
        &self,
        experiment_id: ExperimentId,
        run_id: &str,
        key: &str,
    ) -> Result<Vec<MetricRecord>> {
        validate_key(key)?;
        let path = self.run_dir(experiment_id, run_id).join(METRICS_DIR).join(key);
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| MetricRecord::from_history_line(run_id, key, line))
            .collect()
    }

    /// Highest id present in the root or in `.trash`, claimed or not.
    fn highest_claimed_id(&self) -> Result<Option<ExperimentId>> {
        let mut highest = None;
        for dir in [self.root.clone(), self.root.join(TRASH_DIR)] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let id = entry?
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<u64>().ok())
                    .map(ExperimentId::new);
                highest = highest.max(id);
            }
        }
        Ok(highest)
    }

    fn active_run_dir(&self) -> Result<PathBuf> {
        let run = self.active.as_ref().ok_or(Error::NoActiveRun)?;
        Ok(self.run_dir(run.experiment_id(), run.run_id()))
    }

    fn write_run_meta(&self, run: &RunRecord) -> Result<()> {
        let path = self
            .run_dir(run.experiment_id(), run.run_id())
            .join(META_FILE);
        fs::write(path, serde_json::to_vec_pretty(run)?)?;
        Ok(())
    }
}

impl TrackingBackend for FileStore {
    fn create_experiment(&mut self, name: &str) -> Result<ExperimentId> {
        let existing = self.experiments()?;
        if existing.iter().any(|e| e.name() == name) {
            return Err(Error::ExperimentExists(name.to_string()));
        }

        let mut id = self
            .highest_claimed_id()?
            .map_or(FIRST_EXPERIMENT_ID, ExperimentId::next);
        // create_dir is the claim; a concurrent writer makes us move on.
        let dir = loop {
            let dir = self.experiment_dir(id);
            match fs::create_dir(&dir) {
                Ok(()) => break dir,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => id = id.next(),
                Err(e) => return Err(e.into()),
            }
        };

        let record = ExperimentRecord::new(id, name, &dir);
        fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(&record)?)?;
        debug!(experiment_id = %id, name, "created experiment");
        Ok(id)
    }

    fn start_run(&mut self, experiment_id: ExperimentId) -> Result<RunRecord> {
        if self.active.is_some() {
            return Err(Error::AlreadyRunning);
        }
        if self.get_experiment(experiment_id)?.is_none() {
            return Err(Error::ExperimentNotFound(experiment_id));
        }

        let run_id = RunRecord::generate_id();
        let run_dir = self.run_dir(experiment_id, &run_id);
        for sub in [PARAMS_DIR, METRICS_DIR, ARTIFACTS_DIR] {
            fs::create_dir_all(run_dir.join(sub))?;
        }

        let mut run = RunRecord::new(run_id, experiment_id, run_dir.join(ARTIFACTS_DIR));
        run.start();
        self.write_run_meta(&run)?;
        debug!(experiment_id = %experiment_id, run_id = run.run_id(), "started run");

        self.active = Some(run.clone());
        Ok(run)
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let mut run = self.active.take().ok_or(Error::NoActiveRun)?;
        run.complete(status);
        self.write_run_meta(&run)?;
        debug!(run_id = run.run_id(), ?status, "ended run");
        Ok(())
    }

    fn artifact_uri(&self) -> Result<PathBuf> {
        self.active
            .as_ref()
            .map(|run| run.artifact_uri().to_path_buf())
            .ok_or(Error::NoActiveRun)
    }

    fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.active_run_dir()?.join(PARAMS_DIR).join(key);
        fs::write(path, value)?;
        Ok(())
    }

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        validate_key(key)?;
        let run = self.active.as_ref().ok_or(Error::NoActiveRun)?;
        let path = self
            .run_dir(run.experiment_id(), run.run_id())
            .join(METRICS_DIR)
            .join(key);
        let record = MetricRecord::new(run.run_id(), key, 0, value);

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", record.to_history_line())?;
        Ok(())
    }
}

/// Keys become file names; refuse anything that would escape the run dir.
fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::StorageError(format!(
            "invalid key {key:?}: keys must be non-empty file names"
        )));
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("mlruns")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_experiment_ids_increment() {
        let (_dir, mut store) = store();
        let a = store.create_experiment("a").unwrap();
        let b = store.create_experiment("b").unwrap();
        assert_eq!(a, FIRST_EXPERIMENT_ID);
        assert_eq!(b, a.next());
        assert_eq!(store.experiments().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (_dir, mut store) = store();
        store.create_experiment("same").unwrap();
        let err = store.create_experiment("same").unwrap_err();
        assert!(matches!(err, Error::ExperimentExists(name) if name == "same"));
    }

    #[test]
    fn test_claimed_id_is_skipped() {
        let (_dir, mut store) = store();
        // Directory claimed by another writer that has not written meta yet.
        fs::create_dir(store.root().join("1")).unwrap();
        let id = store.create_experiment("late").unwrap();
        assert_eq!(id, ExperimentId::new(2));
    }

    #[test]
    fn test_deleted_id_not_reused() {
        let (_dir, mut store) = store();
        let id = store.create_experiment("doomed").unwrap();
        store.delete_experiment(id).unwrap();
        assert!(store.get_experiment(id).unwrap().is_none());
        assert!(store.root().join(TRASH_DIR).join(id.to_string()).is_dir());

        let replacement = store.create_experiment("doomed").unwrap();
        assert_eq!(replacement, id.next());
    }

    #[test]
    fn test_start_run_unknown_experiment() {
        let (_dir, mut store) = store();
        let err = store.start_run(ExperimentId::new(99)).unwrap_err();
        assert!(matches!(err, Error::ExperimentNotFound(id) if id.get() == 99));
        assert!(store.active_run().is_none());
    }

    #[test]
    fn test_run_layout_and_records() {
        let (_dir, mut store) = store();
        let id = store.create_experiment("layout").unwrap();
        let run = store.start_run(id).unwrap();
        assert!(run.artifact_uri().ends_with("artifacts"));
        assert!(run.artifact_uri().is_dir());

        store.log_param("lr", "0.1").unwrap();
        store.log_param("lr", "0.01").unwrap();
        store.log_metric("result", 42.0).unwrap();
        store.log_metric("result", 43.0).unwrap();
        store.end_run(RunStatus::Success).unwrap();

        let params = store.params(id, run.run_id()).unwrap();
        assert_eq!(params.get("lr").map(String::as_str), Some("0.01"));

        let history = store.metric_history(id, run.run_id(), "result").unwrap();
        let values: Vec<f64> = history.iter().map(MetricRecord::value).collect();
        assert_eq!(values, vec![42.0, 43.0]);

        let runs = store.runs(id).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status(), RunStatus::Success);
        assert!(runs[0].ended_at().is_some());
    }

    #[test]
    fn test_operations_without_active_run() {
        let (_dir, mut store) = store();
        assert!(matches!(store.artifact_uri(), Err(Error::NoActiveRun)));
        assert!(matches!(store.log_param("k", "v"), Err(Error::NoActiveRun)));
        assert!(matches!(store.log_metric("k", 1.0), Err(Error::NoActiveRun)));
        assert!(matches!(store.end_run(RunStatus::Success), Err(Error::NoActiveRun)));
    }

    #[test]
    fn test_second_concurrent_run_rejected() {
        let (_dir, mut store) = store();
        let id = store.create_experiment("one-at-a-time").unwrap();
        store.start_run(id).unwrap();
        assert!(matches!(store.start_run(id), Err(Error::AlreadyRunning)));
    }

    #[test]
    fn test_path_like_keys_rejected() {
        let (_dir, mut store) = store();
        let id = store.create_experiment("keys").unwrap();
        store.start_run(id).unwrap();
        assert!(store.log_param("../escape", "x").is_err());
        assert!(store.log_param("", "x").is_err());
        assert!(store.log_param("experiment parameter", "42").is_ok());
    }
}
