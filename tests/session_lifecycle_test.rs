//! Session lifecycle tests against the file store
//!
//! Experiment identity across runs, the wrapped-function form, idle-state
//! errors and recovery from stale or colliding experiments.

use std::collections::HashSet;
use std::fs;

use mlwrapper::experiment::RunStatus;
use mlwrapper::{Error, ExperimentId, FileStore, Params, RunSession, TrackingBackend};
use ndarray::Array4;
use tempfile::TempDir;
use tracing::Level;

fn quiet_session(dir: &TempDir) -> RunSession {
    RunSession::builder(dir.path())
        .verbose(false)
        .build()
        .unwrap()
}

// =============================================================================
// Experiment identity
// =============================================================================

#[test]
fn test_same_session_reuses_experiment() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = quiet_session(&dir);

    let mut ids = HashSet::new();
    for _ in 0..5 {
        session.start().unwrap();
        ids.insert(session.experiment_id().unwrap());
        session.end();
    }
    assert_eq!(ids.len(), 1);

    let id = *ids.iter().next().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.runs(id).unwrap().len(), 5);
}

#[test]
fn test_fresh_sessions_get_distinct_experiments() {
    let dir = tempfile::tempdir().unwrap();

    let mut ids = HashSet::new();
    for _ in 0..5 {
        let mut session = quiet_session(&dir);
        session.start().unwrap();
        ids.insert(session.experiment_id().unwrap());
        session.end();
    }
    assert_eq!(ids.len(), 5);
}

#[test]
fn test_append_to_existing_experiment() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = quiet_session(&dir);
    first.start().unwrap();
    let id = first.experiment_id().unwrap();
    first.end();

    let mut second = RunSession::builder(dir.path())
        .verbose(false)
        .append_to_experiment(id)
        .build()
        .unwrap();
    second.start().unwrap();
    assert_eq!(second.experiment_id(), Some(id));
    second.end();

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.experiments().unwrap().len(), 1);
    assert_eq!(store.runs(id).unwrap().len(), 2);
}

#[test]
fn test_named_experiment_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = RunSession::builder(dir.path())
        .experiment_name("mnist")
        .verbose(false)
        .build()
        .unwrap();
    session.start().unwrap();
    session.end();

    let store = FileStore::open(dir.path()).unwrap();
    let record = store.get_experiment_by_name("mnist").unwrap().unwrap();
    assert_eq!(Some(record.experiment_id()), session.experiment_id());
    assert_eq!(session.experiment_name(), Some("mnist"));
}

// =============================================================================
// Wrapped functions
// =============================================================================

#[test]
fn test_wrapped_function_runs_each_call_in_one_experiment() {
    let dir = tempfile::tempdir().unwrap();
    let mut train = quiet_session(&dir).wrap(|steps: i64, run: &mut RunSession| {
        assert!(run.is_running());
        for step in 0..steps {
            run.log_scalar("loss", 1.0 / (step as f64 + 1.0), step)?;
        }
        Ok::<_, Error>(steps * 2)
    });

    assert_eq!(train.call(Params::new().with("lr", 0.1), 5).unwrap(), 10);
    assert_eq!(train.call(Params::new().with("lr", 0.01), 3).unwrap(), 6);
    assert!(!train.session().is_running());

    let id = train.session().experiment_id().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let runs = store.runs(id).unwrap();
    assert_eq!(runs.len(), 2);

    let mut lrs: Vec<String> = runs
        .iter()
        .map(|run| store.params(id, run.run_id()).unwrap()["lr"].clone())
        .collect();
    lrs.sort();
    assert_eq!(lrs, vec!["0.01".to_string(), "0.1".to_string()]);
}

#[test]
fn test_wrapped_function_error_ends_run_failed() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = quiet_session(&dir).wrap(|(): (), _run: &mut RunSession| {
        Err::<(), _>(Error::Other("out of memory".to_string()))
    });

    let result = job.call(Params::new(), ());
    assert!(matches!(result, Err(Error::Other(_))));
    assert!(!job.session().is_running());

    let id = job.session().experiment_id().unwrap();
    let runs = FileStore::open(dir.path()).unwrap().runs(id).unwrap();
    assert_eq!(runs[0].status(), RunStatus::Failed);
    assert!(runs[0].ended_at().is_some());
}

// =============================================================================
// Idle-state contract
// =============================================================================

#[test]
fn test_logging_while_idle_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = quiet_session(&dir);
    let images = Array4::<u8>::zeros((1, 4, 4, 1));

    assert!(matches!(session.log_args(&Params::new()), Err(Error::NotRunning)));
    assert!(matches!(session.log_scalar("loss", 1.0, 0), Err(Error::NotRunning)));
    assert!(matches!(
        session.log_images("digits", &images, 0, false),
        Err(Error::NotRunning)
    ));
    assert!(matches!(session.log_metric("acc", 0.5), Err(Error::NotRunning)));
    assert!(matches!(
        session.log_text(Level::INFO, "hello"),
        Err(Error::NotRunning)
    ));

    // Same contract after a completed run
    session.start().unwrap();
    session.end();
    assert!(matches!(session.log_scalar("loss", 1.0, 0), Err(Error::NotRunning)));
}

#[test]
fn test_end_when_idle_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = quiet_session(&dir);
    session.end();
    assert!(!session.is_running());
    assert!(FileStore::open(dir.path()).unwrap().experiments().unwrap().is_empty());
}

#[test]
fn test_guard_ends_run_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = quiet_session(&dir);
    {
        let mut run = session.enter().unwrap();
        run.log_metric("acc", 0.9).unwrap();
        assert!(run.is_running());
    }
    assert!(!session.is_running());

    let id = session.experiment_id().unwrap();
    let runs = FileStore::open(dir.path()).unwrap().runs(id).unwrap();
    assert_eq!(runs[0].status(), RunStatus::Success);
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_stale_experiment_id_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::open(dir.path()).unwrap();
    let stale = store.create_experiment("short-lived").unwrap();
    store.delete_experiment(stale).unwrap();

    let mut session = RunSession::builder(dir.path())
        .verbose(false)
        .append_to_experiment(stale)
        .build()
        .unwrap();
    session.start().unwrap();
    let fresh = session.experiment_id().unwrap();
    assert_ne!(fresh, stale);
    session.end();

    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.get_experiment(stale).unwrap().is_none());
    assert_eq!(store.runs(fresh).unwrap().len(), 1);
}

#[test]
fn test_never_created_experiment_id_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = RunSession::builder(dir.path())
        .verbose(false)
        .append_to_experiment(ExperimentId::new(999))
        .build()
        .unwrap();
    session.start().unwrap();
    assert_ne!(session.experiment_id(), Some(ExperimentId::new(999)));
    session.end();
}

#[test]
fn test_name_collision_falls_back_to_random_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::open(dir.path()).unwrap();
    let taken = store.create_experiment("resnet").unwrap();

    let mut session = RunSession::builder(dir.path())
        .experiment_name("resnet")
        .verbose(false)
        .build()
        .unwrap();
    session.start().unwrap();
    assert_ne!(session.experiment_id(), Some(taken));
    assert_ne!(session.experiment_name(), Some("resnet"));
    session.end();

    assert_eq!(FileStore::open(dir.path()).unwrap().experiments().unwrap().len(), 2);
}

#[test]
fn test_start_after_failed_body_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = quiet_session(&dir);

    let failed: mlwrapper::Result<()> =
        session.scoped(|_| Err(Error::Other("diverged".to_string())));
    assert!(failed.is_err());
    assert!(!session.is_running());

    session.start().unwrap();
    session.log_scalar("loss", 0.5, 0).unwrap();
    session.end();

    let id = session.experiment_id().unwrap();
    let statuses: Vec<RunStatus> = FileStore::open(dir.path())
        .unwrap()
        .runs(id)
        .unwrap()
        .iter()
        .map(|run| run.status())
        .collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&RunStatus::Failed));
    assert!(statuses.contains(&RunStatus::Success));
}

#[test]
fn test_run_log_written_at_configured_level() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = RunSession::builder(dir.path())
        .experiment_name("verbose-log")
        .verbose(false)
        .log_level(tracing::level_filters::LevelFilter::INFO)
        .build()
        .unwrap();

    session.start().unwrap();
    let log_path = session.logger().unwrap().path().to_path_buf();
    session.log_text(Level::INFO, "epoch 1 done").unwrap();
    session.log_text(Level::DEBUG, "batch detail").unwrap();
    session.end();

    let log = fs::read_to_string(log_path).unwrap();
    assert!(log.contains("MLWrapper started with name verbose-log and id"));
    assert!(log.contains("epoch 1 done"));
    assert!(!log.contains("batch detail"));
    assert!(log.contains("MLWrapper run finished"));
}
