//! Run sessions
//!
//! A [`RunSession`] owns one experiment identity and opens runs into it.
//! It is idle after construction, active between [`start`](RunSession::start)
//! and [`end`](RunSession::end), and can be started again afterwards; every
//! run of one session lands in the same experiment.
//!
//! Three ways to drive it, all built on the same `start`/`end` pair:
//!
//! - explicit: `start()?`, log, `end()`
//! - scoped: [`enter`](RunSession::enter) returns a guard that ends the run
//!   when dropped, [`scoped`](RunSession::scoped) runs a closure inside one
//! - wrapped: [`wrap`](RunSession::wrap) turns a function into one that runs
//!   as its own run on every call
//!
//! # Example
//!
//! ```rust,no_run
//! use mlwrapper::RunSession;
//!
//! let mut session = RunSession::builder("/tmp/mlruns")
//!     .experiment_name("mnist")
//!     .param("lr", 0.01)
//!     .build()?;
//!
//! session.scoped(|run| {
//!     for step in 0..50 {
//!         run.log_scalar("loss", 1.0 / (step as f64 + 1.0), step)?;
//!     }
//!     run.log_metric("accuracy", 0.97)
//! })?;
//! # Ok::<(), mlwrapper::Error>(())
//! ```

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing::{debug, warn, Level};
use uuid::Uuid;

use crate::backend::{FileStore, TrackingBackend};
use crate::config::Params;
use crate::experiment::{ExperimentId, RunRecord, RunStatus};
use crate::logger::RunLogger;
use crate::summary::{to_nhwc, EventWriter, ImageSource};
use crate::{Error, Result};

/// Resolved `(name, id)` of the experiment a session writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentIdentity {
    name: String,
    id: ExperimentId,
}

impl ExperimentIdentity {
    /// Experiment name (possibly a generated one).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Experiment id.
    #[must_use]
    pub const fn id(&self) -> ExperimentId {
        self.id
    }
}

/// Handles that exist only while a run is active.
#[derive(Debug)]
struct ActiveRun {
    run: RunRecord,
    storage: PathBuf,
    logger: RunLogger,
    writer: EventWriter,
}

/// Lifecycle and logging for runs of one experiment.
#[derive(Debug)]
pub struct RunSession<B: TrackingBackend = FileStore> {
    backend: B,
    experiment_name: Option<String>,
    experiment_id: Option<ExperimentId>,
    verbose: bool,
    log_level: LevelFilter,
    params: Params,
    active: Option<ActiveRun>,
}

impl RunSession<FileStore> {
    /// Start configuring a session over a file store at `tracking_dir`.
    #[must_use]
    pub fn builder(tracking_dir: impl Into<PathBuf>) -> SessionBuilder {
        SessionBuilder::new(tracking_dir)
    }

    /// Root of the tracking store.
    #[must_use]
    pub fn tracking_dir(&self) -> &Path {
        self.backend.root()
    }
}

impl<B: TrackingBackend> RunSession<B> {
    /// Whether a run is active.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Experiment id, once resolved (or when appending).
    #[must_use]
    pub const fn experiment_id(&self) -> Option<ExperimentId> {
        self.experiment_id
    }

    /// Experiment name; replaced by a generated one on collision.
    #[must_use]
    pub fn experiment_name(&self) -> Option<&str> {
        self.experiment_name.as_deref()
    }

    /// Storage directory of the active run.
    #[must_use]
    pub fn storage(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.storage.as_path())
    }

    /// Record of the active run, as it was when the run started.
    #[must_use]
    pub fn run(&self) -> Option<&RunRecord> {
        self.active.as_ref().map(|a| &a.run)
    }

    /// Text logger of the active run.
    #[must_use]
    pub fn logger(&self) -> Option<&RunLogger> {
        self.active.as_ref().map(|a| &a.logger)
    }

    /// Parameters logged at every run start.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Replace the parameters logged at every run start.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Whether the run log is mirrored to stderr.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Level filter of the run log.
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    /// The tracking backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve the experiment, open a run, and set up the run log and event
    /// writer. Constructor parameters are logged before returning.
    ///
    /// A stale experiment id is replaced by a newly created experiment once;
    /// a second failure is returned.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if a run is active, collision errors that
    /// survive the single retry, and any backend or storage error from
    /// setup. On a setup error the run is ended as `Failed`.
    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let experiment_id = match self.experiment_id {
            Some(id) => id,
            None => self.ensure_experiment()?.id(),
        };
        let run = match self.backend.start_run(experiment_id) {
            Ok(run) => run,
            Err(Error::ExperimentNotFound(stale)) => {
                warn!(experiment_id = %stale, "experiment not found, creating a new one");
                let id = self.ensure_experiment()?.id();
                self.backend.start_run(id)?
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.activate(run) {
            self.active = None;
            if let Err(end_err) = self.backend.end_run(RunStatus::Failed) {
                warn!(error = %end_err, "failed to end run after setup error");
            }
            return Err(e);
        }
        Ok(())
    }

    fn activate(&mut self, run: RunRecord) -> Result<()> {
        let storage = self.backend.artifact_uri()?;
        let logger = RunLogger::new(&storage, self.log_level, self.verbose)?;
        let writer = EventWriter::create(&storage)?;

        logger.info(&format!(
            "MLWrapper started with name {} and id {}",
            self.experiment_name.as_deref().unwrap_or("<unnamed>"),
            run.experiment_id()
        ));
        self.active = Some(ActiveRun {
            run,
            storage,
            logger,
            writer,
        });

        self.log_args(&Params::new())
    }

    /// Create this session's experiment and remember it.
    ///
    /// The configured name is tried first (a random one if none was set); if
    /// it is taken, one random uuid name is tried.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the second attempt also fails.
    pub fn ensure_experiment(&mut self) -> Result<ExperimentIdentity> {
        let name = self.experiment_name.clone().unwrap_or_else(random_name);
        let identity = match self.backend.create_experiment(&name) {
            Ok(id) => ExperimentIdentity { name, id },
            Err(Error::ExperimentExists(taken)) => {
                let fresh = random_name();
                debug!(taken = %taken, fresh = %fresh, "experiment name taken, using a random name");
                let id = self.backend.create_experiment(&fresh)?;
                ExperimentIdentity { name: fresh, id }
            }
            Err(e) => return Err(e),
        };

        self.experiment_name = Some(identity.name.clone());
        self.experiment_id = Some(identity.id);
        Ok(identity)
    }

    /// End the active run as `Success`. See [`end_with`](Self::end_with).
    pub fn end(&mut self) {
        self.end_with(RunStatus::Success);
    }

    /// End the active run with `status` and release the run log and event
    /// writer. Never fails: teardown errors go to the run log at warn level.
    /// No-op when idle.
    pub fn end_with(&mut self, status: RunStatus) {
        let Some(ActiveRun { logger, writer, .. }) = self.active.take() else {
            return;
        };

        if let Err(e) = writer.close() {
            logger.warn(&format!("failed to flush summary writer: {e}"));
        }
        if let Err(e) = self.backend.end_run(status) {
            logger.warn(&format!("failed to end run: {e}"));
        }
        logger.info("MLWrapper run finished");
    }

    /// Start a run and return a guard that ends it when dropped.
    ///
    /// The run ends as `Failed` if the guard is dropped while panicking,
    /// otherwise with the guard's status (`Success` unless changed).
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub fn enter(&mut self) -> Result<RunGuard<'_, B>> {
        self.start()?;
        Ok(RunGuard {
            session: self,
            status: RunStatus::Success,
        })
    }

    /// Run `body` inside a run. The run is ended on every path; `body`'s
    /// error is returned unchanged and marks the run `Failed`.
    ///
    /// # Errors
    ///
    /// Returns start errors (converted into `E`) or `body`'s error.
    pub fn scoped<R, E>(
        &mut self,
        body: impl FnOnce(&mut Self) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<Error>,
    {
        let mut guard = self.enter()?;
        let result = body(&mut guard);
        if result.is_err() {
            guard.set_status(RunStatus::Failed);
        }
        result
    }

    /// Turn `func` into a function that runs as its own run on every call.
    ///
    /// The experiment is resolved on the first call and reused by later
    /// calls of the returned value.
    #[must_use]
    pub fn wrap<F>(self, func: F) -> Decorated<F, B> {
        Decorated { session: self, func }
    }

    /// Record the session parameters, then `extra`, on the active run.
    /// Later keys overwrite earlier ones.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when idle, or the backend error.
    pub fn log_args(&mut self, extra: &Params) -> Result<()> {
        let active = self.active.as_ref().ok_or(Error::NotRunning)?;
        active.logger.debug("Attempt to log arguments");
        for (key, value) in self.params.iter().chain(extra.iter()) {
            self.backend.log_param(key, value)?;
        }
        Ok(())
    }

    /// Write one scalar at `step` to the event file.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when idle, or `Io` if the write fails.
    pub fn log_scalar(&mut self, tag: &str, value: f64, step: i64) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NotRunning)?;
        active.logger.debug("Attempt to log scalar");
        #[allow(clippy::cast_possible_truncation)]
        let value = value as f32;
        active.writer.write_scalar(tag, value, step)
    }

    /// Write an image batch at `step` and flush the event file.
    ///
    /// `images` is `[b, h, w, c]`, or `[b, c, h, w]` with `channel_first`.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when idle, `UnsupportedImageType` for shapeless
    /// input, `InvalidImageShape` for a rank other than 4 or an unsupported
    /// channel count, and `Io`/`Image` if writing fails.
    pub fn log_images<I>(
        &mut self,
        description: &str,
        images: &I,
        step: i64,
        channel_first: bool,
    ) -> Result<()>
    where
        I: ImageSource + ?Sized,
    {
        let active = self.active.as_mut().ok_or(Error::NotRunning)?;
        active.logger.debug("Attempt to log image/s");
        let batch = to_nhwc(images.to_pixels()?, channel_first)?;
        active
            .writer
            .write_image_batch(description, batch.view(), step)?;
        active.writer.flush()
    }

    /// Record a metric in the backend's metric store.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when idle, or the backend error.
    pub fn log_metric(&mut self, name: &str, value: f64) -> Result<()> {
        let active = self.active.as_ref().ok_or(Error::NotRunning)?;
        active.logger.debug("Attempt to log metric");
        self.backend.log_metric(name, value)
    }

    /// Write a line to the run log.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` when idle.
    pub fn log_text(&self, level: Level, message: &str) -> Result<()> {
        let active = self.active.as_ref().ok_or(Error::NotRunning)?;
        active.logger.log(level, message);
        Ok(())
    }
}

impl<B: TrackingBackend> Drop for RunSession<B> {
    fn drop(&mut self) {
        self.end_with(RunStatus::Cancelled);
    }
}

fn random_name() -> String {
    Uuid::new_v4().to_string()
}

/// Active run of a [`RunSession`]; ends the run when dropped.
#[derive(Debug)]
pub struct RunGuard<'a, B: TrackingBackend = FileStore> {
    session: &'a mut RunSession<B>,
    status: RunStatus,
}

impl<B: TrackingBackend> RunGuard<'_, B> {
    /// Status the run ends with when the guard drops.
    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }
}

impl<B: TrackingBackend> Deref for RunGuard<'_, B> {
    type Target = RunSession<B>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<B: TrackingBackend> DerefMut for RunGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<B: TrackingBackend> Drop for RunGuard<'_, B> {
    fn drop(&mut self) {
        let status = if std::thread::panicking() {
            RunStatus::Failed
        } else {
            self.status
        };
        self.session.end_with(status);
    }
}

/// A function bound to a session; see [`RunSession::wrap`].
#[derive(Debug)]
pub struct Decorated<F, B: TrackingBackend = FileStore> {
    session: RunSession<B>,
    func: F,
}

impl<F, B: TrackingBackend> Decorated<F, B> {
    /// Run the function as one run: `params` are merged over the session
    /// parameters for this call (last write wins), the run is started,
    /// `func(args, session)` is called, and the run is ended whatever the
    /// outcome. The session parameters are restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns start errors (converted into `E`) or the function's error.
    pub fn call<A, R, E>(&mut self, params: Params, args: A) -> std::result::Result<R, E>
    where
        F: FnMut(A, &mut RunSession<B>) -> std::result::Result<R, E>,
        E: From<Error>,
    {
        let Self { session, func } = self;
        let base = session.params().clone();
        let mut merged = base.clone();
        merged.merge(&params);

        session.set_params(merged);
        let result = session.scoped(|run| func(args, run));
        session.set_params(base);
        result
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &RunSession<B> {
        &self.session
    }
}

/// Builder for [`RunSession`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    tracking_dir: PathBuf,
    experiment_name: Option<String>,
    experiment_id: Option<ExperimentId>,
    verbose: bool,
    log_level: LevelFilter,
    params: Params,
}

impl SessionBuilder {
    /// Defaults: verbose, `ERROR` level, no parameters, new experiment.
    #[must_use]
    pub fn new(tracking_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracking_dir: tracking_dir.into(),
            experiment_name: None,
            experiment_id: None,
            verbose: true,
            log_level: LevelFilter::ERROR,
            params: Params::new(),
        }
    }

    /// Name of the experiment to create.
    #[must_use]
    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = Some(name.into());
        self
    }

    /// Write runs into an existing experiment instead of creating one.
    #[must_use]
    pub fn append_to_experiment(mut self, experiment_id: ExperimentId) -> Self {
        self.experiment_id = Some(experiment_id);
        self
    }

    /// Mirror the run log to stderr.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Level filter of the run log.
    #[must_use]
    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// Add one parameter logged at every run start.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Merge parameters logged at every run start; later keys win.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params.merge(&params);
        self
    }

    /// Open the file store at the tracking directory and build the session.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the tracking directory cannot be created.
    pub fn build(self) -> Result<RunSession<FileStore>> {
        let backend = FileStore::open(&self.tracking_dir)?;
        Ok(self.build_with(backend))
    }

    /// Build the session over `backend`; the tracking directory is unused.
    #[must_use]
    pub fn build_with<B: TrackingBackend>(self, backend: B) -> RunSession<B> {
        RunSession {
            backend,
            experiment_name: self.experiment_name,
            experiment_id: self.experiment_id,
            verbose: self.verbose,
            log_level: self.log_level,
            params: self.params,
            active: None,
        }
    }
}
