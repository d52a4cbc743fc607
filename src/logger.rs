//! Per-run text log.
//!
//! Each active run owns one [`RunLogger`]: a private `tracing` dispatcher
//! that writes to `<storage>/logs.txt` and, when verbose, to stderr. Nothing
//! is installed globally, so handlers never pile up across runs and the
//! host application's own subscriber is left alone.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing::{dispatcher, Dispatch, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Registry};

use crate::Result;

/// Name of the text log inside a run's storage directory.
pub const LOG_FILE: &str = "logs.txt";

/// Text logger bound to one run.
#[derive(Debug)]
pub struct RunLogger {
    dispatch: Dispatch,
    path: PathBuf,
    level: LevelFilter,
}

impl RunLogger {
    /// Open `<storage>/logs.txt` (appending) and build the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the log file cannot be opened.
    pub fn new(storage: &Path, level: LevelFilter, verbose: bool) -> Result<Self> {
        let path = storage.join(LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let file_layer = fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .with_target(false);
        let console_layer = verbose.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
        });

        let subscriber = Registry::default()
            .with(level)
            .with(file_layer)
            .with(console_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            path,
            level,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured level filter.
    #[must_use]
    pub const fn level(&self) -> LevelFilter {
        self.level
    }

    /// Write `message` at `level`.
    pub fn log(&self, level: Level, message: &str) {
        dispatcher::with_default(&self.dispatch, || {
            if level == Level::ERROR {
                tracing::error!("{message}");
            } else if level == Level::WARN {
                tracing::warn!("{message}");
            } else if level == Level::INFO {
                tracing::info!("{message}");
            } else if level == Level::DEBUG {
                tracing::debug!("{message}");
            } else {
                tracing::trace!("{message}");
            }
        });
    }

    /// Write at error level.
    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Write at warn level.
    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    /// Write at info level.
    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    /// Write at debug level.
    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }
}
