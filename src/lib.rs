//! # mlwrapper: Experiment-Run Sessions
//!
//! **Version**: 0.1.0
//!
//! mlwrapper binds three per-run sinks to one lifecycle so training code can
//! log without wiring them up by hand:
//!
//! - **Tracking store**: experiments, runs, parameters and metrics in an
//!   mlflow-style directory layout ([`backend::FileStore`])
//! - **Summaries**: scalars and image batches in a TensorBoard event file
//!   ([`summary::EventWriter`])
//! - **Run log**: a private `logs.txt` per run ([`logger::RunLogger`])
//!
//! ## Layout
//!
//! ```text
//! <tracking_dir>/<experiment_id>/meta.json
//! <tracking_dir>/<experiment_id>/<run_id>/meta.json
//!                                        /params/<key>
//!                                        /metrics/<key>
//!                                        /artifacts/logs.txt
//!                                        /artifacts/events.out.tfevents.*
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mlwrapper::{Params, RunSession};
//!
//! let session = RunSession::builder("/tmp/mlruns")
//!     .experiment_name("mnist")
//!     .verbose(false)
//!     .build()?;
//!
//! let mut train = session.wrap(|epochs: i64, run: &mut RunSession| {
//!     for step in 0..epochs {
//!         run.log_scalar("loss", 1.0 / (step as f64 + 1.0), step)?;
//!     }
//!     run.log_metric("final_loss", 1.0 / epochs as f64)
//! });
//!
//! train.call(Params::new().with("lr", 0.01), 10)?;
//! train.call(Params::new().with("lr", 0.001), 10)?;
//! # Ok::<(), mlwrapper::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod backend;
pub mod config;
pub mod error;
pub mod experiment;
pub mod logger;
pub mod session;
pub mod summary;

pub use backend::{FileStore, MemoryBackend, TrackingBackend};
pub use config::{Params, SessionConfig};
pub use error::{Error, Result};
pub use experiment::{ExperimentId, RunStatus};
pub use session::{Decorated, ExperimentIdentity, RunGuard, RunSession, SessionBuilder};
