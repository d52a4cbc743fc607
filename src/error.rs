//! Error types for mlwrapper
//!
//! Every failure names the contract that was broken so callers can tell
//! misuse (logging outside a run) from storage trouble.

use thiserror::Error;

use crate::experiment::ExperimentId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// mlwrapper error types
#[derive(Error, Debug)]
pub enum Error {
    /// A logging operation was called while the session is idle
    #[error("Attempt to log before the run was started\nCall `start()` or `enter()` first")]
    NotRunning,

    /// `start()` was called on a session that already has an active run
    #[error("Run already active for this session\nCall `end()` before starting another run")]
    AlreadyRunning,

    /// The backend was asked about the active run when none is open
    #[error("No active run in tracking backend")]
    NoActiveRun,

    /// Experiment name is already taken in the tracking store
    #[error("Experiment '{0}' already exists")]
    ExperimentExists(String),

    /// Experiment id does not exist (stale or never created)
    #[error("Experiment with id {0} does not exist")]
    ExperimentNotFound(ExperimentId),

    /// Image batch does not have the expected rank/channel layout
    #[error("Invalid image shape: {0}\nExpected [b, h, w, c], or [b, c, h, w] with channel_first")]
    InvalidImageShape(String),

    /// Image container type is not supported
    #[error("Image logging not implemented for type {0} yet")]
    UnsupportedImageType(String),

    /// Session configuration could not be interpreted
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Event file record failed framing or checksum validation
    #[error("Corrupt event record: {0}")]
    CorruptRecord(String),

    /// Tracking store layout error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// PNG encoding error
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    /// Event protobuf decoding error
    #[error("Event decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
