//! Error types for the transfer-entropy engine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use infoflow_core::{ActorId, ActorKindTag, ClassLabel};
use thiserror::Error;

/// Result type alias for engine operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors that can occur while building actors, series and networks.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A window or run range whose start is not before its end.
    #[error("invalid window: start {start} must be before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// No candidates survived for an actor kind.
    #[error("no {kind} actors to register")]
    NoActors { kind: ActorKindTag },

    /// A sampling frequency string that cannot be parsed.
    #[error("invalid frequency {value:?}: {reason}")]
    InvalidFrequency { value: String, reason: String },

    /// Any other invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// An actor referenced by ID was not found in the registry.
    #[error("actor not found: {actor_id}")]
    UnknownActor { actor_id: ActorId },

    /// Two series compared against each other do not share a time index.
    #[error("series length mismatch: {source_len} points vs {target_len} points")]
    SeriesLengthMismatch { source_len: usize, target_len: usize },

    /// An actor's series map lacks a class required by the comparison plan.
    #[error("no series for class {class} on actor {actor_id}")]
    MissingSeries { actor_id: ActorId, class: ClassLabel },

    /// The worker pool could not be created.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// An input file matched a reader but its content is broken.
    #[error("malformed input {path}: {message}")]
    MalformedInput { path: PathBuf, message: String },

    /// No reader accepted the input file.
    #[error("no reader accepts {path}")]
    UnsupportedInput { path: PathBuf },

    /// I/O error (file operations).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed input error.
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error stems from configuration and should abort a run
    /// before any computation starts.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidWindow { .. }
                | FlowError::NoActors { .. }
                | FlowError::InvalidFrequency { .. }
                | FlowError::Config(_)
        )
    }
}
