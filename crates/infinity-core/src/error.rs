//! Error types for infinity-core

use std::path::PathBuf;
use thiserror::Error;

/// Flat-file store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file has not been provisioned
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other IO failure, including lock acquisition
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path)
        } else {
            StoreError::Io { path, source }
        }
    }
}

/// Experiment-level errors
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// A map token does not match the token grammar
    #[error("malformed map token '{token}'")]
    MalformedMap { token: String },

    /// A map was advanced after its last token was consumed
    #[error("presentation map is empty")]
    EmptyMap,

    /// A stored line could not be parsed, or a requested line does not exist
    #[error("parse error in {} at line {line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Not enough prior stable-set lines to finalize
    #[error("incomplete stable set {}: expected {expected} recorded answers, found {found}", path.display())]
    IncompleteSet {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// The same stimulus index was recorded twice
    #[error("stimulus {index} recorded more than once in {}", path.display())]
    DuplicateStimulus { path: PathBuf, index: usize },

    /// The final answer of a run must belong to the stable set
    #[error("final answer must be a stable-set position, got '{position}'")]
    UnexpectedFinalPosition { position: String },

    /// User-correctable input problem (bad chain, generation, condition, index)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExperimentError {
    /// Whether the error indicates a corrupted or tampered presentation map
    pub fn is_map_error(&self) -> bool {
        matches!(
            self,
            ExperimentError::MalformedMap { .. } | ExperimentError::EmptyMap
        )
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for experiment operations
pub type ExperimentResult<T> = Result<T, ExperimentError>;
