//! Error types for the relfeat core library.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the relfeat core library.
#[derive(Debug, thiserror::Error)]
pub enum RelfeatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sentence {sentence_id} not found in part {part_id}")]
    MissingSentence { part_id: String, sentence_id: usize },

    #[error("Token {token_id} not found in sentence of length {sentence_len}")]
    TokenNotFound { token_id: usize, sentence_len: usize },

    #[error("Token at position {position} carries id {token_id}")]
    MisalignedToken { position: usize, token_id: usize },

    #[error("Window out of bounds: {0}")]
    WindowOutOfBounds(String),

    #[error("No dependency path between tokens {from} and {to}")]
    NoDependencyPath { from: usize, to: usize },

    #[error("No parse tree for sentence {sentence_id} in part {part_id}")]
    MissingParseTree { part_id: String, sentence_id: usize },

    #[error("Solver command failed ({status}): {command}")]
    SolverFailed { command: String, status: String },

    #[error("Could not start solver command `{command}`: {source}")]
    SolverSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Edge {position} has target {target}; expected +1 or -1")]
    InvalidTarget { position: usize, target: i32 },

    #[error("Malformed prediction on line {line}: {content:?}")]
    MalformedPrediction { line: usize, content: String },

    #[error("Got {predictions} predictions for {edges} edges")]
    PredictionCountMismatch { predictions: usize, edges: usize },

    #[error("Feature space mismatch: expected fingerprint {expected}, found {found}")]
    FeatureSpaceMismatch { expected: String, found: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelfeatError {
    /// Whether the error only concerns a single edge's data, so the caller can
    /// exclude that edge and carry on.
    pub fn is_edge_error(&self) -> bool {
        matches!(
            self,
            RelfeatError::MissingSentence { .. }
                | RelfeatError::TokenNotFound { .. }
                | RelfeatError::MisalignedToken { .. }
                | RelfeatError::WindowOutOfBounds(_)
                | RelfeatError::NoDependencyPath { .. }
        )
    }
}

#[cfg(feature = "python")]
impl From<RelfeatError> for PyErr {
    fn from(err: RelfeatError) -> PyErr {
        match &err {
            RelfeatError::Config(_)
            | RelfeatError::MalformedPrediction { .. }
            | RelfeatError::PredictionCountMismatch { .. }
            | RelfeatError::FeatureSpaceMismatch { .. }
            | RelfeatError::InvalidTarget { .. }
            | RelfeatError::Json(_) => PyValueError::new_err(err.to_string()),
            RelfeatError::MissingSentence { .. }
            | RelfeatError::TokenNotFound { .. }
            | RelfeatError::MisalignedToken { .. }
            | RelfeatError::WindowOutOfBounds(_)
            | RelfeatError::NoDependencyPath { .. }
            | RelfeatError::MissingParseTree { .. } => PyValueError::new_err(err.to_string()),
            RelfeatError::SolverFailed { .. } | RelfeatError::InvalidState(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
            RelfeatError::SolverSpawn { .. } | RelfeatError::Io(_) => {
                PyIOError::new_err(err.to_string())
            }
        }
    }
}

pub type RelfeatResult<T> = Result<T, RelfeatError>;
