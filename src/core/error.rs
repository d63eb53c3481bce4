//! Error types for lanefuse.

use thiserror::Error;

/// Result type alias for lanefuse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lanefuse operations.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Batch assembly errors
    #[error("scene {scene}: {detail}")]
    SceneShapeMismatch { scene: usize, detail: String },

    #[error("scene {scene}: expected {expected} relation scales, got {actual}")]
    ScaleCountMismatch {
        scene: usize,
        expected: usize,
        actual: usize,
    },

    #[error("scene {scene}: {relation} edge index {index} out of range for {num_nodes} lane nodes")]
    EdgeIndexOutOfRange {
        scene: usize,
        relation: String,
        index: usize,
        num_nodes: usize,
    },

    // Encoder seam errors
    #[error("actor encoder returned width {actual}, expected {expected}")]
    EncoderWidthMismatch { expected: usize, actual: usize },

    #[error("actor encoder returned {actual} embeddings for {expected} actors")]
    EncoderCountMismatch { expected: usize, actual: usize },

    // Loss input errors
    #[error("loss input mismatch: {0}")]
    LossInputMismatch(String),

    // Serialization errors
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
