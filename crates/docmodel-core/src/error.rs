//! Error types for store operations.

use thiserror::Error;

/// Errors raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same unique key already exists.
    #[error("duplicate key error in {collection}: {key} = {value}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Conflicting key.
        key: String,
        /// Conflicting value, rendered as JSON.
        value: String,
    },

    /// The pipeline contains a stage the store does not understand.
    #[error("unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    /// A filter, update or expression uses an unknown operator.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A pipeline stage is malformed.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// An update document is malformed.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport or driver failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
