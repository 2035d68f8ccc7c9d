//! Error types for example-store

use thiserror::Error;

/// Errors that can occur in the example persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Dataset name contains characters the backend cannot address
    #[error("invalid dataset name: {name:?}")]
    InvalidDatasetName { name: String },

    /// Example id not present in the dataset
    #[error("example {id} not found in dataset '{dataset}'")]
    ExampleNotFound { dataset: String, id: String },

    /// Operation not supported by this backend
    #[error("operation not supported by this store: {op}")]
    Unsupported { op: &'static str },

    /// Failure injected by a test fake
    #[error("injected failure during {op}")]
    Injected { op: &'static str },

    /// Filesystem error
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Document (de)serialization error
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote backend reported an error
    #[error("store backend error: {0}")]
    Backend(String),
}
