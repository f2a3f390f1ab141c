//! Error types for the object storage data plane.

/// Errors that can occur when working with a bucket's object storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object not found
    #[error("object not found: {0}")]
    NotFound(String),
}

/// Result type alias for object storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
