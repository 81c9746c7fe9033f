use thiserror::Error;

/// Errors raised by the cache store and the pure planning helpers
#[derive(Error, Debug)]
pub enum LibraryError {
    /// The cache database could not be opened, read or written
    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache schema migration failed: {0}")]
    Migration(String),

    /// A setting or stored value that cannot be interpreted
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// A stored snapshot or provider-info payload is not valid JSON
    #[error("Corrupt cache payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
