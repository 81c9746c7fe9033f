use core_library::{CatalogError, LibraryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Recoverable fetch error (status {status}): {message}")]
    RecoverableFetch { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write failed for {path}: {message}")]
    Write { path: String, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Catalog request failed: {0}")]
    Catalog(String),
}

impl SyncError {
    /// Whether the error ends the whole account rather than one entity
    pub fn is_account_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Connectivity(_) | SyncError::Config(_) | SyncError::Cache(_)
        )
    }
}

impl From<CatalogError> for SyncError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Connectivity(message) => SyncError::Connectivity(message),
            CatalogError::Recoverable { status, message } => {
                SyncError::RecoverableFetch { status, message }
            }
            CatalogError::NotFound(message) => SyncError::NotFound(message),
            CatalogError::Fatal(message) => SyncError::Catalog(message),
        }
    }
}

impl From<LibraryError> for SyncError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::InvalidInput { field, message } => {
                SyncError::Config(format!("{}: {}", field, message))
            }
            other => SyncError::Cache(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
