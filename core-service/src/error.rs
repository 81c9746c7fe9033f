use core_sync::SyncError;
use thiserror::Error;

/// Failures surfaced by the export façade
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Platform bridge failed: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Cache store unavailable: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Metadata provider setup failed: {0}")]
    Metadata(#[from] core_metadata::MetadataError),
}

impl CoreError {
    /// Settings problem rather than an environment one
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Sync(SyncError::Config(_)))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
