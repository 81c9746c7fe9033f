use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("No metadata found: {0}")]
    NotFound(String),

    #[error("Rate limited by {provider}, retry after {retry_after_seconds}s")]
    RateLimited {
        provider: String,
        retry_after_seconds: u64,
    },

    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to parse response: {0}")]
    JsonParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to render sidecar: {0}")]
    Xml(#[from] quick_xml::SeError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

impl MetadataError {
    /// A miss that will not change on retry
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
