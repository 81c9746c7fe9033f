//! Error types for the Dispatcharr provider

use bridge_traits::error::BridgeError;
use core_library::CatalogError;
use thiserror::Error;

/// Dispatcharr and legacy API errors
#[derive(Error, Debug)]
pub enum DispatcharrError {
    /// Token endpoint rejected the credentials or was unreachable
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// API call answered 401 or 403
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error status
    #[error("Dispatcharr API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Legacy API cannot serve this account or series
    #[error("Legacy API unavailable: {0}")]
    FallbackUnavailable(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Dispatcharr operations
pub type Result<T> = std::result::Result<T, DispatcharrError>;

impl DispatcharrError {
    /// Classify an unsuccessful response
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(200).collect();
        match status {
            401 | 403 => DispatcharrError::AuthenticationFailed(format!("status {}", status)),
            404 => DispatcharrError::NotFound(message),
            _ => DispatcharrError::ApiError {
                status_code: status,
                message,
            },
        }
    }
}

impl From<DispatcharrError> for CatalogError {
    fn from(error: DispatcharrError) -> Self {
        match error {
            DispatcharrError::LoginFailed(msg) => CatalogError::Connectivity(msg),
            DispatcharrError::AuthenticationFailed(msg) => CatalogError::Fatal(msg),
            DispatcharrError::ApiError {
                status_code,
                message,
            } if status_code == 429 || status_code >= 500 => CatalogError::Recoverable {
                status: status_code,
                message,
            },
            DispatcharrError::ApiError {
                status_code,
                message,
            } => CatalogError::Fatal(format!("status {}: {}", status_code, message)),
            DispatcharrError::NotFound(msg) => CatalogError::NotFound(msg),
            DispatcharrError::ParseError(msg) => CatalogError::Fatal(msg),
            DispatcharrError::FallbackUnavailable(msg) => CatalogError::Fatal(msg),
            DispatcharrError::BridgeError(BridgeError::Timeout(msg)) => CatalogError::Recoverable {
                status: 408,
                message: msg,
            },
            DispatcharrError::BridgeError(e) if e.is_transport() => {
                CatalogError::Connectivity(e.to_string())
            }
            DispatcharrError::BridgeError(BridgeError::NotFound(msg)) => CatalogError::NotFound(msg),
            DispatcharrError::BridgeError(e) => CatalogError::Fatal(e.to_string()),
        }
    }
}
