//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for the native exporter binary.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with bounded retry and backoff
//! - `FileSystemAccess` using `tokio::fs` with atomic temp-file writes
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let fs = Arc::new(TokioFileSystem::new());
//! ```

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
