//! # Host Bridge Traits
//!
//! I/O capability traits the exporter core calls but never implements itself.
//!
//! ## Overview
//!
//! The synchronization engine only ever touches the network and the disk
//! through these traits. Production wiring uses the adapters in
//! `bridge-desktop`; tests substitute in-memory fakes or `mockall` mocks.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with timeouts and bounded retry
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Pointer/sidecar file I/O and directory pruning
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for rate limiting and deterministic tests
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should:
//!
//! - Convert library-specific errors to `BridgeError`
//! - Include the file path or the query-free URL in the message
//! - Leave retry decisions for 5xx/429 to [`RetryPolicy`](http::RetryPolicy)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared by
//! every account task of a run.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
//!
//! async fn accounts(client: &dyn HttpClient) -> bridge_traits::error::Result<serde_json::Value> {
//!     let request = HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:9191/api/m3u/accounts/")
//!         .bearer_token("jwt");
//!     client.execute(request).await?.json()
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, SystemClock};
