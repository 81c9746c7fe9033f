//! # Cache Database
//!
//! Opens the SQLite file that holds cache records and persisted provider
//! info, applying the embedded migrations on every open.
//!
//! The exporter is a single process with one writer, so the pool is small:
//! WAL journaling lets the series workers read while a commit is in flight,
//! and a busy timeout absorbs the short write locks.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("/opt/dispatcharr_vod/cache/vod_cache.db")).await?;
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the cache lives and how many connections may touch it
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file; `None` for a private in-memory database
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(10),
        }
    }

    /// In-memory database, pinned to one connection
    ///
    /// Each SQLite in-memory connection is a separate database.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            None => SqliteConnectOptions::new().in_memory(true),
        };
        options
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
    }
}

/// Open the cache database and bring its schema up to date
///
/// # Errors
///
/// Returns [`LibraryError::Database`] when the file cannot be opened and
/// [`LibraryError::Migration`] when the schema cannot be applied.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    match &config.path {
        Some(path) => info!(path = %path.display(), "Opening cache database"),
        None => debug!("Opening in-memory cache database"),
    }

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);
    if config.path.is_none() {
        // The database disappears with its last connection.
        pool_options = pool_options
            .min_connections(1)
            .max_lifetime(None)
            .idle_timeout(None);
    }

    let pool = pool_options
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Cannot open cache database");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| LibraryError::Migration(e.to_string()))?;

    debug!(connections = pool.size(), "Cache database ready");
    Ok(pool)
}

/// In-memory cache database with the schema applied
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_schema_is_applied() {
        let pool = create_test_pool().await.unwrap();

        for table in ["cache_records", "provider_info"] {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_file_database_is_created_in_wal_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vod_cache.db");
        let pool = create_pool(DatabaseConfig::new(&path).with_max_connections(2))
            .await
            .unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vod_cache.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        sqlx::query("CREATE TABLE marker (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE name = 'marker'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
