//! Core service façade and bootstrap helpers.
//!
//! This crate wires the bridge implementations (HTTP, filesystem, clock), the
//! SQLite cache store and the catalog providers into a ready-to-run
//! [`SyncCoordinator`]. The binary calls [`ExportService::bootstrap`]; tests
//! build an [`ExportDependencies`] bundle by hand and call
//! [`ExportService::new`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_desktop::{ReqwestHttpClient, TokioFileSystem};
use bridge_traits::{http::HttpClient, storage::FileSystemAccess, Clock, SystemClock};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{CacheStore, CatalogClient, FallbackClient, SqliteCacheStore};
use core_metadata::{MetadataProvider, TmdbClient};
use core_runtime::ExportConfig;
use core_sync::{RunSummary, SyncCoordinator, Writer};
use provider_dispatcharr::{DispatcharrClient, XtreamClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Aggregated handle to all bridge dependencies the exporter requires.
pub struct ExportDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub cache: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
}

impl ExportDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystemAccess>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            filesystem,
            cache,
            clock,
        }
    }

    /// Desktop bridges plus the on-disk cache named by the configuration.
    ///
    /// The cache directory is created when missing.
    pub async fn desktop(config: &ExportConfig) -> Result<Self> {
        let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
        let filesystem: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());

        let db_path = &config.output.cache_db_path;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            filesystem.create_dir_all(parent).await?;
        }
        let pool = create_pool(DatabaseConfig::new(db_path)).await?;

        Ok(Self::new(
            http_client,
            filesystem,
            Arc::new(SqliteCacheStore::new(pool)),
            Arc::new(SystemClock),
        ))
    }
}

/// Primary façade exposed to the binary.
pub struct ExportService {
    config: ExportConfig,
    coordinator: SyncCoordinator,
    metadata_enabled: bool,
}

impl ExportService {
    /// Build the service with desktop bridges.
    pub async fn bootstrap(config: ExportConfig) -> Result<Self> {
        let deps = ExportDependencies::desktop(&config).await?;
        Self::new(config, deps)
    }

    /// Build the service from the provided dependencies.
    pub fn new(config: ExportConfig, deps: ExportDependencies) -> Result<Self> {
        let provider: Option<Arc<dyn MetadataProvider>> = if config.metadata.has_tmdb() {
            let tmdb = TmdbClient::with_clock(
                deps.http_client.clone(),
                &config.metadata,
                deps.clock.clone(),
            )?;
            Some(Arc::new(tmdb))
        } else {
            if config.features.write_sidecars || config.features.write_artwork {
                warn!("No TMDB key configured, sidecars use catalog fields only");
            }
            None
        };
        let metadata_enabled = provider.is_some();

        let writer = Arc::new(Writer::new(
            deps.filesystem.clone(),
            provider,
            config.metadata.language.clone(),
            config.features.dry_run,
        ));

        let catalog: Arc<dyn CatalogClient> = Arc::new(DispatcharrClient::new(
            deps.http_client.clone(),
            &config.catalog,
            &config.tuning,
        ));
        let fallback: Arc<dyn FallbackClient> = Arc::new(XtreamClient::with_clock(
            deps.http_client.clone(),
            &config.catalog,
            &config.tuning,
            deps.clock.clone(),
        ));

        let coordinator = SyncCoordinator::new(
            &config,
            catalog,
            Some(fallback),
            deps.cache.clone(),
            writer,
            deps.clock.clone(),
        )?;

        info!(
            catalog = %config.catalog.base_url,
            dry_run = config.features.dry_run,
            full_reset = config.features.full_reset,
            metadata = metadata_enabled,
            "Export service ready"
        );

        Ok(Self {
            config,
            coordinator,
            metadata_enabled,
        })
    }

    /// Run one export pass over every matching account.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        Ok(self.coordinator.run(cancel).await?)
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn metadata_enabled(&self) -> bool {
        self.metadata_enabled
    }
}
