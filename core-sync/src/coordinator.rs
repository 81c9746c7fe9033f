//! # Sync Coordinator
//!
//! Drives one export run from catalog listing to committed cache.
//!
//! ## Workflow
//!
//! For every account selected by the name patterns:
//! 1. Full reset (optional): drop the account's cache records and output tree
//! 2. Movies: list, plan, reconcile against cache and disk, apply
//! 3. Series: list and plan; retire stale series, then reconcile each
//!    present series and its episodes concurrently
//! 4. Sweep pointer files no entity owns (stale cleanup only)
//!
//! Entities are applied one at a time per scope. A cache record is committed
//! only after the writer finished that entity's actions, so an interrupted
//! run leaves the cache consistent with the files on disk.
//!
//! ## Failure isolation
//!
//! - A failing entity is logged and counted; the scope goes on.
//! - A failing scope listing marks nothing stale and deletes nothing.
//! - A connectivity failure aborts only the affected account.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(coordinator: SyncCoordinator) -> core_sync::Result<()> {
//! let summary = coordinator.run(CancellationToken::new()).await?;
//! println!("{}", summary.totals());
//! # Ok(())
//! # }
//! ```

use crate::action::{CacheCommit, Change, EntityUnit, Outcome};
use crate::merge::merge;
use crate::reconciler::{claimed_paths, DiskProbe, ReconcilePolicy, Reconciler};
use crate::state::EntityState;
use crate::summary::{AccountSummary, RunSummary};
use crate::writer::Writer;
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_library::models::{
    Account, CacheKey, CacheRecord, EntityKind, InfoSource, ProviderInfo, Series,
};
use core_library::{AccountFilter, CacheStore, CatalogClient, DesiredEntity, FallbackClient, PathPlanner};
use core_runtime::config::{ExportConfig, FeatureFlags, SyncTuning};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Logs a line each time another tenth of a scope is done
struct Progress<'a> {
    scope: &'static str,
    account: &'a str,
    total: usize,
    done: usize,
    next_decile: usize,
}

impl<'a> Progress<'a> {
    fn new(scope: &'static str, account: &'a str, total: usize) -> Self {
        Self {
            scope,
            account,
            total,
            done: 0,
            next_decile: 1,
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        if self.total == 0 {
            return;
        }
        let decile = self.done * 10 / self.total;
        if decile >= self.next_decile {
            info!(
                account = self.account,
                scope = self.scope,
                "Progress: {}/{} ({}%)",
                self.done,
                self.total,
                decile * 10
            );
            self.next_decile = decile + 1;
        }
    }
}

/// One present series and what the cache remembers about it
struct SeriesJob<'a> {
    source: &'a Series,
    desired: &'a DesiredEntity,
    cached: Option<&'a CacheRecord>,
    cached_episodes: &'a [CacheRecord],
}

struct SeriesResult {
    tally: AccountSummary,
    /// Pointer files the orphan sweep must leave alone
    keep: Vec<PathBuf>,
    /// False when the episode listing failed or the run was cancelled
    listed: bool,
    dir: PathBuf,
}

/// Export run orchestrator
pub struct SyncCoordinator {
    features: FeatureFlags,
    tuning: SyncTuning,
    catalog: Arc<dyn CatalogClient>,
    fallback: Option<Arc<dyn FallbackClient>>,
    cache: Arc<dyn CacheStore>,
    writer: Arc<Writer>,
    planner: PathPlanner,
    filter: AccountFilter,
    clock: Arc<dyn Clock>,
}

impl SyncCoordinator {
    /// Create a coordinator for one run
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when the account patterns or output
    /// settings cannot be compiled.
    pub fn new(
        config: &ExportConfig,
        catalog: Arc<dyn CatalogClient>,
        fallback: Option<Arc<dyn FallbackClient>>,
        cache: Arc<dyn CacheStore>,
        writer: Arc<Writer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            features: config.features,
            tuning: config.tuning,
            catalog,
            fallback,
            cache,
            writer,
            planner: PathPlanner::new(&config.output)?,
            filter: AccountFilter::parse(&config.account_patterns)?,
            clock,
        })
    }

    /// Run the export for every matching account
    ///
    /// Cancelling `cancel` stops the run between entities; whatever was
    /// applied so far is committed.
    ///
    /// # Errors
    ///
    /// Fails only when the account listing itself cannot be fetched. Every
    /// later failure is recorded in the returned [`RunSummary`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        let dry_run = self.writer.is_dry_run();

        info!(
            run_id = %run_id,
            dry_run,
            full_reset = self.features.full_reset,
            "Starting export"
        );

        let accounts = self.catalog.list_accounts().await.map_err(|e| {
            error!(error = %e, "Failed to list accounts");
            SyncError::from(e)
        })?;
        let selected = self.filter.select(accounts);
        if selected.is_empty() {
            warn!("No account matches the configured patterns");
        } else {
            info!("Selected {} account(s)", selected.len());
        }

        let reconciler = Reconciler::new(
            ReconcilePolicy::from(&self.features),
            self.clock.unix_timestamp(),
        );

        let reconciler = &reconciler;
        let cancel = &cancel;
        let mut accounts: Vec<AccountSummary> = stream::iter(selected.iter())
            .map(move |account| self.sync_account(account, reconciler, cancel))
            .buffer_unordered(self.tuning.account_concurrency.max(1))
            .collect()
            .await;
        accounts.sort_by(|a, b| a.account.cmp(&b.account));

        let summary = RunSummary {
            run_id,
            accounts,
            started_at,
            finished_at: self.clock.now(),
            dry_run,
            cancelled: cancel.is_cancelled(),
        };

        if summary.cancelled {
            warn!("Export cancelled: {}", summary.totals());
        } else {
            info!(
                "Export completed in {}s: {}",
                summary.duration_secs(),
                summary.totals()
            );
        }

        Ok(summary)
    }

    #[instrument(skip_all, fields(account = %account.name))]
    async fn sync_account(
        &self,
        account: &Account,
        reconciler: &Reconciler,
        cancel: &CancellationToken,
    ) -> AccountSummary {
        let mut summary = AccountSummary::new(&account.name);

        if self.features.full_reset {
            if let Err(e) = self.reset_account(account, &mut summary).await {
                error!(stage = "reset", error = %e, "Full reset failed");
                summary.fatal = Some(e.to_string());
                return summary;
            }
        }

        if self.features.export_movies && !cancel.is_cancelled() {
            match self.sync_movies(account, reconciler, cancel).await {
                Ok(tally) => summary.absorb(&tally),
                Err(e) => {
                    if self.scope_failed("movies", e, &mut summary) {
                        return summary;
                    }
                }
            }
        }

        if self.features.export_series && !cancel.is_cancelled() {
            match self.sync_series(account, reconciler, cancel).await {
                Ok(tally) => summary.absorb(&tally),
                Err(e) => {
                    if self.scope_failed("series", e, &mut summary) {
                        return summary;
                    }
                }
            }
        }

        info!("Account {} finished: {}", account.name, summary);
        summary
    }

    /// Record a scope failure; returns true when the account must stop
    fn scope_failed(&self, scope: &'static str, error: SyncError, summary: &mut AccountSummary) -> bool {
        if error.is_account_fatal() {
            error!(scope, error = %error, "Account cannot be processed");
            summary.fatal = Some(error.to_string());
            true
        } else {
            error!(scope, error = %error, "Scope listing failed; nothing marked stale");
            summary.failed += 1;
            false
        }
    }

    async fn reset_account(&self, account: &Account, summary: &mut AccountSummary) -> Result<()> {
        if self.writer.is_dry_run() {
            info!("[dry-run] would clear cache records");
        } else {
            let removed = self.cache.clear_account(&account.name).await?;
            info!(removed, "Cleared cache records");
        }

        if self.features.export_movies {
            let record = self
                .writer
                .purge_subtree(&self.planner.movies_root(account))
                .await?;
            summary.actions.push(record);
        }
        if self.features.export_series {
            let record = self
                .writer
                .purge_subtree(&self.planner.series_root(account))
                .await?;
            summary.actions.push(record);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(account = %account.name, scope = "movies"))]
    async fn sync_movies(
        &self,
        account: &Account,
        reconciler: &Reconciler,
        cancel: &CancellationToken,
    ) -> Result<AccountSummary> {
        info!("Phase 1: Listing movies");
        let movies = self.catalog.list_movies(account).await?;
        let desired = self.planner.plan_movies(account, &movies);
        info!("Planned {} movies", desired.len());

        let cached = self.cached_records(&account.name, EntityKind::Movie).await?;
        let probes = self.probe_all(&account.name, &desired).await;
        let claimed = claimed_paths(&desired);
        let units = reconciler.reconcile_scope(&account.name, &desired, &cached, &probes, &claimed);

        info!("Phase 2: Applying {} movie entities", units.len());
        let mut tally = AccountSummary::new(&account.name);
        let mut progress = Progress::new("movies", &account.name, units.len());
        for unit in units {
            if cancel.is_cancelled() {
                warn!("Cancelled; remaining movies are left for the next run");
                return Ok(tally);
            }
            self.apply_unit(unit, &mut tally).await;
            progress.tick();
        }

        if self.features.delete_stale {
            info!("Phase 3: Sweeping orphan pointers");
            let mut keep = claimed;
            keep.extend(cached.iter().filter_map(|r| r.snapshot.target.pointer.clone()));
            self.sweep(&self.planner.movies_root(account), &keep, &[], &mut tally)
                .await;
        }

        info!("Movies: {}", tally);
        Ok(tally)
    }

    #[instrument(skip_all, fields(account = %account.name, scope = "series"))]
    async fn sync_series(
        &self,
        account: &Account,
        reconciler: &Reconciler,
        cancel: &CancellationToken,
    ) -> Result<AccountSummary> {
        info!("Phase 1: Listing series");
        let series = self.catalog.list_series(account).await?;
        let desired = self.planner.plan_series(account, &series);
        info!("Planned {} series", desired.len());

        let cached_series = self.cached_records(&account.name, EntityKind::Series).await?;
        let cached_episodes = self.cached_records(&account.name, EntityKind::Episode).await?;

        let mut episodes_by_parent: HashMap<String, Vec<CacheRecord>> = HashMap::new();
        for record in &cached_episodes {
            if let Some(parent) = &record.parent_id {
                episodes_by_parent
                    .entry(parent.clone())
                    .or_default()
                    .push(record.clone());
            }
        }
        let cached_by_id: HashMap<&str, &CacheRecord> = cached_series
            .iter()
            .map(|r| (r.entity_id.as_str(), r))
            .collect();
        let desired_ids: HashSet<&str> = desired.iter().map(|d| d.entity_id.as_str()).collect();
        let claimed_series = claimed_paths(&desired);

        let mut tally = AccountSummary::new(&account.name);

        // Stale series go first so their deletions precede any creation
        let stale_parents: BTreeSet<&str> = cached_by_id
            .keys()
            .copied()
            .chain(episodes_by_parent.keys().map(String::as_str))
            .filter(|id| !desired_ids.contains(id))
            .collect();
        if !stale_parents.is_empty() {
            info!("Phase 2: Retiring {} stale series", stale_parents.len());
        }
        let mut stale_units = Vec::new();
        for parent in stale_parents {
            if let Some(episodes) = episodes_by_parent.get(parent) {
                let mut episodes: Vec<&CacheRecord> = episodes.iter().collect();
                episodes.sort_by_key(|r| r.key());
                stale_units.extend(
                    episodes
                        .into_iter()
                        .map(|e| reconciler.reconcile_missing(e, &claimed_series)),
                );
            }
            if let Some(record) = cached_by_id.get(parent) {
                stale_units.push(reconciler.reconcile_missing(record, &claimed_series));
            }
        }
        if !self.apply_units(stale_units, &mut tally, cancel).await {
            return Ok(tally);
        }

        info!("Phase 3: Reconciling {} series", desired.len());
        let mut keep: HashSet<PathBuf> = claimed_series.clone();
        keep.extend(
            cached_episodes
                .iter()
                .filter_map(|r| r.snapshot.target.pointer.clone()),
        );
        let mut protected = Vec::new();
        let mut progress = Progress::new("series", &account.name, desired.len());

        let claimed = &claimed_series;
        let cached_by_id = &cached_by_id;
        let episodes_by_parent = &episodes_by_parent;
        let mut results = stream::iter(series.iter().zip(desired.iter()))
            .map(move |(source, entity)| {
                let job = SeriesJob {
                    source,
                    desired: entity,
                    cached: cached_by_id.get(entity.entity_id.as_str()).copied(),
                    cached_episodes: episodes_by_parent
                        .get(&entity.entity_id)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]),
                };
                self.sync_one_series(account, reconciler, job, claimed, cancel)
            })
            .buffer_unordered(self.tuning.series_concurrency.max(1));

        while let Some(result) = results.next().await {
            tally.absorb(&result.tally);
            keep.extend(result.keep);
            if !result.listed {
                protected.push(result.dir);
            }
            progress.tick();
        }

        if self.features.delete_stale && !cancel.is_cancelled() {
            info!("Phase 4: Sweeping orphan pointers");
            self.sweep(&self.planner.series_root(account), &keep, &protected, &mut tally)
                .await;
        }

        info!("Series: {}", tally);
        Ok(tally)
    }

    #[instrument(skip_all, fields(account = %account.name, series_id = job.source.id))]
    async fn sync_one_series(
        &self,
        account: &Account,
        reconciler: &Reconciler,
        job: SeriesJob<'_>,
        claimed_series: &HashSet<PathBuf>,
        cancel: &CancellationToken,
    ) -> SeriesResult {
        let mut result = SeriesResult {
            tally: AccountSummary::new(&account.name),
            keep: Vec::new(),
            listed: false,
            dir: job.desired.target.dir.clone(),
        };
        if cancel.is_cancelled() {
            return result;
        }

        let info = match self.fetch_episodes(account, job.source).await {
            Ok(info) => info,
            Err(e) => {
                error!(stage = "episodes", error = %e, "Failed to list episodes; existing files kept");
                result.tally.record(Outcome::Failed);
                return result;
            }
        };

        let episodes = self.planner.plan_episodes(job.desired, &info.episodes);
        let claimed_episodes = claimed_paths(&episodes);
        result.keep.extend(episodes.iter().filter_map(|e| e.target.pointer.clone()));
        result.listed = true;

        let probe = self.probe_one(job.desired).await;
        let mut units = vec![reconciler.reconcile_present(
            &account.name,
            job.desired,
            job.cached,
            probe,
            claimed_series,
        )];
        let probes = self.probe_all(&account.name, &episodes).await;
        units.extend(reconciler.reconcile_scope(
            &account.name,
            &episodes,
            job.cached_episodes,
            &probes,
            &claimed_episodes,
        ));

        debug!(episodes = episodes.len(), units = units.len(), "Reconciled series");
        let completed = self.apply_units(units, &mut result.tally, cancel).await;

        if completed && !self.writer.is_dry_run() {
            if let Err(e) = self.cache.put_provider_info(&account.name, &info).await {
                warn!(stage = "cache", error = %e, "Failed to persist episode listing");
            }
        }
        result
    }

    /// Episode listing of one series
    ///
    /// After a recoverable primary failure a persisted fallback or merged
    /// listing is reused as is; only without one is the legacy API called,
    /// and its answer is merged over whatever was persisted.
    async fn fetch_episodes(&self, account: &Account, series: &Series) -> Result<ProviderInfo> {
        let primary_error = match self.catalog.get_series_episodes(account, series).await {
            Ok(info) => return Ok(info),
            Err(e) if e.is_recoverable() => e,
            Err(e) => return Err(e.into()),
        };

        let persisted = self.persisted_info(account, series).await;
        if let Some(info) = persisted
            .as_ref()
            .filter(|info| info.source != InfoSource::Primary)
        {
            info!(
                stage = "episodes",
                error = %primary_error,
                episodes = info.episodes.len(),
                "Primary episode listing failed, reusing persisted fallback listing"
            );
            return Ok(info.clone());
        }

        let Some(fallback) = &self.fallback else {
            return Err(primary_error.into());
        };

        warn!(
            stage = "episodes",
            error = %primary_error,
            "Primary episode listing failed, trying fallback"
        );
        let episodes = fallback.get_series_episodes(account, series).await?;

        let merged = merge(series.id, persisted.as_ref(), episodes);
        info!(
            episodes = merged.episodes.len(),
            source = ?merged.source,
            "Using fallback episode listing"
        );
        Ok(merged)
    }

    async fn persisted_info(&self, account: &Account, series: &Series) -> Option<ProviderInfo> {
        if self.features.full_reset {
            return None;
        }
        match self.cache.get_provider_info(&account.name, series.id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(stage = "cache", error = %e, "Failed to load persisted episode listing");
                None
            }
        }
    }

    /// Apply units in order; false when cancelled before the last one
    async fn apply_units(
        &self,
        units: Vec<EntityUnit>,
        tally: &mut AccountSummary,
        cancel: &CancellationToken,
    ) -> bool {
        for unit in units {
            if cancel.is_cancelled() {
                warn!("Cancelled; remaining entities are left for the next run");
                return false;
            }
            self.apply_unit(unit, tally).await;
        }
        true
    }

    /// Run one entity's actions, commit its cache change, then count it
    async fn apply_unit(&self, unit: EntityUnit, tally: &mut AccountSummary) {
        let outcome = self.commit_unit(unit, tally).await;
        tally.record(outcome);
    }

    async fn commit_unit(&self, mut unit: EntityUnit, tally: &mut AccountSummary) -> Outcome {
        let outcome = unit.outcome();

        let report = match self.writer.apply(&unit.actions).await {
            Ok(report) => report,
            Err(e) => {
                error!(entity = %unit.lifecycle.key, stage = "write", error = %e, "Failed to apply entity");
                unit.lifecycle.fail(e.to_string());
                return Outcome::Failed;
            }
        };
        tally.actions.extend(report.records.iter().cloned());

        if !self.writer.is_dry_run() {
            let committed = match unit.commit {
                CacheCommit::Put(mut record) => {
                    record.metadata_fingerprint =
                        report.metadata.apply_to(record.metadata_fingerprint.take());
                    self.cache.put(&record).await
                }
                CacheCommit::Delete(key) => self.cache.delete(&key).await,
            };
            if let Err(e) = committed {
                error!(entity = %unit.lifecycle.key, stage = "cache", error = %e, "Failed to commit cache record");
                unit.lifecycle.fail(e.to_string());
                return Outcome::Failed;
            }
        }

        let next = match unit.change {
            Change::Missing { confirmed: false } => None,
            Change::Missing { confirmed: true } => Some(EntityState::Deleted),
            _ => Some(EntityState::Applied),
        };
        if let Some(next) = next {
            if let Err(e) = unit.lifecycle.advance(next) {
                warn!(error = %e, "Unexpected entity state");
            }
        }

        debug!(
            entity = %unit.lifecycle.key,
            state = %unit.lifecycle.state(),
            actions = report.records.len(),
            "Entity done"
        );
        outcome
    }

    async fn sweep(
        &self,
        root: &Path,
        keep: &HashSet<PathBuf>,
        protected: &[PathBuf],
        tally: &mut AccountSummary,
    ) {
        match self.writer.sweep_orphans(root, keep, protected).await {
            Ok(records) => {
                if !records.is_empty() {
                    info!("Removed {} orphan pointer(s)", records.len());
                }
                tally.deleted += records.len() as u64;
                tally.actions.extend(records);
            }
            Err(e) => {
                error!(stage = "sweep", error = %e, "Orphan sweep failed");
                tally.failed += 1;
            }
        }
    }

    async fn cached_records(&self, account: &str, kind: EntityKind) -> Result<Vec<CacheRecord>> {
        if self.features.full_reset {
            return Ok(Vec::new());
        }
        Ok(self.cache.list_account(account, kind).await?)
    }

    async fn probe_one(&self, entity: &DesiredEntity) -> DiskProbe {
        if self.features.full_reset {
            return DiskProbe::default();
        }
        self.writer.probe(&entity.target).await
    }

    async fn probe_all(&self, account: &str, desired: &[DesiredEntity]) -> HashMap<CacheKey, DiskProbe> {
        let mut probes = HashMap::with_capacity(desired.len());
        for entity in desired {
            probes.insert(entity.key(account), self.probe_one(entity).await);
        }
        probes
    }
}
