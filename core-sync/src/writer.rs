//! # Writer
//!
//! Executes [`PlannedAction`]s against the filesystem, in the order given.
//!
//! - Pointer files hold the stream URL and a newline, written atomically.
//! - Sidecars and artwork consult the metadata provider once per title per
//!   run; provider failures degrade to catalog fields.
//! - In dry-run mode every action only yields an [`ActionRecord`] and a log
//!   line. Neither the filesystem nor the provider is touched.

use crate::action::{artwork_path, ActionRecord, ArtworkKind, PlannedAction};
use crate::reconciler::DiskProbe;
use crate::{Result, SyncError};
use bridge_traits::error::BridgeError;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_library::models::{EntityKind, KnownFields, TargetPath};
use core_metadata::nfo;
use core_metadata::{LookupQuery, Metadata, MetadataError, MetadataProvider};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Stamp recorded when sidecars were rendered from catalog fields only
pub const STAMP_CATALOG_ONLY: &str = "catalog";

/// Stamp recorded when the provider had no match
pub const STAMP_NOT_FOUND: &str = "not-found";

/// What the metadata lookups of one entity amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataStamp {
    /// No sidecar or artwork action ran; keep the previous stamp
    Untouched,
    /// Fingerprint of what was written
    Resolved(String),
    /// A transient provider failure; try again next run
    Retry,
}

impl MetadataStamp {
    fn combine(&mut self, other: MetadataStamp) {
        *self = match (std::mem::replace(self, MetadataStamp::Untouched), other) {
            (MetadataStamp::Retry, _) | (_, MetadataStamp::Retry) => MetadataStamp::Retry,
            (current, MetadataStamp::Untouched) => current,
            (_, resolved) => resolved,
        };
    }

    /// Apply to the stamp stored in the cache record
    pub fn apply_to(&self, previous: Option<String>) -> Option<String> {
        match self {
            MetadataStamp::Untouched => previous,
            MetadataStamp::Resolved(stamp) => Some(stamp.clone()),
            MetadataStamp::Retry => None,
        }
    }
}

/// Result of applying one entity's actions
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub records: Vec<ActionRecord>,
    pub metadata: MetadataStamp,
}

#[derive(Debug, Clone)]
enum Lookup {
    Found(Metadata),
    Missing(&'static str),
    Unavailable,
}

impl Lookup {
    fn stamp(&self) -> MetadataStamp {
        match self {
            Lookup::Found(metadata) => MetadataStamp::Resolved(metadata.fingerprint()),
            Lookup::Missing(stamp) => MetadataStamp::Resolved(stamp.to_string()),
            Lookup::Unavailable => MetadataStamp::Retry,
        }
    }

    fn metadata(&self) -> Option<&Metadata> {
        match self {
            Lookup::Found(metadata) => Some(metadata),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    kind: EntityKind,
    title: String,
    year: Option<i32>,
}

/// Filesystem writer shared by every account of a run
pub struct Writer {
    fs: Arc<dyn FileSystemAccess>,
    provider: Option<Arc<dyn MetadataProvider>>,
    language: String,
    dry_run: bool,
    lookups: Mutex<HashMap<LookupKey, Arc<OnceCell<Lookup>>>>,
}

impl Writer {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        provider: Option<Arc<dyn MetadataProvider>>,
        language: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            fs,
            provider,
            language: language.into(),
            dry_run,
            lookups: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Execute one entity's actions, stopping at the first write failure
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Write`] when a file or folder cannot be written
    /// or removed. Metadata problems never fail the entity.
    pub async fn apply(&self, actions: &[PlannedAction]) -> Result<WriteReport> {
        let mut report = WriteReport {
            records: Vec::with_capacity(actions.len()),
            metadata: MetadataStamp::Untouched,
        };

        for action in actions {
            if self.dry_run {
                info!(action = action.name(), path = %action.path().display(), "[dry-run] would apply");
            } else {
                let stamp = self.execute(action).await?;
                report.metadata.combine(stamp);
            }
            report.records.push(action.record(self.dry_run));
        }

        Ok(report)
    }

    async fn execute(&self, action: &PlannedAction) -> Result<MetadataStamp> {
        match action {
            PlannedAction::CreatePointer { target, stream_url } => {
                self.create_pointer(target, stream_url).await?;
                Ok(MetadataStamp::Untouched)
            }
            PlannedAction::UpdateSidecar {
                target,
                kind,
                known,
            } => self.update_sidecar(target, *kind, known).await,
            PlannedAction::WriteArtwork {
                target,
                kind,
                known,
                artwork,
            } => self.write_artwork(target, *kind, known, *artwork).await,
            PlannedAction::DeleteStalePointer { files, .. } => {
                for file in files {
                    self.delete_if_present(file).await?;
                }
                Ok(MetadataStamp::Untouched)
            }
            PlannedAction::DeleteEmptyDirectory { target } => {
                self.prune_empty_dirs(&target.dir, &target.root).await?;
                Ok(MetadataStamp::Untouched)
            }
        }
    }

    async fn create_pointer(&self, target: &TargetPath, stream_url: &str) -> Result<()> {
        let Some(pointer) = &target.pointer else {
            return Ok(());
        };
        self.write(pointer, Bytes::from(format!("{}\n", stream_url.trim())))
            .await?;
        debug!(path = %pointer.display(), "Wrote pointer");
        Ok(())
    }

    async fn update_sidecar(
        &self,
        target: &TargetPath,
        kind: EntityKind,
        known: &KnownFields,
    ) -> Result<MetadataStamp> {
        let (rendered, stamp) = match kind {
            EntityKind::Episode => (
                nfo::render_episode(known),
                MetadataStamp::Resolved(STAMP_CATALOG_ONLY.to_string()),
            ),
            EntityKind::Movie | EntityKind::Series => {
                let lookup = self.lookup(kind, known).await;
                let rendered = if kind == EntityKind::Movie {
                    nfo::render_movie(known, lookup.metadata())
                } else {
                    nfo::render_tvshow(known, lookup.metadata())
                };
                (rendered, lookup.stamp())
            }
        };
        let document = rendered.map_err(|e| SyncError::Write {
            path: target.nfo.display().to_string(),
            message: e.to_string(),
        })?;

        self.write(&target.nfo, Bytes::from(document)).await?;
        debug!(path = %target.nfo.display(), "Wrote sidecar");
        Ok(stamp)
    }

    async fn write_artwork(
        &self,
        target: &TargetPath,
        kind: EntityKind,
        known: &KnownFields,
        artwork: ArtworkKind,
    ) -> Result<MetadataStamp> {
        let Some(path) = artwork_path(target, artwork) else {
            return Ok(MetadataStamp::Untouched);
        };
        let Some(provider) = &self.provider else {
            debug!(path = %path.display(), "No metadata provider, skipping artwork");
            return Ok(MetadataStamp::Resolved(STAMP_CATALOG_ONLY.to_string()));
        };

        let lookup = self.lookup(kind, known).await;
        let metadata = lookup.metadata();
        let url = match artwork {
            ArtworkKind::Poster => metadata
                .and_then(|m| m.poster_url.clone())
                .or_else(|| known.poster_url.clone()),
            ArtworkKind::Fanart => metadata.and_then(|m| m.fanart_url.clone()),
        };
        let Some(url) = url else {
            debug!(path = %path.display(), "No artwork URL known");
            return Ok(lookup.stamp());
        };

        match provider.fetch_image(&url).await {
            Ok(bytes) => {
                self.write(&path, bytes).await?;
                debug!(path = %path.display(), "Wrote artwork");
                Ok(lookup.stamp())
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "Artwork not found at provider");
                Ok(lookup.stamp())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, stage = "artwork", "Artwork download failed");
                Ok(MetadataStamp::Retry)
            }
        }
    }

    /// Resolve metadata once per title for the whole run
    async fn lookup(&self, kind: EntityKind, known: &KnownFields) -> Lookup {
        let Some(provider) = self.provider.clone() else {
            return Lookup::Missing(STAMP_CATALOG_ONLY);
        };

        let key = LookupKey {
            kind,
            title: known.title.clone(),
            year: known.year,
        };
        let cell = {
            let mut lookups = self.lookups.lock().await;
            lookups.entry(key).or_default().clone()
        };

        cell.get_or_init(|| async {
            let query = LookupQuery {
                kind,
                title: known.title.clone(),
                year: known.year,
                language: self.language.clone(),
            };
            match provider.lookup(&query).await {
                Ok(metadata) => Lookup::Found(metadata),
                Err(MetadataError::NotFound(_)) => {
                    debug!(title = %known.title, "No metadata match, using catalog fields");
                    Lookup::Missing(STAMP_NOT_FOUND)
                }
                Err(e) => {
                    warn!(
                        title = %known.title,
                        provider = provider.name(),
                        error = %e,
                        stage = "metadata",
                        "Metadata lookup failed, using catalog fields"
                    );
                    Lookup::Unavailable
                }
            }
        })
        .await
        .clone()
    }

    /// Check which files of `target` exist
    pub async fn probe(&self, target: &TargetPath) -> DiskProbe {
        DiskProbe {
            pointer: match &target.pointer {
                Some(pointer) => self.exists(pointer).await,
                None => false,
            },
            nfo: self.exists(&target.nfo).await,
            poster: match &target.poster {
                Some(poster) => self.exists(poster).await,
                None => false,
            },
            fanart: match &target.fanart {
                Some(fanart) => self.exists(fanart).await,
                None => false,
            },
        }
    }

    /// Delete an account's whole output subtree (full reset)
    pub async fn purge_subtree(&self, root: &Path) -> Result<ActionRecord> {
        let record = ActionRecord {
            action: "purge_subtree",
            path: root.to_path_buf(),
            dry_run: self.dry_run,
        };
        if self.dry_run {
            info!(path = %root.display(), "[dry-run] would purge output subtree");
            return Ok(record);
        }

        if self.exists(root).await {
            self.fs
                .delete_dir_all(root)
                .await
                .map_err(|e| write_error(root, e))?;
            info!(path = %root.display(), "Purged output subtree");
        }
        Ok(record)
    }

    /// Delete pointer files under `root` that no entity owns
    ///
    /// Files listed in `keep` and anything below a `protected` folder survive.
    /// Folders left empty are pruned up to, but not including, `root`.
    pub async fn sweep_orphans(
        &self,
        root: &Path,
        keep: &HashSet<PathBuf>,
        protected: &[PathBuf],
    ) -> Result<Vec<ActionRecord>> {
        let pointers = self
            .fs
            .find_files(root, "strm")
            .await
            .map_err(|e| write_error(root, e))?;

        let mut records = Vec::new();
        let orphans = pointers
            .into_iter()
            .filter(|p| !keep.contains(p) && !protected.iter().any(|dir| p.starts_with(dir)));
        for pointer in orphans {
            if self.dry_run {
                info!(path = %pointer.display(), "[dry-run] would delete orphan pointer");
            } else {
                self.delete_if_present(&pointer).await?;
                if let Some(parent) = pointer.parent() {
                    self.prune_empty_dirs(parent, root).await?;
                }
                info!(path = %pointer.display(), "Deleted orphan pointer");
            }
            records.push(ActionRecord {
                action: "delete_orphan_pointer",
                path: pointer,
                dry_run: self.dry_run,
            });
        }
        Ok(records)
    }

    async fn prune_empty_dirs(&self, start: &Path, root: &Path) -> Result<()> {
        let mut dir = start.to_path_buf();
        while dir.starts_with(root) && dir != root {
            if self.exists(&dir).await {
                let removed = self
                    .fs
                    .remove_dir_if_empty(&dir)
                    .await
                    .map_err(|e| write_error(&dir, e))?;
                if !removed {
                    break;
                }
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }

    async fn write(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.fs
                .create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }
        self.fs
            .write_file(path, data)
            .await
            .map_err(|e| write_error(path, e))
    }

    async fn delete_if_present(&self, path: &Path) -> Result<()> {
        match self.fs.delete_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted file");
                Ok(())
            }
            Err(BridgeError::NotFound(_)) => Ok(()),
            Err(e) => Err(write_error(path, e)),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        match self.fs.exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Existence probe failed");
                false
            }
        }
    }
}

fn write_error(path: &Path, err: BridgeError) -> SyncError {
    SyncError::Write {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
