//! Planned filesystem mutations
//!
//! The reconciler emits one [`EntityUnit`] per entity: the ordered actions the
//! writer must execute and the cache change to commit once they succeed.

use crate::state::EntityLifecycle;
use core_library::models::{CacheKey, CacheRecord, EntityKind, KnownFields, TargetPath};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Which artwork file to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkKind {
    Poster,
    Fanart,
}

/// The only unit of mutation the writer accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Write the pointer file with the stream URL, creating parent folders
    CreatePointer { target: TargetPath, stream_url: String },
    /// Render the NFO sidecar from known fields plus resolved metadata
    UpdateSidecar {
        target: TargetPath,
        kind: EntityKind,
        known: KnownFields,
    },
    /// Download poster or fanart next to the entity
    WriteArtwork {
        target: TargetPath,
        kind: EntityKind,
        known: KnownFields,
        artwork: ArtworkKind,
    },
    /// Remove the listed files an entity owned at `target`
    DeleteStalePointer {
        target: TargetPath,
        files: Vec<PathBuf>,
    },
    /// Remove `target.dir` and its parents while empty, stopping at `target.root`
    DeleteEmptyDirectory { target: TargetPath },
}

impl PlannedAction {
    pub fn name(&self) -> &'static str {
        match self {
            PlannedAction::CreatePointer { .. } => "create_pointer",
            PlannedAction::UpdateSidecar { .. } => "update_sidecar",
            PlannedAction::WriteArtwork { .. } => "write_artwork",
            PlannedAction::DeleteStalePointer { .. } => "delete_stale_pointer",
            PlannedAction::DeleteEmptyDirectory { .. } => "delete_empty_directory",
        }
    }

    pub fn target(&self) -> &TargetPath {
        match self {
            PlannedAction::CreatePointer { target, .. }
            | PlannedAction::UpdateSidecar { target, .. }
            | PlannedAction::WriteArtwork { target, .. }
            | PlannedAction::DeleteStalePointer { target, .. }
            | PlannedAction::DeleteEmptyDirectory { target } => target,
        }
    }

    /// The file or folder the action touches first
    pub fn path(&self) -> PathBuf {
        match self {
            PlannedAction::CreatePointer { target, .. } => target
                .pointer
                .clone()
                .unwrap_or_else(|| target.dir.clone()),
            PlannedAction::UpdateSidecar { target, .. } => target.nfo.clone(),
            PlannedAction::WriteArtwork {
                target, artwork, ..
            } => artwork_path(target, *artwork).unwrap_or_else(|| target.dir.clone()),
            PlannedAction::DeleteStalePointer { target, files } => files
                .first()
                .cloned()
                .or_else(|| target.pointer.clone())
                .unwrap_or_else(|| target.dir.clone()),
            PlannedAction::DeleteEmptyDirectory { target } => target.dir.clone(),
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            PlannedAction::DeleteStalePointer { .. } | PlannedAction::DeleteEmptyDirectory { .. }
        )
    }

    /// Whether the action needs the metadata provider
    pub fn needs_metadata(&self) -> bool {
        matches!(
            self,
            PlannedAction::UpdateSidecar { kind, .. } | PlannedAction::WriteArtwork { kind, .. }
                if *kind != EntityKind::Episode
        )
    }

    /// Intended-action record, as logged in dry-run mode
    pub fn record(&self, dry_run: bool) -> ActionRecord {
        ActionRecord {
            action: self.name(),
            path: self.path(),
            dry_run,
        }
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.path().display())
    }
}

/// Path of the requested artwork file, if the entity has one
pub fn artwork_path(target: &TargetPath, artwork: ArtworkKind) -> Option<PathBuf> {
    match artwork {
        ArtworkKind::Poster => target.poster.clone(),
        ArtworkKind::Fanart => target.fanart.clone(),
    }
}

/// What the writer did (or would do) for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub action: &'static str,
    pub path: PathBuf,
    pub dry_run: bool,
}

/// How an entity differs from what the cache and disk remember
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// No cache record
    New,
    /// Target path moved; delete at the old path, create at the new one
    Relocated,
    /// Same path, but content changed or files went missing
    Refreshed,
    Unchanged,
    /// Cached but absent from the listing; `confirmed` after the second miss
    Missing { confirmed: bool },
}

/// Summary bucket an entity lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Deleted,
    Skipped,
    Failed,
}

/// Cache change committed after the writer succeeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCommit {
    Put(CacheRecord),
    Delete(CacheKey),
}

/// Everything needed to move one entity to its desired state
#[derive(Debug, Clone)]
pub struct EntityUnit {
    pub lifecycle: EntityLifecycle,
    pub change: Change,
    pub actions: Vec<PlannedAction>,
    pub commit: CacheCommit,
}

impl EntityUnit {
    pub fn key(&self) -> &CacheKey {
        &self.lifecycle.key
    }

    /// Summary bucket when the actions succeed
    pub fn outcome(&self) -> Outcome {
        match self.change {
            Change::New => Outcome::Created,
            Change::Relocated | Change::Refreshed => Outcome::Updated,
            Change::Unchanged if self.actions.is_empty() => Outcome::Skipped,
            Change::Unchanged => Outcome::Updated,
            Change::Missing { confirmed: true } if !self.actions.is_empty() => Outcome::Deleted,
            Change::Missing { .. } => Outcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn target() -> TargetPath {
        let dir = Path::new("/vod/Demo/Movies/Sci-Fi/Inception (2010)");
        TargetPath {
            root: PathBuf::from("/vod/Demo/Movies"),
            dir: dir.to_path_buf(),
            pointer: Some(dir.join("Inception (2010).strm")),
            nfo: dir.join("movie.nfo"),
            poster: Some(dir.join("poster.jpg")),
            fanart: None,
        }
    }

    #[test]
    fn test_action_paths() {
        let create = PlannedAction::CreatePointer {
            target: target(),
            stream_url: "http://x/1".to_string(),
        };
        assert!(create.path().ends_with("Inception (2010).strm"));
        assert_eq!(
            create.to_string(),
            "create_pointer /vod/Demo/Movies/Sci-Fi/Inception (2010)/Inception (2010).strm"
        );

        let fanart = PlannedAction::WriteArtwork {
            target: target(),
            kind: EntityKind::Movie,
            known: KnownFields::default(),
            artwork: ArtworkKind::Fanart,
        };
        // No fanart slot planned; falls back to the folder
        assert_eq!(fanart.path(), target().dir);

        let cleanup = PlannedAction::DeleteEmptyDirectory { target: target() };
        assert!(cleanup.is_delete());
        assert!(!create.is_delete());
    }

    #[test]
    fn test_episode_sidecars_need_no_metadata() {
        let movie = PlannedAction::UpdateSidecar {
            target: target(),
            kind: EntityKind::Movie,
            known: KnownFields::default(),
        };
        let episode = PlannedAction::UpdateSidecar {
            target: target(),
            kind: EntityKind::Episode,
            known: KnownFields::default(),
        };
        assert!(movie.needs_metadata());
        assert!(!episode.needs_metadata());
    }
}
