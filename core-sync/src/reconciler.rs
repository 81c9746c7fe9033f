//! # Reconciler
//!
//! Pure diff between the desired state of a scope (one account's movies, or
//! one series and its episodes) and what the cache and the disk remember.
//!
//! ## Decisions
//!
//! | Cache record | Disk | Result |
//! |---|---|---|
//! | none | any | `CreatePointer` (+ sidecar/artwork when missing) |
//! | same fingerprint | pointer present | nothing (skip) |
//! | same fingerprint | pointer missing | `CreatePointer` |
//! | different target | any | delete at old path, then create at new path |
//! | different fingerprint, same target | any | `CreatePointer` + sidecar |
//! | record, entity absent | any | grace pass, then delete |
//!
//! Deletions never touch a path that another live entity of the scope
//! claims, so swapped names cannot delete freshly written files.
//!
//! Nothing here performs I/O; the caller supplies [`DiskProbe`]s.

use crate::action::{artwork_path, ArtworkKind, CacheCommit, Change, EntityUnit, PlannedAction};
use crate::state::{EntityLifecycle, EntityState};
use core_library::models::{CacheKey, CacheRecord, TargetPath};
use core_library::planner::DesiredEntity;
use core_runtime::config::FeatureFlags;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Consecutive missed listings after which an entity is considered gone
pub const GRACE_PASSES: u32 = 2;

/// Which optional files the reconciler plans, and how deletions behave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcilePolicy {
    pub write_sidecars: bool,
    pub write_artwork: bool,
    pub overwrite_sidecars: bool,
    pub overwrite_artwork: bool,
    pub delete_stale: bool,
    /// Ignore cache and disk; everything is new
    pub full_reset: bool,
}

impl From<&FeatureFlags> for ReconcilePolicy {
    fn from(flags: &FeatureFlags) -> Self {
        Self {
            write_sidecars: flags.write_sidecars,
            write_artwork: flags.write_artwork,
            overwrite_sidecars: flags.overwrite_sidecars,
            overwrite_artwork: flags.overwrite_artwork,
            delete_stale: flags.delete_stale,
            full_reset: flags.full_reset,
        }
    }
}

/// Which of an entity's files exist at its desired target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskProbe {
    pub pointer: bool,
    pub nfo: bool,
    pub poster: bool,
    pub fanart: bool,
}

impl DiskProbe {
    fn artwork(&self, artwork: ArtworkKind) -> bool {
        match artwork {
            ArtworkKind::Poster => self.poster,
            ArtworkKind::Fanart => self.fanart,
        }
    }
}

/// Every file path the desired entities of a scope will own
pub fn claimed_paths<'a>(desired: impl IntoIterator<Item = &'a DesiredEntity>) -> HashSet<PathBuf> {
    let mut claimed = HashSet::new();
    for entity in desired {
        claimed.extend(owned_files(&entity.target));
    }
    claimed
}

fn owned_files(target: &TargetPath) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = target.pointer.iter().cloned().collect();
    files.extend(target.sidecars());
    files
}

/// Pure reconciliation engine
#[derive(Debug, Clone)]
pub struct Reconciler {
    policy: ReconcilePolicy,
    now: i64,
}

impl Reconciler {
    /// `now` stamps the cache records this pass produces
    pub fn new(policy: ReconcilePolicy, now: i64) -> Self {
        Self { policy, now }
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Reconcile a whole scope
    ///
    /// `cached` holds the scope's cache records; records without a desired
    /// counterpart become stale units, which come first so that their
    /// deletions run before any creation. `claimed` must cover at least the
    /// scope's desired entities.
    pub fn reconcile_scope(
        &self,
        account: &str,
        desired: &[DesiredEntity],
        cached: &[CacheRecord],
        probes: &HashMap<CacheKey, DiskProbe>,
        claimed: &HashSet<PathBuf>,
    ) -> Vec<EntityUnit> {
        let cached_by_key: HashMap<CacheKey, &CacheRecord> = if self.policy.full_reset {
            HashMap::new()
        } else {
            cached.iter().map(|r| (r.key(), r)).collect()
        };
        let desired_keys: HashSet<CacheKey> = desired.iter().map(|d| d.key(account)).collect();

        let mut stale: Vec<&CacheRecord> = cached_by_key
            .values()
            .filter(|r| !desired_keys.contains(&r.key()))
            .copied()
            .collect();
        stale.sort_by(|a, b| a.key().cmp(&b.key()));

        let mut units: Vec<EntityUnit> = stale
            .into_iter()
            .map(|record| self.reconcile_missing(record, claimed))
            .collect();

        units.extend(desired.iter().map(|entity| {
            let key = entity.key(account);
            let probe = probes.get(&key).copied().unwrap_or_default();
            self.reconcile_present(account, entity, cached_by_key.get(&key).copied(), probe, claimed)
        }));

        units
    }

    /// Decide the actions for an entity present in this run's listing
    pub fn reconcile_present(
        &self,
        account: &str,
        desired: &DesiredEntity,
        cached: Option<&CacheRecord>,
        probe: DiskProbe,
        claimed: &HashSet<PathBuf>,
    ) -> EntityUnit {
        let (cached, probe) = if self.policy.full_reset {
            (None, DiskProbe::default())
        } else {
            (cached, probe)
        };

        let snapshot = desired.snapshot();
        let fingerprint = snapshot.fingerprint();
        let has_pointer = desired.stream_url.is_some();

        let change = match cached {
            None => Change::New,
            Some(record) if record.snapshot.target != desired.target => Change::Relocated,
            Some(record) if record.fingerprint != fingerprint => Change::Refreshed,
            Some(_) if has_pointer && !probe.pointer => Change::Refreshed,
            Some(_) => Change::Unchanged,
        };
        let metadata_missing = cached.map_or(true, |r| r.metadata_fingerprint.is_none());

        let mut actions = Vec::new();

        if let (Change::Relocated, Some(record)) = (change, cached) {
            actions.extend(self.removal_actions(&record.snapshot.target, claimed));
        }

        if let Some(url) = &desired.stream_url {
            if change != Change::Unchanged {
                actions.push(PlannedAction::CreatePointer {
                    target: desired.target.clone(),
                    stream_url: url.clone(),
                });
            }
        }

        if self.policy.write_sidecars {
            let wanted = self.policy.overwrite_sidecars
                || match change {
                    Change::New => !probe.nfo,
                    Change::Relocated | Change::Refreshed => true,
                    _ => !probe.nfo || metadata_missing,
                };
            if wanted {
                actions.push(PlannedAction::UpdateSidecar {
                    target: desired.target.clone(),
                    kind: desired.kind,
                    known: desired.known.clone(),
                });
            }
        }

        if self.policy.write_artwork {
            for artwork in [ArtworkKind::Poster, ArtworkKind::Fanart] {
                if artwork_path(&desired.target, artwork).is_none() {
                    continue;
                }
                let present = probe.artwork(artwork);
                let wanted = self.policy.overwrite_artwork
                    || match change {
                        Change::Relocated => true,
                        Change::New | Change::Refreshed => !present,
                        _ => !present && metadata_missing,
                    };
                if wanted {
                    actions.push(PlannedAction::WriteArtwork {
                        target: desired.target.clone(),
                        kind: desired.kind,
                        known: desired.known.clone(),
                        artwork,
                    });
                }
            }
        }

        let mut record = CacheRecord::new(
            account,
            desired.kind,
            &desired.entity_id,
            snapshot,
            self.now,
        );
        record.parent_id = desired.parent_id.clone();
        record.metadata_fingerprint = cached.and_then(|r| r.metadata_fingerprint.clone());

        EntityUnit {
            lifecycle: EntityLifecycle::fetched(desired.key(account))
                .advanced(EntityState::Planned)
                .advanced(EntityState::Reconciled),
            change,
            actions,
            commit: CacheCommit::Put(record),
        }
    }

    /// Decide what happens to a cached entity missing from the listing
    ///
    /// The first miss only bumps the counter. The second confirms the
    /// absence: the record is dropped, and with stale cleanup enabled its
    /// files and any folders left empty are removed too.
    pub fn reconcile_missing(&self, record: &CacheRecord, claimed: &HashSet<PathBuf>) -> EntityUnit {
        let misses = record.missed_passes + 1;
        let lifecycle = EntityLifecycle::stale(record.key()).advanced(EntityState::PendingDelete);

        if misses >= GRACE_PASSES {
            let actions = if self.policy.delete_stale {
                self.removal_actions(&record.snapshot.target, claimed)
            } else {
                Vec::new()
            };
            return EntityUnit {
                lifecycle,
                change: Change::Missing { confirmed: true },
                actions,
                commit: CacheCommit::Delete(record.key()),
            };
        }

        let mut kept = record.clone();
        kept.missed_passes = misses;
        kept.updated_at = self.now;

        EntityUnit {
            lifecycle,
            change: Change::Missing { confirmed: false },
            actions: Vec::new(),
            commit: CacheCommit::Put(kept),
        }
    }

    fn removal_actions(&self, target: &TargetPath, claimed: &HashSet<PathBuf>) -> Vec<PlannedAction> {
        let files: Vec<PathBuf> = owned_files(target)
            .into_iter()
            .filter(|f| !claimed.contains(f))
            .collect();

        let mut actions = Vec::new();
        if !files.is_empty() {
            actions.push(PlannedAction::DeleteStalePointer {
                target: target.clone(),
                files,
            });
        }
        actions.push(PlannedAction::DeleteEmptyDirectory {
            target: target.clone(),
        });
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Outcome;
    use core_library::models::{EntityKind, KnownFields, NormalizedName};

    const ACCOUNT: &str = "Demo";

    fn movie(id: &str, title: &str, category: &str, url: &str) -> DesiredEntity {
        let root = PathBuf::from("/vod/Demo/Movies");
        let folder = format!("{} (2010)", title);
        let dir = root.join(category).join(&folder);
        DesiredEntity {
            kind: EntityKind::Movie,
            entity_id: id.to_string(),
            parent_id: None,
            name: NormalizedName {
                title: title.to_string(),
                year: Some(2010),
            },
            category: category.to_string(),
            stream_url: Some(url.to_string()),
            target: TargetPath {
                root,
                pointer: Some(dir.join(format!("{}.strm", folder))),
                nfo: dir.join("movie.nfo"),
                poster: Some(dir.join("poster.jpg")),
                fanart: Some(dir.join("fanart.jpg")),
                dir,
            },
            known: KnownFields {
                title: title.to_string(),
                year: Some(2010),
                ..KnownFields::default()
            },
        }
    }

    fn record_of(entity: &DesiredEntity) -> CacheRecord {
        let mut record = CacheRecord::new(ACCOUNT, entity.kind, &entity.entity_id, entity.snapshot(), 1);
        record.metadata_fingerprint = Some("catalog".to_string());
        record
    }

    fn all_present() -> DiskProbe {
        DiskProbe {
            pointer: true,
            nfo: true,
            poster: true,
            fanart: true,
        }
    }

    fn reconciler(policy: ReconcilePolicy) -> Reconciler {
        Reconciler::new(policy, 100)
    }

    #[test]
    fn test_new_entity_creates_pointer() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://h/proxy/vod/movie/u1");
        let unit = reconciler(ReconcilePolicy::default()).reconcile_present(
            ACCOUNT,
            &entity,
            None,
            DiskProbe::default(),
            &claimed_paths([&entity]),
        );

        assert_eq!(unit.change, Change::New);
        assert_eq!(unit.outcome(), Outcome::Created);
        assert_eq!(unit.lifecycle.state(), EntityState::Reconciled);
        assert_eq!(
            unit.actions,
            vec![PlannedAction::CreatePointer {
                target: entity.target.clone(),
                stream_url: "http://h/proxy/vod/movie/u1".to_string(),
            }]
        );
        match unit.commit {
            CacheCommit::Put(record) => {
                assert_eq!(record.entity_id, "1");
                assert_eq!(record.missed_passes, 0);
                assert_eq!(record.updated_at, 100);
            }
            other => panic!("unexpected commit {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_entity_is_skipped() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let policy = ReconcilePolicy {
            write_sidecars: true,
            write_artwork: true,
            ..ReconcilePolicy::default()
        };
        let unit = reconciler(policy).reconcile_present(
            ACCOUNT,
            &entity,
            Some(&record_of(&entity)),
            all_present(),
            &claimed_paths([&entity]),
        );

        assert_eq!(unit.change, Change::Unchanged);
        assert!(unit.actions.is_empty());
        assert_eq!(unit.outcome(), Outcome::Skipped);
    }

    #[test]
    fn test_missing_pointer_is_recreated() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let unit = reconciler(ReconcilePolicy::default()).reconcile_present(
            ACCOUNT,
            &entity,
            Some(&record_of(&entity)),
            DiskProbe::default(),
            &claimed_paths([&entity]),
        );

        assert_eq!(unit.change, Change::Refreshed);
        assert_eq!(unit.actions.len(), 1);
        assert_eq!(unit.actions[0].name(), "create_pointer");
    }

    #[test]
    fn test_category_change_is_delete_then_create() {
        let old = movie("1", "Inception", "Sci-Fi", "http://x");
        let new = movie("1", "Inception", "Thriller", "http://x");
        let unit = reconciler(ReconcilePolicy::default()).reconcile_present(
            ACCOUNT,
            &new,
            Some(&record_of(&old)),
            DiskProbe::default(),
            &claimed_paths([&new]),
        );

        assert_eq!(unit.change, Change::Relocated);
        let names: Vec<&str> = unit.actions.iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec!["delete_stale_pointer", "delete_empty_directory", "create_pointer"]
        );
        assert_eq!(unit.actions[0].target(), &old.target);
        assert_eq!(unit.actions[2].target(), &new.target);
        assert_eq!(
            unit.actions.iter().filter(|a| a.name() == "delete_stale_pointer").count(),
            1
        );
    }

    #[test]
    fn test_swap_does_not_delete_claimed_paths() {
        // A takes B's old name while B moves elsewhere
        let a_new = movie("a", "Beta", "Drama", "http://a");
        let b_new = movie("b", "Gamma", "Drama", "http://b");

        let claimed = claimed_paths([&a_new, &b_new]);
        let b_old = movie("b", "Beta", "Drama", "http://b");
        let unit = reconciler(ReconcilePolicy::default()).reconcile_present(
            ACCOUNT,
            &b_new,
            Some(&record_of(&b_old)),
            DiskProbe::default(),
            &claimed,
        );

        // All of B's old files are claimed by A, so only the folder prune remains
        assert!(unit
            .actions
            .iter()
            .all(|a| a.name() != "delete_stale_pointer"));
    }

    #[test]
    fn test_stream_url_change_rewrites_in_place() {
        let old = movie("1", "Inception", "Sci-Fi", "http://old");
        let new = movie("1", "Inception", "Sci-Fi", "http://new");
        let policy = ReconcilePolicy {
            write_sidecars: true,
            ..ReconcilePolicy::default()
        };
        let unit = reconciler(policy).reconcile_present(
            ACCOUNT,
            &new,
            Some(&record_of(&old)),
            all_present(),
            &claimed_paths([&new]),
        );

        assert_eq!(unit.change, Change::Refreshed);
        let names: Vec<&str> = unit.actions.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["create_pointer", "update_sidecar"]);
    }

    #[test]
    fn test_sidecars_and_artwork_for_new_entity() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let policy = ReconcilePolicy {
            write_sidecars: true,
            write_artwork: true,
            ..ReconcilePolicy::default()
        };
        let probe = DiskProbe {
            poster: true,
            ..DiskProbe::default()
        };
        let unit = reconciler(policy).reconcile_present(
            ACCOUNT,
            &entity,
            None,
            probe,
            &claimed_paths([&entity]),
        );

        let names: Vec<&str> = unit.actions.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["create_pointer", "update_sidecar", "write_artwork"]);
        assert!(matches!(
            unit.actions[2],
            PlannedAction::WriteArtwork {
                artwork: ArtworkKind::Fanart,
                ..
            }
        ));
    }

    #[test]
    fn test_overwrite_flags_force_rewrite() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let policy = ReconcilePolicy {
            write_sidecars: true,
            write_artwork: true,
            overwrite_sidecars: true,
            overwrite_artwork: true,
            ..ReconcilePolicy::default()
        };
        let unit = reconciler(policy).reconcile_present(
            ACCOUNT,
            &entity,
            Some(&record_of(&entity)),
            all_present(),
            &claimed_paths([&entity]),
        );

        assert_eq!(unit.change, Change::Unchanged);
        assert_eq!(unit.actions.len(), 3);
        assert_eq!(unit.outcome(), Outcome::Updated);
    }

    #[test]
    fn test_unresolved_metadata_is_retried() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let mut record = record_of(&entity);
        record.metadata_fingerprint = None;
        let policy = ReconcilePolicy {
            write_sidecars: true,
            ..ReconcilePolicy::default()
        };
        let unit = reconciler(policy).reconcile_present(
            ACCOUNT,
            &entity,
            Some(&record),
            all_present(),
            &claimed_paths([&entity]),
        );

        assert_eq!(unit.actions.len(), 1);
        assert_eq!(unit.actions[0].name(), "update_sidecar");
    }

    #[test]
    fn test_missing_entity_grace_then_delete() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let policy = ReconcilePolicy {
            delete_stale: true,
            ..ReconcilePolicy::default()
        };
        let reconciler = reconciler(policy);
        let claimed = HashSet::new();

        let first = reconciler.reconcile_missing(&record_of(&entity), &claimed);
        assert_eq!(first.change, Change::Missing { confirmed: false });
        assert!(first.actions.is_empty());
        assert_eq!(first.lifecycle.state(), EntityState::PendingDelete);
        let kept = match &first.commit {
            CacheCommit::Put(record) => record.clone(),
            other => panic!("unexpected commit {:?}", other),
        };
        assert_eq!(kept.missed_passes, 1);

        let second = reconciler.reconcile_missing(&kept, &claimed);
        assert_eq!(second.change, Change::Missing { confirmed: true });
        assert_eq!(second.outcome(), Outcome::Deleted);
        assert_eq!(second.commit, CacheCommit::Delete(kept.key()));
        match &second.actions[0] {
            PlannedAction::DeleteStalePointer { files, .. } => {
                assert!(files.contains(&entity.target.pointer.clone().unwrap()));
                assert!(files.contains(&entity.target.nfo));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_confirmed_absence_without_cleanup_drops_record_only() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let mut record = record_of(&entity);
        record.missed_passes = 1;

        let unit = reconciler(ReconcilePolicy::default()).reconcile_missing(&record, &HashSet::new());
        assert!(unit.actions.is_empty());
        assert_eq!(unit.commit, CacheCommit::Delete(record.key()));
        assert_eq!(unit.outcome(), Outcome::Skipped);
    }

    #[test]
    fn test_scope_orders_stale_first() {
        let kept = movie("1", "Inception", "Sci-Fi", "http://x");
        let gone = movie("2", "Memento", "Drama", "http://y");
        let mut gone_record = record_of(&gone);
        gone_record.missed_passes = 1;

        let policy = ReconcilePolicy {
            delete_stale: true,
            ..ReconcilePolicy::default()
        };
        let units = reconciler(policy).reconcile_scope(
            ACCOUNT,
            &[kept.clone()],
            &[record_of(&kept), gone_record],
            &HashMap::from([(kept.key(ACCOUNT), all_present())]),
            &claimed_paths([&kept]),
        );

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].key().entity_id, "2");
        assert_eq!(units[0].outcome(), Outcome::Deleted);
        assert_eq!(units[1].outcome(), Outcome::Skipped);
    }

    #[test]
    fn test_full_reset_ignores_cache_and_disk() {
        let entity = movie("1", "Inception", "Sci-Fi", "http://x");
        let stale = movie("2", "Memento", "Drama", "http://y");
        let policy = ReconcilePolicy {
            full_reset: true,
            delete_stale: true,
            ..ReconcilePolicy::default()
        };
        let units = reconciler(policy).reconcile_scope(
            ACCOUNT,
            &[entity.clone()],
            &[record_of(&entity), record_of(&stale)],
            &HashMap::from([(entity.key(ACCOUNT), all_present())]),
            &claimed_paths([&entity]),
        );

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].change, Change::New);
        assert_eq!(units[0].actions[0].name(), "create_pointer");
    }
}
