//! # Sync Engine Module
//!
//! Incremental export of catalog entities to pointer files.
//!
//! ## Overview
//!
//! Each run compares what the catalog lists now with what the cache
//! remembers from the previous run and what is on disk, and applies the
//! minimal set of filesystem changes:
//! - Creating pointer files for new entities
//! - Moving entities whose canonical path changed
//! - Writing NFO sidecars and artwork when enabled
//! - Removing entities absent for two consecutive runs
//!
//! ## Components
//!
//! - **Entity State Machine** (`state`): Per-entity lifecycle with validated transitions
//! - **Actions** (`action`): Planned mutations and the per-entity unit of work
//! - **Reconciler** (`reconciler`): Pure diff of desired state against cache and disk
//! - **Episode Merge** (`merge`): Combines fallback episode listings with persisted ones
//! - **Writer** (`writer`): Executes actions, honours dry-run, resolves metadata
//! - **Sync Coordinator** (`coordinator`): Orchestrates accounts, scopes and commits

pub mod action;
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod reconciler;
pub mod state;
pub mod summary;
pub mod writer;

pub use action::{ActionRecord, ArtworkKind, CacheCommit, Change, EntityUnit, Outcome, PlannedAction};
pub use coordinator::SyncCoordinator;
pub use error::{Result, SyncError};
pub use reconciler::{DiskProbe, ReconcilePolicy, Reconciler, GRACE_PASSES};
pub use state::{EntityLifecycle, EntityState};
pub use summary::{AccountSummary, RunSummary};
pub use writer::{MetadataStamp, WriteReport, Writer};
