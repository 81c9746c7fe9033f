//! # Entity State Machine
//!
//! Tracks one catalog entity through a reconciliation pass with validated
//! transitions.
//!
//! ## State Machine
//!
//! ```text
//! Unknown → Fetched → Planned → Reconciled → Applied
//!    ↓         ↓         ↓           ↓
//!    └─────────┴─────────┴─────────→ Failed
//!
//! Stale → PendingDelete → Deleted
//!    ↓          ↓
//!    └──────────┴──────→ Failed
//! ```
//!
//! `Applied`, `Deleted` and `Failed` are terminal for the run. A `Failed`
//! entity is retried on the next run from `Unknown` (or `Stale`), because its
//! cache record was never committed.

use crate::{Result, SyncError};
use core_library::models::CacheKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where an entity is in the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// No cache record, not yet fetched
    Unknown,
    /// Raw entity obtained this run
    Fetched,
    /// Target path computed
    Planned,
    /// Actions decided
    Reconciled,
    /// Writer executed the actions (or dry-run recorded them)
    Applied,
    /// Cached, absent from this run's listing
    Stale,
    /// Inside the grace window, or confirmed and awaiting deletion
    PendingDelete,
    Deleted,
    Failed,
}

impl EntityState {
    /// Check if this state ends the entity's run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntityState::Applied | EntityState::Deleted | EntityState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Unknown => "unknown",
            EntityState::Fetched => "fetched",
            EntityState::Planned => "planned",
            EntityState::Reconciled => "reconciled",
            EntityState::Applied => "applied",
            EntityState::Stale => "stale",
            EntityState::PendingDelete => "pending_delete",
            EntityState::Deleted => "deleted",
            EntityState::Failed => "failed",
        }
    }

    fn can_transition_to(self, to: EntityState) -> bool {
        use EntityState::*;
        match (self, to) {
            (Unknown, Fetched) => true,
            (Fetched, Planned) => true,
            (Planned, Reconciled) => true,
            (Reconciled, Applied) => true,

            (Stale, PendingDelete) => true,
            (PendingDelete, Deleted) => true,

            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }
}

impl FromStr for EntityState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(EntityState::Unknown),
            "fetched" => Ok(EntityState::Fetched),
            "planned" => Ok(EntityState::Planned),
            "reconciled" => Ok(EntityState::Reconciled),
            "applied" => Ok(EntityState::Applied),
            "stale" => Ok(EntityState::Stale),
            "pending_delete" => Ok(EntityState::PendingDelete),
            "deleted" => Ok(EntityState::Deleted),
            "failed" => Ok(EntityState::Failed),
            _ => Err(SyncError::InvalidStateTransition {
                from: s.to_string(),
                to: s.to_string(),
                reason: "unrecognized state".to_string(),
            }),
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one entity in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLifecycle {
    pub key: CacheKey,
    state: EntityState,
    /// Why the entity failed, if it did
    pub error_message: Option<String>,
}

impl EntityLifecycle {
    /// An entity seen in this run's listing
    pub fn fetched(key: CacheKey) -> Self {
        Self {
            key,
            state: EntityState::Unknown,
            error_message: None,
        }
        .advanced(EntityState::Fetched)
    }

    /// A cached entity missing from this run's listing
    pub fn stale(key: CacheKey) -> Self {
        Self {
            key,
            state: EntityState::Stale,
            error_message: None,
        }
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    /// Move to `to`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] when the table does not
    /// allow the move.
    pub fn advance(&mut self, to: EntityState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("{} cannot move from {} to {}", self.key, self.state, to),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Mark failed with a reason; a no-op on terminal states
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.state.can_transition_to(EntityState::Failed) {
            self.state = EntityState::Failed;
            self.error_message = Some(message.into());
        }
    }

    /// Builder-style [`advance`](Self::advance) for transitions known to be
    /// valid; an invalid one leaves the state unchanged
    pub(crate) fn advanced(mut self, to: EntityState) -> Self {
        if self.state.can_transition_to(to) {
            self.state = to;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::EntityKind;

    fn key() -> CacheKey {
        CacheKey::new("Demo", EntityKind::Movie, "1")
    }

    #[test]
    fn test_present_entity_path() {
        let mut lifecycle = EntityLifecycle::fetched(key());
        assert_eq!(lifecycle.state(), EntityState::Fetched);

        lifecycle.advance(EntityState::Planned).unwrap();
        lifecycle.advance(EntityState::Reconciled).unwrap();
        lifecycle.advance(EntityState::Applied).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn test_stale_entity_path() {
        let mut lifecycle = EntityLifecycle::stale(key());
        lifecycle.advance(EntityState::PendingDelete).unwrap();
        lifecycle.advance(EntityState::Deleted).unwrap();
        assert_eq!(lifecycle.state(), EntityState::Deleted);
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut lifecycle = EntityLifecycle::fetched(key());
        let err = lifecycle.advance(EntityState::Applied).unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));

        let mut stale = EntityLifecycle::stale(key());
        assert!(stale.advance(EntityState::Deleted).is_err());
        assert!(stale.advance(EntityState::Planned).is_err());
    }

    #[test]
    fn test_fail_from_any_active_state() {
        let mut lifecycle = EntityLifecycle::fetched(key());
        lifecycle.advance(EntityState::Planned).unwrap();
        lifecycle.fail("disk full");
        assert_eq!(lifecycle.state(), EntityState::Failed);
        assert_eq!(lifecycle.error_message.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let mut lifecycle = EntityLifecycle::fetched(key());
        lifecycle.advance(EntityState::Planned).unwrap();
        lifecycle.advance(EntityState::Reconciled).unwrap();
        lifecycle.advance(EntityState::Applied).unwrap();

        lifecycle.fail("late error");
        assert_eq!(lifecycle.state(), EntityState::Applied);
        assert!(lifecycle.advance(EntityState::Failed).is_err());
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(
            "pending_delete".parse::<EntityState>().unwrap(),
            EntityState::PendingDelete
        );
        assert_eq!("APPLIED".parse::<EntityState>().unwrap(), EntityState::Applied);
        assert!("bogus".parse::<EntityState>().is_err());
    }
}
