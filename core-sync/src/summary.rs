//! Run and per-account statistics

use crate::action::{ActionRecord, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Counters for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Why the account could not be processed at all
    pub fatal: Option<String>,
    /// Filesystem actions taken (or intended, in dry-run mode), in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRecord>,
}

impl AccountSummary {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Add another tally's counters and actions (fatal state is not merged)
    pub fn absorb(&mut self, other: &AccountSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.actions.extend(other.actions.iter().cloned());
    }

    pub fn total(&self) -> u64 {
        self.created + self.updated + self.deleted + self.skipped + self.failed
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

impl fmt::Display for AccountSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} skipped, {} failed",
            self.created, self.updated, self.deleted, self.skipped, self.failed
        )
    }
}

/// Outcome of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub accounts: Vec<AccountSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl RunSummary {
    /// Counters over every account
    pub fn totals(&self) -> AccountSummary {
        let mut totals = AccountSummary::new("*");
        for account in &self.accounts {
            totals.absorb(account);
        }
        totals
    }

    /// True when accounts were matched but none could be processed
    pub fn all_accounts_fatal(&self) -> bool {
        !self.accounts.is_empty() && self.accounts.iter().all(AccountSummary::is_fatal)
    }

    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }
}
