//! Usage transaction records and operation outcomes

use serde::{Deserialize, Serialize};

use crate::context::{TransactionId, UserId};

/// Lifecycle status of a usage transaction
///
/// Transitions are one-shot: Pending→Committed, Pending→RolledBack, and
/// Committed→RolledBack (the refund path). Terminal variants carry their
/// outcome so a repeated commit or rollback can return the previously
/// recorded result instead of acting twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Begun, not yet finalized
    Pending,
    /// Quota increment applied
    Committed {
        /// Ledger count after the increment
        new_count: u32,
        /// When the commit happened
        committed_at_millis: u64,
    },
    /// Finalized without a net charge
    RolledBack {
        /// Whether a committed charge was refunded
        refunded: bool,
        /// When the rollback happened
        rolled_back_at_millis: u64,
    },
}

impl TransactionStatus {
    /// Whether the transaction has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One request's tentative quota consumption
///
/// Owned exclusively by the transaction store; callers only ever see
/// snapshots. Created by `begin`, mutated by `commit`/`rollback`/the sweep,
/// and physically removed by the sweep once its deadline passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageTransaction {
    /// Store-assigned identifier
    pub id: TransactionId,
    /// Owning user
    pub user_id: UserId,
    /// Creation time, millis since the UNIX epoch
    pub created_at_millis: u64,
    /// TTL deadline; the sweep removes the record once this passes
    pub deadline_millis: u64,
    /// Current status
    pub status: TransactionStatus,
}

impl UsageTransaction {
    /// Whether the deadline has passed at `now_millis`
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis > self.deadline_millis
    }
}

/// Result of `begin`
#[derive(Clone, Debug)]
pub enum BeginOutcome {
    /// Usage is under the limit; a pending transaction was created
    Allowed {
        /// Snapshot of the new pending transaction
        transaction: UsageTransaction,
        /// Usage at the time of the check
        current_usage: u32,
        /// The user's limit
        limit: u32,
    },
    /// Usage has reached the limit; nothing was created
    Denied {
        /// Usage at the time of the check
        current_usage: u32,
        /// The user's limit
        limit: u32,
    },
}

impl BeginOutcome {
    /// Whether the request was admitted
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Result of `commit`; never an error, never a panic
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The quota increment was applied
    Committed {
        /// Ledger count after the increment
        new_count: u32,
    },
    /// Previously committed; the recorded outcome, no second increment
    AlreadyCommitted {
        /// Ledger count recorded by the original commit
        new_count: u32,
    },
    /// Previously rolled back; nothing to commit
    AlreadyRolledBack,
    /// Pending but past its TTL deadline
    Expired,
    /// Unknown identifier, or already removed by the sweep
    NotFound,
    /// The ledger increment failed; the record stays pending
    LedgerFailed {
        /// The ledger's error description
        reason: Box<str>,
    },
}

impl CommitOutcome {
    /// Whether this call applied the increment
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// Stable label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed { .. } => "committed",
            Self::AlreadyCommitted { .. } => "already_committed",
            Self::AlreadyRolledBack => "already_rolledback",
            Self::Expired => "expired",
            Self::NotFound => "not_found",
            Self::LedgerFailed { .. } => "ledger_failed",
        }
    }
}

/// Result of `rollback`; never an error, never a panic
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Marked rolled back
    RolledBack {
        /// Whether a committed charge was refunded
        refunded: bool,
        /// Ledger count after the refund, when one was issued
        new_count: Option<u32>,
    },
    /// Previously rolled back; no second refund
    AlreadyRolledBack,
    /// Unknown identifier, or already removed by the sweep
    NotFound,
    /// The refund decrement failed; the record is still marked rolled back
    LedgerFailed {
        /// The ledger's error description
        reason: Box<str>,
    },
}

impl RollbackOutcome {
    /// Stable label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RolledBack { .. } => "rolledback",
            Self::AlreadyRolledBack => "already_rolledback",
            Self::NotFound => "not_found",
            Self::LedgerFailed { .. } => "ledger_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Committed {
            new_count: 1,
            committed_at_millis: 0
        }
        .is_terminal());
        assert!(TransactionStatus::RolledBack {
            refunded: false,
            rolled_back_at_millis: 0
        }
        .is_terminal());
    }

    #[test]
    fn test_expiry_check() {
        let txn = UsageTransaction {
            id: TransactionId::new(1),
            user_id: UserId::from("u1"),
            created_at_millis: 1_000,
            deadline_millis: 2_000,
            status: TransactionStatus::Pending,
        };
        assert!(!txn.is_expired(2_000));
        assert!(txn.is_expired(2_001));
    }
}
