//! Coordinator statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters for the metering core
pub struct MeterStats {
    /// Logical requests entering the coordinator
    pub requests_started: AtomicU64,
    /// Requests rejected by a precondition check
    pub preconditions_failed: AtomicU64,
    /// Requests denied by the quota check
    pub quota_denied: AtomicU64,
    /// Pending transactions created
    pub transactions_begun: AtomicU64,
    /// Transactions committed with a persisted increment
    pub transactions_committed: AtomicU64,
    /// Transactions rolled back
    pub transactions_rolled_back: AtomicU64,
    /// Commit-time ledger failures needing reconciliation
    pub commit_ledger_failures: AtomicU64,
    /// Rollback-time ledger failures needing reconciliation
    pub rollback_ledger_failures: AtomicU64,
    /// Fallback attempts run
    pub fallback_attempts: AtomicU64,
    /// Requests that returned an accepted result
    pub requests_succeeded: AtomicU64,
    /// Requests that exhausted every attempt
    pub requests_exhausted: AtomicU64,
    /// Requests aborted by a non-retryable error
    pub requests_aborted: AtomicU64,
}

impl MeterStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self {
            requests_started: AtomicU64::new(0),
            preconditions_failed: AtomicU64::new(0),
            quota_denied: AtomicU64::new(0),
            transactions_begun: AtomicU64::new(0),
            transactions_committed: AtomicU64::new(0),
            transactions_rolled_back: AtomicU64::new(0),
            commit_ledger_failures: AtomicU64::new(0),
            rollback_ledger_failures: AtomicU64::new(0),
            fallback_attempts: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_exhausted: AtomicU64::new(0),
            requests_aborted: AtomicU64::new(0),
        }
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MeterStatsSnapshot {
        MeterStatsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            preconditions_failed: self.preconditions_failed.load(Ordering::Relaxed),
            quota_denied: self.quota_denied.load(Ordering::Relaxed),
            transactions_begun: self.transactions_begun.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            commit_ledger_failures: self.commit_ledger_failures.load(Ordering::Relaxed),
            rollback_ledger_failures: self.rollback_ledger_failures.load(Ordering::Relaxed),
            fallback_attempts: self.fallback_attempts.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_exhausted: self.requests_exhausted.load(Ordering::Relaxed),
            requests_aborted: self.requests_aborted.load(Ordering::Relaxed),
        }
    }
}

impl Default for MeterStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen view of [`MeterStats`]
#[derive(Clone, Debug)]
pub struct MeterStatsSnapshot {
    /// Logical requests entering the coordinator
    pub requests_started: u64,
    /// Requests rejected by a precondition check
    pub preconditions_failed: u64,
    /// Requests denied by the quota check
    pub quota_denied: u64,
    /// Pending transactions created
    pub transactions_begun: u64,
    /// Transactions committed with a persisted increment
    pub transactions_committed: u64,
    /// Transactions rolled back
    pub transactions_rolled_back: u64,
    /// Commit-time ledger failures needing reconciliation
    pub commit_ledger_failures: u64,
    /// Rollback-time ledger failures needing reconciliation
    pub rollback_ledger_failures: u64,
    /// Fallback attempts run
    pub fallback_attempts: u64,
    /// Requests that returned an accepted result
    pub requests_succeeded: u64,
    /// Requests that exhausted every attempt
    pub requests_exhausted: u64,
    /// Requests aborted by a non-retryable error
    pub requests_aborted: u64,
}
