//! Transaction store
//!
//! Owns the keyed collection of usage transactions. Quota checking is
//! decoupled from quota committing: `begin` only reads the ledger, and the
//! increment happens at `commit` time, after the request has produced a
//! result worth billing. Every per-identifier operation is a single locked
//! read-modify-write, so concurrent commit/rollback/sweep calls against the
//! same transaction cannot both win.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::context::{now_millis, TransactionId, UserId};
use crate::ledger::{LedgerError, QuotaLedger};
use crate::transaction::{
    BeginOutcome, CommitOutcome, RollbackOutcome, TransactionStatus, UsageTransaction,
};

/// Store trait
///
/// The seam where a shared backing store would plug in for horizontal
/// scale-out; this core ships a process-local implementation only, so a
/// transaction begun on one instance cannot be committed on another.
pub trait TransactionStore: Send + Sync + 'static {
    /// Check quota and, if there is capacity, create a pending transaction.
    /// Read-only against the ledger; denial creates nothing.
    fn begin(&self, user_id: &UserId) -> Result<BeginOutcome, LedgerError>;
    /// Finalize a transaction by applying its quota increment. Idempotent;
    /// never panics and never errors past the structured outcome.
    fn commit(&self, id: TransactionId) -> CommitOutcome;
    /// Undo a transaction's effect, refunding only if it had committed.
    /// Idempotent; never panics and never errors past the structured outcome.
    fn rollback(&self, id: TransactionId) -> RollbackOutcome;
    /// Remove every record whose deadline has passed, regardless of status.
    /// Returns the count removed.
    fn sweep(&self) -> usize;
}

/// Timing knobs for the in-memory store
#[derive(Clone, Copy, Debug)]
pub struct StoreConfig {
    /// Lifetime of a pending transaction before forcible expiry
    pub transaction_ttl: Duration,
    /// How long a terminal record is retained before the sweep removes it
    pub retention_grace: Duration,
}

impl StoreConfig {
    /// Default pending lifetime: 5 minutes
    pub const DEFAULT_TRANSACTION_TTL: Duration = Duration::from_millis(300_000);
    /// Default terminal retention: 30 seconds
    pub const DEFAULT_RETENTION_GRACE: Duration = Duration::from_millis(30_000);
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            transaction_ttl: Self::DEFAULT_TRANSACTION_TTL,
            retention_grace: Self::DEFAULT_RETENTION_GRACE,
        }
    }
}

/// Process-local transaction store
pub struct InMemoryTransactionStore {
    ledger: Arc<dyn QuotaLedger>,
    entries: Mutex<HashMap<u64, UsageTransaction>>,
    counter: AtomicU64,
    config: StoreConfig,
}

impl InMemoryTransactionStore {
    /// Store over the given ledger with default timing
    pub fn new(ledger: Arc<dyn QuotaLedger>) -> Self {
        Self::with_config(ledger, StoreConfig::default())
    }

    /// Store over the given ledger with explicit timing
    pub fn with_config(ledger: Arc<dyn QuotaLedger>, config: StoreConfig) -> Self {
        Self {
            ledger,
            entries: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(1),
            config,
        }
    }

    /// Live records, any status
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Whether no records are held
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<u64, UsageTransaction>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn begin(&self, user_id: &UserId) -> Result<BeginOutcome, LedgerError> {
        let snapshot = self.ledger.usage(user_id)?;
        if !snapshot.has_capacity() {
            return Ok(BeginOutcome::Denied {
                current_usage: snapshot.count,
                limit: snapshot.limit,
            });
        }

        let now = now_millis();
        let transaction = UsageTransaction {
            id: TransactionId::new(self.counter.fetch_add(1, Ordering::Relaxed)),
            user_id: user_id.clone(),
            created_at_millis: now,
            deadline_millis: now + self.config.transaction_ttl.as_millis() as u64,
            status: TransactionStatus::Pending,
        };

        self.lock_entries()
            .insert(transaction.id.get(), transaction.clone());
        tracing::debug!(
            transaction_id = %transaction.id,
            user_id = %user_id,
            current_usage = snapshot.count,
            limit = snapshot.limit,
            "usage transaction begun"
        );

        Ok(BeginOutcome::Allowed {
            transaction,
            current_usage: snapshot.count,
            limit: snapshot.limit,
        })
    }

    fn commit(&self, id: TransactionId) -> CommitOutcome {
        let now = now_millis();
        let mut entries = self.lock_entries();
        let Some(record) = entries.get_mut(&id.get()) else {
            return CommitOutcome::NotFound;
        };

        match record.status {
            TransactionStatus::Committed { new_count, .. } => {
                CommitOutcome::AlreadyCommitted { new_count }
            }
            TransactionStatus::RolledBack { .. } => CommitOutcome::AlreadyRolledBack,
            TransactionStatus::Pending => {
                if record.is_expired(now) {
                    return CommitOutcome::Expired;
                }
                match self.ledger.increment(&record.user_id) {
                    Ok(new_count) => {
                        record.status = TransactionStatus::Committed {
                            new_count,
                            committed_at_millis: now,
                        };
                        record.deadline_millis =
                            now + self.config.retention_grace.as_millis() as u64;
                        CommitOutcome::Committed { new_count }
                    }
                    Err(err) => {
                        tracing::error!(
                            transaction_id = %id,
                            user_id = %record.user_id,
                            error = %err,
                            "quota increment failed on commit; manual reconciliation required"
                        );
                        CommitOutcome::LedgerFailed {
                            reason: err.to_string().into(),
                        }
                    }
                }
            }
        }
    }

    fn rollback(&self, id: TransactionId) -> RollbackOutcome {
        let now = now_millis();
        let mut entries = self.lock_entries();
        let Some(record) = entries.get_mut(&id.get()) else {
            return RollbackOutcome::NotFound;
        };

        match record.status {
            TransactionStatus::RolledBack { .. } => RollbackOutcome::AlreadyRolledBack,
            TransactionStatus::Pending => {
                record.status = TransactionStatus::RolledBack {
                    refunded: false,
                    rolled_back_at_millis: now,
                };
                record.deadline_millis = now + self.config.retention_grace.as_millis() as u64;
                RollbackOutcome::RolledBack {
                    refunded: false,
                    new_count: None,
                }
            }
            TransactionStatus::Committed { .. } => match self.ledger.decrement(&record.user_id) {
                Ok(new_count) => {
                    record.status = TransactionStatus::RolledBack {
                        refunded: true,
                        rolled_back_at_millis: now,
                    };
                    record.deadline_millis = now + self.config.retention_grace.as_millis() as u64;
                    RollbackOutcome::RolledBack {
                        refunded: true,
                        new_count: Some(new_count),
                    }
                }
                Err(err) => {
                    tracing::error!(
                        transaction_id = %id,
                        user_id = %record.user_id,
                        error = %err,
                        "quota refund failed on rollback; manual reconciliation required"
                    );
                    record.status = TransactionStatus::RolledBack {
                        refunded: false,
                        rolled_back_at_millis: now,
                    };
                    record.deadline_millis = now + self.config.retention_grace.as_millis() as u64;
                    RollbackOutcome::LedgerFailed {
                        reason: err.to_string().into(),
                    }
                }
            },
        }
    }

    fn sweep(&self) -> usize {
        let now = now_millis();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired(now));
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            tracing::info!(removed, "swept expired usage transactions");
        }
        removed
    }
}

/// Drive the periodic sweep until the task is dropped or aborted.
///
/// Runs independently of any request; an abandoned request's pending record
/// is reclaimed here once its TTL elapses.
pub async fn run_sweeper(store: Arc<dyn TransactionStore>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        store.sweep();
    }
}

/// Spawn [`run_sweeper`] on the current runtime
pub fn spawn_sweeper(
    store: Arc<dyn TransactionStore>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_sweeper(store, period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn store_with(limit: u32) -> (Arc<InMemoryLedger>, InMemoryTransactionStore) {
        let ledger = Arc::new(InMemoryLedger::new(limit));
        let store = InMemoryTransactionStore::new(ledger.clone());
        (ledger, store)
    }

    fn begin_allowed(store: &InMemoryTransactionStore, user: &UserId) -> UsageTransaction {
        match store.begin(user).unwrap() {
            BeginOutcome::Allowed { transaction, .. } => transaction,
            BeginOutcome::Denied { .. } => panic!("expected begin to be allowed"),
        }
    }

    #[test]
    fn test_begin_reads_without_charging() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);

        let txn = begin_allowed(&store, &user);
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(ledger.count(&user), 2);
    }

    #[test]
    fn test_begin_denied_at_limit_creates_nothing() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 5);

        let outcome = store.begin(&user).unwrap();
        assert!(!outcome.is_allowed());
        assert!(store.is_empty());
        assert_eq!(ledger.count(&user), 5);
    }

    #[test]
    fn test_commit_increments_once() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);
        let txn = begin_allowed(&store, &user);

        assert_eq!(
            store.commit(txn.id),
            CommitOutcome::Committed { new_count: 3 }
        );
        // Second commit returns the recorded outcome without incrementing.
        assert_eq!(
            store.commit(txn.id),
            CommitOutcome::AlreadyCommitted { new_count: 3 }
        );
        assert_eq!(ledger.count(&user), 3);
    }

    #[test]
    fn test_rollback_without_commit_is_a_refundless_noop() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);
        let txn = begin_allowed(&store, &user);

        assert_eq!(
            store.rollback(txn.id),
            RollbackOutcome::RolledBack {
                refunded: false,
                new_count: None
            }
        );
        assert_eq!(store.rollback(txn.id), RollbackOutcome::AlreadyRolledBack);
        assert_eq!(ledger.count(&user), 2);
    }

    #[test]
    fn test_commit_then_rollback_nets_zero() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);
        let txn = begin_allowed(&store, &user);

        store.commit(txn.id);
        assert_eq!(ledger.count(&user), 3);
        assert_eq!(
            store.rollback(txn.id),
            RollbackOutcome::RolledBack {
                refunded: true,
                new_count: Some(2)
            }
        );
        assert_eq!(ledger.count(&user), 2);

        // A second rollback must not refund again.
        assert_eq!(store.rollback(txn.id), RollbackOutcome::AlreadyRolledBack);
        assert_eq!(ledger.count(&user), 2);
    }

    #[test]
    fn test_floor_invariant() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 0);
        let txn = begin_allowed(&store, &user);

        store.commit(txn.id);
        assert_eq!(ledger.count(&user), 1);
        store.rollback(txn.id);
        assert_eq!(ledger.count(&user), 1);
    }

    #[test]
    fn test_commit_after_rollback_is_rejected() {
        let (ledger, store) = store_with(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);
        let txn = begin_allowed(&store, &user);

        store.rollback(txn.id);
        assert_eq!(store.commit(txn.id), CommitOutcome::AlreadyRolledBack);
        assert_eq!(ledger.count(&user), 2);
    }

    #[test]
    fn test_unknown_id_is_soft() {
        let (_ledger, store) = store_with(5);
        let id = TransactionId::new(9999);
        assert_eq!(store.commit(id), CommitOutcome::NotFound);
        assert_eq!(store.rollback(id), RollbackOutcome::NotFound);
    }

    #[test]
    fn test_expired_pending_commit() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let store = InMemoryTransactionStore::with_config(
            ledger.clone(),
            StoreConfig {
                transaction_ttl: Duration::from_millis(20),
                retention_grace: Duration::from_millis(20),
            },
        );
        let user = UserId::from("u1");
        let txn = begin_allowed(&store, &user);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.commit(txn.id), CommitOutcome::Expired);
        assert_eq!(ledger.count(&user), 0);
    }

    #[test]
    fn test_sweep_removes_expired_regardless_of_status() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let store = InMemoryTransactionStore::with_config(
            ledger.clone(),
            StoreConfig {
                transaction_ttl: Duration::from_millis(20),
                retention_grace: Duration::from_millis(20),
            },
        );
        let user = UserId::from("u1");
        let pending = begin_allowed(&store, &user);
        let committed = begin_allowed(&store, &user);
        store.commit(committed.id);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.sweep(), 2);

        // Swept identifiers are unreachable afterward.
        assert_eq!(store.commit(pending.id), CommitOutcome::NotFound);
        assert_eq!(store.rollback(committed.id), RollbackOutcome::NotFound);
    }

    #[test]
    fn test_sweep_keeps_live_records() {
        let (_ledger, store) = store_with(5);
        let user = UserId::from("u1");
        let _txn = begin_allowed(&store, &user);
        assert_eq!(store.sweep(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_reclaims_abandoned_transactions() {
        let ledger = Arc::new(InMemoryLedger::new(5));
        let store = Arc::new(InMemoryTransactionStore::with_config(
            ledger,
            StoreConfig {
                transaction_ttl: Duration::from_millis(20),
                retention_grace: Duration::from_millis(20),
            },
        ));
        let user = UserId::from("u1");
        let _abandoned = begin_allowed(&store, &user);

        let handle = spawn_sweeper(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_commit_and_rollback_one_winner() {
        let (ledger, store) = store_with(5);
        let store = Arc::new(store);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);

        for _ in 0..50 {
            let id = begin_allowed(&store, &user).id;
            let committer = {
                let store = store.clone();
                std::thread::spawn(move || store.commit(id))
            };
            let roller = {
                let store = store.clone();
                std::thread::spawn(move || store.rollback(id))
            };
            let commit_outcome = committer.join().unwrap();
            let rollback_outcome = roller.join().unwrap();

            // Whichever order the two land in, the net charge is zero:
            // commit-first means the rollback refunds; rollback-first means
            // the commit is rejected.
            match (&commit_outcome, &rollback_outcome) {
                (
                    CommitOutcome::Committed { .. },
                    RollbackOutcome::RolledBack { refunded: true, .. },
                ) => {}
                (
                    CommitOutcome::AlreadyRolledBack,
                    RollbackOutcome::RolledBack {
                        refunded: false, ..
                    },
                ) => {}
                other => panic!("unexpected interleaving: {:?}", other),
            }
            assert_eq!(ledger.count(&user), 2);
        }
    }
}
