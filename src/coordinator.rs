//! Transaction coordination
//!
//! The coordinator is the only piece touching both the transaction store and
//! the retry orchestrator. One logical request runs: precondition checks →
//! begin → retry/validate loop → commit on success, rollback on exhaustion
//! or abort. Quota accounting always resolves to at most one net increment
//! per request.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::context::{AttemptContext, RequestMetadata, TransactionId};
use crate::errors::{GenerationError, MeterError};
use crate::ledger::QuotaLedger;
use crate::messages::{GeneratedMessage, GenerationOutput};
use crate::observer::{AttemptOutcome, RequestSummary, UsageObserver};
use crate::retry::{RetryOrchestrator, RetryOutcome, RetryReport};
use crate::stats::MeterStats;
use crate::store::TransactionStore;
use crate::transaction::{BeginOutcome, CommitOutcome, RollbackOutcome};
use crate::validation::ValidationResult;

/// Caller-supplied non-retryable gate run before any transaction exists.
///
/// Authentication and authorization live behind this seam; a failing check
/// rejects the request with nothing to clean up.
pub trait Precondition: Send + Sync + 'static {
    /// Short name for observability
    fn name(&self) -> &str;
    /// Reject with a reason, or admit the request
    fn check(&self, metadata: &RequestMetadata) -> Result<(), Box<str>>;
}

/// Execution policy, selected once per coordinator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargeMode {
    /// Begin → validate-with-retries → commit-or-rollback
    Transactional,
    /// Legacy flow: check-and-increment upfront, one attempt, no refund
    Direct,
}

impl ChargeMode {
    /// Map the feature flag to a mode
    pub fn from_flag(transactional_enabled: bool) -> Self {
        if transactional_enabled {
            Self::Transactional
        } else {
            Self::Direct
        }
    }
}

/// How the accepted result was charged
#[derive(Clone, Debug)]
pub enum ChargeStatus {
    /// Commit persisted the increment
    Recorded {
        /// Ledger count after the increment
        new_count: u32,
    },
    /// Commit could not persist the increment; result returned anyway and
    /// the discrepancy was logged for reconciliation
    Unrecorded {
        /// Why the increment did not land
        reason: Box<str>,
    },
    /// Legacy direct mode charged before generating
    Direct {
        /// Ledger count after the upfront increment
        new_count: u32,
    },
}

/// An accepted, charged (or reconciliation-logged) generation
#[derive(Debug)]
pub struct CompletedGeneration<T> {
    /// The caller-facing result
    pub payload: T,
    /// Raw transcript that validated
    pub messages: Vec<GeneratedMessage>,
    /// The verdict that accepted it
    pub validation: ValidationResult,
    /// Attempt accounting
    pub report: RetryReport,
    /// Quota accounting outcome
    pub charge: ChargeStatus,
}

/// Sequences one metered generation request end to end
pub struct TransactionCoordinator {
    store: Arc<dyn TransactionStore>,
    ledger: Arc<dyn QuotaLedger>,
    orchestrator: RetryOrchestrator,
    observer: Arc<dyn UsageObserver>,
    stats: Arc<MeterStats>,
    preconditions: Vec<Arc<dyn Precondition>>,
    mode: ChargeMode,
}

impl TransactionCoordinator {
    /// Coordinator in transactional mode with no preconditions
    pub fn new(
        store: Arc<dyn TransactionStore>,
        ledger: Arc<dyn QuotaLedger>,
        orchestrator: RetryOrchestrator,
        observer: Arc<dyn UsageObserver>,
    ) -> Self {
        Self {
            store,
            ledger,
            orchestrator,
            observer,
            stats: Arc::new(MeterStats::new()),
            preconditions: Vec::new(),
            mode: ChargeMode::Transactional,
        }
    }

    /// Register a precondition gate
    pub fn with_precondition(mut self, precondition: Arc<dyn Precondition>) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Select the execution policy
    pub fn with_mode(mut self, mode: ChargeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Counters for this coordinator
    pub fn stats(&self) -> &Arc<MeterStats> {
        &self.stats
    }

    /// Run one logical request
    pub async fn execute<T, G, Fut>(
        &self,
        metadata: &RequestMetadata,
        generate: G,
    ) -> Result<CompletedGeneration<T>, MeterError>
    where
        G: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<GenerationOutput<T>, GenerationError>>,
    {
        self.stats.requests_started.fetch_add(1, Ordering::Relaxed);

        for precondition in &self.preconditions {
            if let Err(reason) = precondition.check(metadata) {
                self.stats
                    .preconditions_failed
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    request_id = %metadata.request_id,
                    check = precondition.name(),
                    reason = %reason,
                    "precondition rejected request"
                );
                return Err(MeterError::PreconditionFailed { reason });
            }
        }

        match self.mode {
            ChargeMode::Transactional => self.execute_transactional(metadata, generate).await,
            ChargeMode::Direct => self.execute_direct(metadata, generate).await,
        }
    }

    async fn execute_transactional<T, G, Fut>(
        &self,
        metadata: &RequestMetadata,
        generate: G,
    ) -> Result<CompletedGeneration<T>, MeterError>
    where
        G: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<GenerationOutput<T>, GenerationError>>,
    {
        let transaction = match self.store.begin(&metadata.user_id)? {
            BeginOutcome::Denied {
                current_usage,
                limit,
            } => {
                self.stats.quota_denied.fetch_add(1, Ordering::Relaxed);
                self.observer
                    .on_quota_denied(metadata, current_usage, limit);
                return Err(MeterError::QuotaExceeded {
                    current_usage,
                    limit,
                });
            }
            BeginOutcome::Allowed {
                transaction,
                current_usage,
                ..
            } => {
                self.stats
                    .transactions_begun
                    .fetch_add(1, Ordering::Relaxed);
                self.observer
                    .on_transaction_begun(metadata, transaction.id, current_usage);
                transaction
            }
        };

        let outcome = self
            .orchestrator
            .execute(metadata, self.observer.as_ref(), generate)
            .await;
        if outcome.report().used_fallback {
            self.stats.fallback_attempts.fetch_add(1, Ordering::Relaxed);
        }

        match outcome {
            RetryOutcome::Success {
                output,
                validation,
                report,
            } => {
                let commit = self.store.commit(transaction.id);
                tracing::debug!(
                    request_id = %metadata.request_id,
                    transaction_id = %transaction.id,
                    outcome = commit.as_str(),
                    "commit resolved"
                );
                let charge = match commit {
                    CommitOutcome::Committed { new_count }
                    | CommitOutcome::AlreadyCommitted { new_count } => {
                        self.stats
                            .transactions_committed
                            .fetch_add(1, Ordering::Relaxed);
                        self.observer
                            .on_transaction_committed(metadata, transaction.id, true);
                        ChargeStatus::Recorded { new_count }
                    }
                    CommitOutcome::LedgerFailed { reason } => {
                        self.stats
                            .commit_ledger_failures
                            .fetch_add(1, Ordering::Relaxed);
                        self.observer
                            .on_transaction_committed(metadata, transaction.id, false);
                        ChargeStatus::Unrecorded { reason }
                    }
                    CommitOutcome::AlreadyRolledBack => {
                        self.observer
                            .on_transaction_committed(metadata, transaction.id, false);
                        ChargeStatus::Unrecorded {
                            reason: "transaction already rolled back".into(),
                        }
                    }
                    CommitOutcome::Expired | CommitOutcome::NotFound => {
                        self.finish(metadata, false, &report);
                        return Err(MeterError::TransactionExpired { id: transaction.id });
                    }
                };
                self.stats
                    .requests_succeeded
                    .fetch_add(1, Ordering::Relaxed);
                self.finish(metadata, true, &report);
                Ok(CompletedGeneration {
                    payload: output.payload,
                    messages: output.messages,
                    validation,
                    report,
                    charge,
                })
            }
            RetryOutcome::Exhausted { report } => {
                self.stats
                    .requests_exhausted
                    .fetch_add(1, Ordering::Relaxed);
                let rolled_back = self.rollback(metadata, transaction.id);
                self.finish(metadata, false, &report);
                if !rolled_back {
                    return Err(MeterError::TransactionExpired { id: transaction.id });
                }
                let reason = report
                    .final_failure_reason()
                    .unwrap_or("no usable result")
                    .into();
                Err(MeterError::Exhausted { reason, report })
            }
            RetryOutcome::Aborted { reason, report } => {
                self.stats.requests_aborted.fetch_add(1, Ordering::Relaxed);
                self.rollback(metadata, transaction.id);
                self.finish(metadata, false, &report);
                Err(MeterError::Aborted { reason })
            }
        }
    }

    /// Legacy direct-increment flow: the quota is charged before generating,
    /// a single attempt runs, and a failure is never refunded.
    async fn execute_direct<T, G, Fut>(
        &self,
        metadata: &RequestMetadata,
        mut generate: G,
    ) -> Result<CompletedGeneration<T>, MeterError>
    where
        G: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<GenerationOutput<T>, GenerationError>>,
    {
        let snapshot = self.ledger.usage(&metadata.user_id)?;
        if !snapshot.has_capacity() {
            self.stats.quota_denied.fetch_add(1, Ordering::Relaxed);
            self.observer
                .on_quota_denied(metadata, snapshot.count, snapshot.limit);
            return Err(MeterError::QuotaExceeded {
                current_usage: snapshot.count,
                limit: snapshot.limit,
            });
        }
        let new_count = self.ledger.increment(&metadata.user_id)?;

        let context = AttemptContext {
            attempt: 1,
            total_attempts: 1,
            is_fallback: false,
            fallback_profile: None,
            last_error: None,
            last_validation: None,
        };
        let started = tokio::time::Instant::now();
        match generate(context).await {
            Ok(output) => {
                let validation = self.orchestrator.validator().validate(&output.messages);
                let duration_millis = started.elapsed().as_millis() as u64;
                self.observer.on_attempt_completed(
                    metadata,
                    &AttemptOutcome {
                        attempt: 1,
                        is_fallback: false,
                        valid: validation.is_valid,
                        reason: validation.reason.as_str().into(),
                        duration_millis,
                    },
                );
                let report = RetryReport {
                    attempts_used: 1,
                    used_fallback: false,
                    total_duration_millis: duration_millis,
                    failures: Vec::new(),
                };
                self.stats
                    .requests_succeeded
                    .fetch_add(1, Ordering::Relaxed);
                self.finish(metadata, true, &report);
                Ok(CompletedGeneration {
                    payload: output.payload,
                    messages: output.messages,
                    validation,
                    report,
                    charge: ChargeStatus::Direct { new_count },
                })
            }
            Err(err) => {
                self.stats.requests_aborted.fetch_add(1, Ordering::Relaxed);
                let report = RetryReport {
                    attempts_used: 1,
                    used_fallback: false,
                    total_duration_millis: started.elapsed().as_millis() as u64,
                    failures: Vec::new(),
                };
                self.finish(metadata, false, &report);
                Err(MeterError::Aborted {
                    reason: err.reason().into(),
                })
            }
        }
    }

    /// Roll back, fold the outcome into stats/observability, and report
    /// whether the record was still reachable.
    fn rollback(&self, metadata: &RequestMetadata, id: TransactionId) -> bool {
        let outcome = self.store.rollback(id);
        tracing::debug!(
            request_id = %metadata.request_id,
            transaction_id = %id,
            outcome = outcome.as_str(),
            "rollback resolved"
        );
        match outcome {
            RollbackOutcome::RolledBack { refunded, .. } => {
                self.stats
                    .transactions_rolled_back
                    .fetch_add(1, Ordering::Relaxed);
                self.observer
                    .on_transaction_rolled_back(metadata, id, refunded);
                true
            }
            RollbackOutcome::AlreadyRolledBack => true,
            RollbackOutcome::LedgerFailed { .. } => {
                self.stats
                    .rollback_ledger_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.observer.on_transaction_rolled_back(metadata, id, false);
                true
            }
            RollbackOutcome::NotFound => false,
        }
    }

    fn finish(&self, metadata: &RequestMetadata, success: bool, report: &RetryReport) {
        self.observer.on_request_completed(
            metadata,
            &RequestSummary {
                success,
                attempts_used: report.attempts_used,
                used_fallback: report.used_fallback,
                total_duration_millis: report.total_duration_millis,
            },
        );
    }
}
