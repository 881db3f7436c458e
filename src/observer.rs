//! Usage observer trait

use serde::{Deserialize, Serialize};

use crate::context::{RequestMetadata, TransactionId};

/// What one generation attempt came to
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptOutcome {
    /// Attempt number, 1-based
    pub attempt: u32,
    /// Whether this was the reduced-capability attempt
    pub is_fallback: bool,
    /// Whether the attempt produced an acceptable result
    pub valid: bool,
    /// Validation reason or error message
    pub reason: Box<str>,
    /// Wall time of the attempt
    pub duration_millis: u64,
}

/// Final aggregate for one logical request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestSummary {
    /// Whether the request produced a billable result
    pub success: bool,
    /// Attempts actually run
    pub attempts_used: u32,
    /// Whether the fallback attempt ran
    pub used_fallback: bool,
    /// Wall time across all attempts and waits
    pub total_duration_millis: u64,
}

/// Observer trait for external observability
pub trait UsageObserver: Send + Sync + 'static {
    /// A pending transaction was created
    fn on_transaction_begun(
        &self,
        metadata: &RequestMetadata,
        transaction_id: TransactionId,
        current_usage: u32,
    );
    /// The quota check denied the request; nothing was created
    fn on_quota_denied(&self, metadata: &RequestMetadata, current_usage: u32, limit: u32);
    /// One generation attempt finished
    fn on_attempt_completed(&self, metadata: &RequestMetadata, outcome: &AttemptOutcome);
    /// The transaction was committed (`recorded` is false when the ledger
    /// increment failed and the charge could not be persisted)
    fn on_transaction_committed(
        &self,
        metadata: &RequestMetadata,
        transaction_id: TransactionId,
        recorded: bool,
    );
    /// The transaction was rolled back
    fn on_transaction_rolled_back(
        &self,
        metadata: &RequestMetadata,
        transaction_id: TransactionId,
        refunded: bool,
    );
    /// The logical request finished
    fn on_request_completed(&self, metadata: &RequestMetadata, summary: &RequestSummary);
}

/// No-op observer
pub struct NoOpObserver;

impl UsageObserver for NoOpObserver {
    fn on_transaction_begun(
        &self,
        _metadata: &RequestMetadata,
        _transaction_id: TransactionId,
        _current_usage: u32,
    ) {
    }
    fn on_quota_denied(&self, _metadata: &RequestMetadata, _current_usage: u32, _limit: u32) {}
    fn on_attempt_completed(&self, _metadata: &RequestMetadata, _outcome: &AttemptOutcome) {}
    fn on_transaction_committed(
        &self,
        _metadata: &RequestMetadata,
        _transaction_id: TransactionId,
        _recorded: bool,
    ) {
    }
    fn on_transaction_rolled_back(
        &self,
        _metadata: &RequestMetadata,
        _transaction_id: TransactionId,
        _refunded: bool,
    ) {
    }
    fn on_request_completed(&self, _metadata: &RequestMetadata, _summary: &RequestSummary) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl UsageObserver for TracingObserver {
    fn on_transaction_begun(
        &self,
        metadata: &RequestMetadata,
        transaction_id: TransactionId,
        current_usage: u32,
    ) {
        tracing::info!(
            request_id = %metadata.request_id,
            user_id = %metadata.user_id,
            transaction_id = %transaction_id,
            current_usage,
            "Usage transaction begun"
        );
    }

    fn on_quota_denied(&self, metadata: &RequestMetadata, current_usage: u32, limit: u32) {
        tracing::warn!(
            request_id = %metadata.request_id,
            user_id = %metadata.user_id,
            current_usage,
            limit,
            "Quota exceeded"
        );
    }

    fn on_attempt_completed(&self, metadata: &RequestMetadata, outcome: &AttemptOutcome) {
        tracing::info!(
            request_id = %metadata.request_id,
            attempt = outcome.attempt,
            is_fallback = outcome.is_fallback,
            valid = outcome.valid,
            reason = %outcome.reason,
            duration_ms = outcome.duration_millis,
            "Generation attempt completed"
        );
    }

    fn on_transaction_committed(
        &self,
        metadata: &RequestMetadata,
        transaction_id: TransactionId,
        recorded: bool,
    ) {
        tracing::info!(
            request_id = %metadata.request_id,
            transaction_id = %transaction_id,
            recorded,
            "Usage transaction committed"
        );
    }

    fn on_transaction_rolled_back(
        &self,
        metadata: &RequestMetadata,
        transaction_id: TransactionId,
        refunded: bool,
    ) {
        tracing::info!(
            request_id = %metadata.request_id,
            transaction_id = %transaction_id,
            refunded,
            "Usage transaction rolled back"
        );
    }

    fn on_request_completed(&self, metadata: &RequestMetadata, summary: &RequestSummary) {
        tracing::info!(
            request_id = %metadata.request_id,
            success = summary.success,
            attempts_used = summary.attempts_used,
            used_fallback = summary.used_fallback,
            total_duration_ms = summary.total_duration_millis,
            "Metered generation finished"
        );
    }
}
