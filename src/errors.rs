//! Error taxonomy for generation attempts and request coordination

use crate::context::TransactionId;
use crate::retry::RetryReport;
use crate::validation::ValidationResult;

/// Error raised by the caller's generation step
#[derive(Clone, Debug, thiserror::Error)]
pub enum GenerationError {
    /// Temporary failure, drives the backoff/retry path
    #[error("retryable: {reason}")]
    Retryable {
        /// Error description
        reason: Box<str>,
        /// Validation verdict the collaborator already computed, if any
        validation: Option<ValidationResult>,
    },
    /// Permanent failure, aborts the request with no further attempts
    #[error("non-retryable: {reason}")]
    NonRetryable {
        /// Error description
        reason: Box<str>,
    },
    /// Anything else; treated as retryable
    #[error("{reason}")]
    Other {
        /// Error description
        reason: Box<str>,
    },
}

impl GenerationError {
    /// Retryable error without an embedded validation verdict
    pub fn retryable(reason: impl Into<Box<str>>) -> Self {
        Self::Retryable {
            reason: reason.into(),
            validation: None,
        }
    }

    /// Non-retryable error
    pub fn non_retryable(reason: impl Into<Box<str>>) -> Self {
        Self::NonRetryable {
            reason: reason.into(),
        }
    }

    /// Check if this error permits another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NonRetryable { .. })
    }

    /// The error description
    pub fn reason(&self) -> &str {
        match self {
            Self::Retryable { reason, .. } => reason,
            Self::NonRetryable { reason } => reason,
            Self::Other { reason } => reason,
        }
    }

    /// Validation verdict carried by the error, if any
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            Self::Retryable { validation, .. } => validation.as_ref(),
            _ => None,
        }
    }
}

/// Terminal failure of one coordinated request
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// A precondition check rejected the request; no transaction was created
    #[error("precondition failed: {reason}")]
    PreconditionFailed {
        /// Which check failed and why
        reason: Box<str>,
    },
    /// The user's quota is already exhausted; no transaction was created
    #[error("quota exceeded: {current_usage}/{limit}")]
    QuotaExceeded {
        /// Usage at the time of the check
        current_usage: u32,
        /// The user's limit
        limit: u32,
    },
    /// The quota ledger could not be read when beginning the transaction
    #[error("ledger unavailable: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
    /// A non-retryable generation error aborted the request mid-flight
    #[error("generation aborted: {reason}")]
    Aborted {
        /// The aborting error's description
        reason: Box<str>,
    },
    /// Every attempt, fallback included, produced an unusable result
    #[error("all attempts exhausted: {reason}")]
    Exhausted {
        /// Most recent validation reason or error message
        reason: Box<str>,
        /// Per-attempt record of what went wrong
        report: RetryReport,
    },
    /// The transaction's TTL elapsed before it could be finalized
    #[error("transaction {id} expired before commit")]
    TransactionExpired {
        /// The expired identifier
        id: TransactionId,
    },
}

impl MeterError {
    /// Whether the failure consumed no quota and created no transaction
    pub fn rejected_before_begin(&self) -> bool {
        matches!(
            self,
            Self::PreconditionFailed { .. } | Self::QuotaExceeded { .. } | Self::Ledger(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(GenerationError::retryable("timeout").is_retryable());
        assert!(GenerationError::Other {
            reason: "socket closed".into()
        }
        .is_retryable());
        assert!(!GenerationError::non_retryable("bad credentials").is_retryable());
    }

    #[test]
    fn test_reason_passthrough() {
        let err = GenerationError::retryable("upstream 503");
        assert_eq!(err.reason(), "upstream 503");
        assert!(err.validation().is_none());
    }
}
