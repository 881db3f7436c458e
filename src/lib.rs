//! Transactional Quota Accounting for Unreliable Generation Services
//!
//! A metered consumer of a generation service should only be billed for
//! attempts that produce a genuinely useful result, even though the
//! underlying call may silently return empty, partial, or tool-only output,
//! or fail outright. This crate decouples quota *checking* from quota
//! *committing* with an in-process transaction store, classifies every
//! generated transcript with a deterministic validator, and drives bounded
//! retries with backoff plus one reduced-capability fallback attempt.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use metered_generation::{
//!     GeneratedMessage, GenerationError, GenerationOutput, InMemoryLedger,
//!     InMemoryTransactionStore, MeterConfig, RequestMetadata, RetryOrchestrator,
//!     TracingObserver, TransactionCoordinator, UserId,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MeterConfig::from_env();
//! let ledger = Arc::new(InMemoryLedger::new(100));
//! let store = Arc::new(InMemoryTransactionStore::new(ledger.clone()));
//! let coordinator = TransactionCoordinator::new(
//!     store,
//!     ledger,
//!     RetryOrchestrator::new(config.retry.clone(), config.validator()),
//!     Arc::new(TracingObserver),
//! );
//!
//! let metadata = RequestMetadata::new("req-1", UserId::from("user-1"));
//! let completed = coordinator
//!     .execute(&metadata, |context| async move {
//!         // Call the generation service here, substituting the reduced
//!         // capability set when this is the fallback attempt.
//!         let _reduced = context.is_fallback;
//!         Ok::<_, GenerationError>(GenerationOutput::new(
//!             "summary",
//!             vec![GeneratedMessage::assistant_text("Here is the summary.")],
//!         ))
//!     })
//!     .await?;
//! println!("charged: {:?}", completed.charge);
//! # Ok(())
//! # }
//! ```
//!
//! Each process instance owns an independent store: a transaction begun on
//! one instance cannot be committed on another. Scaling out means binding a
//! shared keyed store behind [`TransactionStore`].

#![warn(missing_docs)]

// === Core Types ===
mod context;
mod errors;
mod messages;
mod transaction;

// === Validation ===
mod validation;

// === Storage ===
mod ledger;
mod store;

// === Execution ===
mod coordinator;
mod retry;

// === Observability ===
mod observer;
mod stats;

// === Configuration ===
mod config;

// === Re-exports ===

// Types
pub use context::{AttemptContext, RequestMetadata, TransactionId, UserId};
pub use messages::{GeneratedMessage, GenerationOutput, MessagePart, Role};
pub use transaction::{
    BeginOutcome, CommitOutcome, RollbackOutcome, TransactionStatus, UsageTransaction,
};

// Errors
pub use errors::{GenerationError, MeterError};

// Validation
pub use validation::{
    ResponseValidator, ValidationMetrics, ValidationReason, ValidationResult,
};

// Storage
pub use ledger::{InMemoryLedger, LedgerError, QuotaLedger, UsageSnapshot};
pub use store::{
    run_sweeper, spawn_sweeper, InMemoryTransactionStore, StoreConfig, TransactionStore,
};

// Execution
pub use coordinator::{
    ChargeMode, ChargeStatus, CompletedGeneration, Precondition, TransactionCoordinator,
};
pub use retry::{
    AttemptFailure, FallbackProfile, RetryOrchestrator, RetryOutcome, RetryPolicy, RetryReport,
};

// Observability
pub use observer::{
    AttemptOutcome, NoOpObserver, RequestSummary, TracingObserver, UsageObserver,
};
pub use stats::{MeterStats, MeterStatsSnapshot};

// Configuration
pub use config::MeterConfig;
