//! Bounded retry orchestration with backoff and a final fallback attempt
//!
//! Drives a caller-supplied generation step through at most
//! `max_retries + 1` invocations, validating after each, sleeping
//! cooperatively between attempts, and escalating to one reduced-capability
//! fallback attempt once ordinary retries are exhausted.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{AttemptContext, RequestMetadata};
use crate::errors::GenerationError;
use crate::messages::GenerationOutput;
use crate::observer::{AttemptOutcome, UsageObserver};
use crate::validation::{ResponseValidator, ValidationResult};

/// Reduced capability set used only on the fallback attempt.
///
/// The orchestrator never interprets this; it is handed to the generation
/// step inside the fallback attempt's context, and the caller substitutes
/// the reduced tool set itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FallbackProfile {
    /// Model to substitute, if any
    pub model: Option<Box<str>>,
    /// Tools still permitted; empty means none beyond plain text
    pub allowed_tools: Vec<Box<str>>,
    /// Switch off tool use entirely
    pub disable_tools: bool,
}

/// Retry configuration
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Ordinary attempts before the fallback
    pub max_retries: u32,
    /// Wait after attempt N is `backoff_delays[N-1]`; the last element is
    /// reused when the attempt index runs past the list
    pub backoff_delays: Vec<Duration>,
    /// Whether to run one reduced-capability attempt after ordinary retries
    pub enable_fallback: bool,
    /// Capability set for the fallback attempt
    pub fallback_profile: FallbackProfile,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_delays: vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ],
            enable_fallback: true,
            fallback_profile: FallbackProfile::default(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after a given attempt (1-indexed), clamped to the last
    /// configured element
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.backoff_delays.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt as usize - 1).min(self.backoff_delays.len() - 1);
        self.backoff_delays[index]
    }

    /// Hard bound on generation-step invocations per call
    pub fn max_invocations(&self) -> u32 {
        self.max_retries + if self.enable_fallback { 1 } else { 0 }
    }
}

/// One attempt's failure, kept for the terminal aggregate
#[derive(Clone, Debug)]
pub struct AttemptFailure {
    /// Attempt number, 1-based
    pub attempt: u32,
    /// Whether this was the fallback attempt
    pub is_fallback: bool,
    /// Validation reason or error message
    pub reason: Box<str>,
    /// Validator verdict, when the attempt got far enough to have one
    pub validation: Option<ValidationResult>,
}

/// Aggregate built across the attempts of one call
#[derive(Clone, Debug, Default)]
pub struct RetryReport {
    /// Attempts actually run
    pub attempts_used: u32,
    /// Whether the fallback attempt ran
    pub used_fallback: bool,
    /// Wall time across attempts and backoff waits
    pub total_duration_millis: u64,
    /// What each failed attempt came to
    pub failures: Vec<AttemptFailure>,
}

impl RetryReport {
    /// The most recent failure's reason, if any attempt failed
    pub fn final_failure_reason(&self) -> Option<&str> {
        self.failures.last().map(|f| f.reason.as_ref())
    }
}

/// Terminal result of one orchestrated call
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt validated as acceptable
    Success {
        /// The accepted generation output
        output: GenerationOutput<T>,
        /// The verdict that accepted it
        validation: ValidationResult,
        /// Attempt accounting
        report: RetryReport,
    },
    /// Every attempt, fallback included, failed validation or erred retryably
    Exhausted {
        /// Attempt accounting
        report: RetryReport,
    },
    /// A non-retryable error stopped the call immediately
    Aborted {
        /// The aborting error's description
        reason: Box<str>,
        /// Attempt accounting up to the abort
        report: RetryReport,
    },
}

impl<T> RetryOutcome<T> {
    /// Whether the call produced an accepted result
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Attempt accounting, whatever the outcome
    pub fn report(&self) -> &RetryReport {
        match self {
            Self::Success { report, .. } => report,
            Self::Exhausted { report } => report,
            Self::Aborted { report, .. } => report,
        }
    }
}

/// Drives bounded attempts of a generation step
#[derive(Clone, Debug)]
pub struct RetryOrchestrator {
    policy: RetryPolicy,
    validator: ResponseValidator,
}

impl RetryOrchestrator {
    /// Orchestrator with the given policy and validator
    pub fn new(policy: RetryPolicy, validator: ResponseValidator) -> Self {
        Self { policy, validator }
    }

    /// The configured policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The validator attempts are classified with
    pub fn validator(&self) -> &ResponseValidator {
        &self.validator
    }

    /// Run the generation step until an attempt validates, a non-retryable
    /// error aborts, or attempts are exhausted.
    ///
    /// The step runs at most [`RetryPolicy::max_invocations`] times and the
    /// validator at most once per attempt. Backoff waits suspend only this
    /// call's future.
    pub async fn execute<T, G, Fut>(
        &self,
        metadata: &RequestMetadata,
        observer: &dyn UsageObserver,
        mut generate: G,
    ) -> RetryOutcome<T>
    where
        G: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<GenerationOutput<T>, GenerationError>>,
    {
        let started = tokio::time::Instant::now();
        let total_attempts = self.policy.max_invocations();
        let mut failures: Vec<AttemptFailure> = Vec::new();
        let mut last_error: Option<Box<str>> = None;
        let mut last_validation: Option<ValidationResult> = None;
        let mut used_fallback = false;

        for attempt in 1..=total_attempts {
            let is_fallback = self.policy.enable_fallback && attempt > self.policy.max_retries;
            used_fallback |= is_fallback;

            let context = AttemptContext {
                attempt,
                total_attempts,
                is_fallback,
                fallback_profile: is_fallback.then(|| self.policy.fallback_profile.clone()),
                last_error: last_error.clone(),
                last_validation: last_validation.clone(),
            };

            let attempt_started = tokio::time::Instant::now();
            match generate(context).await {
                Ok(output) => {
                    let validation = self.validator.validate(&output.messages);
                    observer.on_attempt_completed(
                        metadata,
                        &AttemptOutcome {
                            attempt,
                            is_fallback,
                            valid: validation.is_valid,
                            reason: validation.reason.as_str().into(),
                            duration_millis: attempt_started.elapsed().as_millis() as u64,
                        },
                    );
                    if validation.is_valid {
                        return RetryOutcome::Success {
                            output,
                            validation,
                            report: RetryReport {
                                attempts_used: attempt,
                                used_fallback,
                                total_duration_millis: started.elapsed().as_millis() as u64,
                                failures,
                            },
                        };
                    }
                    failures.push(AttemptFailure {
                        attempt,
                        is_fallback,
                        reason: validation.reason.as_str().into(),
                        validation: Some(validation.clone()),
                    });
                    last_validation = Some(validation);
                    last_error = None;
                }
                Err(err) => {
                    observer.on_attempt_completed(
                        metadata,
                        &AttemptOutcome {
                            attempt,
                            is_fallback,
                            valid: false,
                            reason: err.reason().into(),
                            duration_millis: attempt_started.elapsed().as_millis() as u64,
                        },
                    );
                    let carried = err.validation().cloned();
                    failures.push(AttemptFailure {
                        attempt,
                        is_fallback,
                        reason: err.reason().into(),
                        validation: carried.clone(),
                    });
                    if !err.is_retryable() {
                        return RetryOutcome::Aborted {
                            reason: err.reason().into(),
                            report: RetryReport {
                                attempts_used: attempt,
                                used_fallback,
                                total_duration_millis: started.elapsed().as_millis() as u64,
                                failures,
                            },
                        };
                    }
                    if carried.is_some() {
                        last_validation = carried;
                    }
                    last_error = Some(err.reason().into());
                }
            }

            if attempt < total_attempts {
                tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
            }
        }

        RetryOutcome::Exhausted {
            report: RetryReport {
                attempts_used: total_attempts,
                used_fallback,
                total_duration_millis: started.elapsed().as_millis() as u64,
                failures,
            },
        }
    }
}
