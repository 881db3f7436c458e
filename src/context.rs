//! Identity types and per-attempt context

use serde::{Deserialize, Serialize};

use crate::validation::ValidationResult;

/// Unique identifier for a usage transaction
///
/// Opaque and process-unique; assigned by the transaction store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Create a transaction ID from a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user whose quota a request consumes
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Box<str>);

impl UserId {
    /// Create a user ID
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Debug for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request metadata threaded through every stage for structured observability
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Identifier correlating all emissions for one logical request
    pub request_id: Box<str>,
    /// User whose quota is charged
    pub user_id: UserId,
    /// Model tag, if the caller routes between models
    pub model: Option<Box<str>>,
    /// Complexity tag assigned by the caller
    pub complexity: Option<Box<str>>,
}

impl RequestMetadata {
    /// Create metadata with no model or complexity tags
    pub fn new(request_id: impl Into<Box<str>>, user_id: UserId) -> Self {
        Self {
            request_id: request_id.into(),
            user_id,
            model: None,
            complexity: None,
        }
    }

    /// Attach a model tag
    pub fn with_model(mut self, model: impl Into<Box<str>>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach a complexity tag
    pub fn with_complexity(mut self, complexity: impl Into<Box<str>>) -> Self {
        self.complexity = Some(complexity.into());
        self
    }
}

/// Immutable context handed to the generation step for one attempt.
///
/// A fresh value is constructed for every attempt; nothing is mutated in
/// place, so concurrent logical requests never share attempt state.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    /// Attempt number, 1-based
    pub attempt: u32,
    /// Upper bound on attempts for this call, fallback included
    pub total_attempts: u32,
    /// Whether this is the final reduced-capability attempt
    pub is_fallback: bool,
    /// Reduced-capability configuration, present only on the fallback attempt
    pub fallback_profile: Option<crate::retry::FallbackProfile>,
    /// Message of the error raised by the previous attempt, if any
    pub last_error: Option<Box<str>>,
    /// Verdict the validator returned for the previous attempt, if any
    pub last_validation: Option<ValidationResult>,
}

impl AttemptContext {
    /// True on the first attempt of a call
    pub fn is_first(&self) -> bool {
        self.attempt == 1
    }

    /// Attempts remaining after this one, fallback included
    pub fn remaining(&self) -> u32 {
        self.total_attempts.saturating_sub(self.attempt)
    }
}

/// Current time in milliseconds since the UNIX epoch
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
