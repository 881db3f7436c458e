//! Quota ledger boundary
//!
//! The ledger is the external, persistent usage store. The core only ever
//! talks to it through [`QuotaLedger`]; production deployments bind their own
//! storage behind it.

use crate::context::UserId;

/// A user's usage as read from the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Requests consumed so far
    pub count: u32,
    /// Maximum allowed
    pub limit: u32,
}

impl UsageSnapshot {
    /// Whether another request may be admitted
    pub fn has_capacity(&self) -> bool {
        self.count < self.limit
    }
}

/// Persistent quota store trait
///
/// `decrement` refunds a previously committed charge. It must never take the
/// count below zero, and must never leave a refunded user at a zero count: a
/// pre-decrement value of 0 or 1 resolves to 1. A user who was mid-request
/// when their balance emptied keeps one visible unit rather than none.
pub trait QuotaLedger: Send + Sync + 'static {
    /// Read current usage and limit
    fn usage(&self, user_id: &UserId) -> Result<UsageSnapshot, LedgerError>;
    /// Add one consumed unit, returning the new count
    fn increment(&self, user_id: &UserId) -> Result<u32, LedgerError>;
    /// Refund one unit under the floor rule, returning the new count
    fn decrement(&self, user_id: &UserId) -> Result<u32, LedgerError>;
}

/// Ledger failure
#[derive(Clone, Debug, thiserror::Error)]
pub enum LedgerError {
    /// The backing store could not be reached or updated
    #[error("storage error: {0}")]
    Storage(Box<str>),
}

/// In-memory ledger for testing and single-process deployments
pub struct InMemoryLedger {
    counts: std::sync::RwLock<std::collections::HashMap<UserId, u32>>,
    limit: u32,
}

impl InMemoryLedger {
    /// Ledger where every user shares one limit
    pub fn new(limit: u32) -> Self {
        Self {
            counts: std::sync::RwLock::new(std::collections::HashMap::new()),
            limit,
        }
    }

    /// Set a user's count directly
    pub fn seed(&self, user_id: &UserId, count: u32) {
        if let Ok(mut counts) = self.counts.write() {
            counts.insert(user_id.clone(), count);
        }
    }

    /// Read a user's count without going through the trait
    pub fn count(&self, user_id: &UserId) -> u32 {
        self.counts
            .read()
            .ok()
            .and_then(|counts| counts.get(user_id).copied())
            .unwrap_or(0)
    }
}

impl QuotaLedger for InMemoryLedger {
    fn usage(&self, user_id: &UserId) -> Result<UsageSnapshot, LedgerError> {
        let counts = self
            .counts
            .read()
            .map_err(|e| LedgerError::Storage(e.to_string().into()))?;
        Ok(UsageSnapshot {
            count: counts.get(user_id).copied().unwrap_or(0),
            limit: self.limit,
        })
    }

    fn increment(&self, user_id: &UserId) -> Result<u32, LedgerError> {
        let mut counts = self
            .counts
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string().into()))?;
        let entry = counts.entry(user_id.clone()).or_insert(0);
        *entry = entry.saturating_add(1);
        Ok(*entry)
    }

    fn decrement(&self, user_id: &UserId) -> Result<u32, LedgerError> {
        let mut counts = self
            .counts
            .write()
            .map_err(|e| LedgerError::Storage(e.to_string().into()))?;
        let entry = counts.entry(user_id.clone()).or_insert(0);
        // Floor rule: a refund never leaves the count at zero.
        *entry = if *entry <= 1 { 1 } else { *entry - 1 };
        Ok(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_defaults_to_zero() {
        let ledger = InMemoryLedger::new(5);
        let user = UserId::from("u1");
        let snapshot = ledger.usage(&user).unwrap();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.limit, 5);
        assert!(snapshot.has_capacity());
    }

    #[test]
    fn test_increment_then_decrement() {
        let ledger = InMemoryLedger::new(5);
        let user = UserId::from("u1");
        ledger.seed(&user, 3);
        assert_eq!(ledger.increment(&user).unwrap(), 4);
        assert_eq!(ledger.decrement(&user).unwrap(), 3);
    }

    #[test]
    fn test_decrement_floor() {
        let ledger = InMemoryLedger::new(5);
        let user = UserId::from("u1");

        // Pre-decrement 1 resolves to 1, not 0.
        ledger.seed(&user, 1);
        assert_eq!(ledger.decrement(&user).unwrap(), 1);

        // Pre-decrement 0 is restored to 1.
        ledger.seed(&user, 0);
        assert_eq!(ledger.decrement(&user).unwrap(), 1);
    }

    #[test]
    fn test_no_capacity_at_limit() {
        let ledger = InMemoryLedger::new(2);
        let user = UserId::from("u1");
        ledger.seed(&user, 2);
        assert!(!ledger.usage(&user).unwrap().has_capacity());
    }
}
