//! Idempotency ledger for processed webhook events.
//!
//! One append-only record per provider event id. The uniqueness of the event
//! id is the only synchronization primitive for duplicate deliveries: exactly
//! one concurrent caller records an id, every other caller observes the
//! collision and stops without re-applying effects.

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of recording an event in the ledger.
///
/// `AlreadyRecorded` is an expected, non-fatal result. It means another
/// delivery of the same event won the race and completed first, so the
/// current delivery should be treated as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This caller recorded the event.
    Recorded,
    /// The event id was already present (duplicate delivery).
    AlreadyRecorded,
}

/// Append-only store of processed webhook event ids.
///
/// Implementations must enforce a uniqueness invariant on the event id: a
/// second insert for the same id returns `AlreadyRecorded` instead of
/// failing, and entries are never updated or deleted.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Check whether an event has already been processed.
    async fn is_processed(&self, event_id: &str) -> Result<bool>;

    /// Record an event as processed.
    ///
    /// Must be safe under concurrent invocation for the same id; the
    /// unique-insert collision is the concurrency guard, not an error.
    async fn record(&self, event_id: &str, event_type: &str) -> Result<RecordOutcome>;
}

/// In-memory event ledger (for development/testing)
///
/// In production, back the ledger with a table carrying a unique constraint
/// on the event id column.
#[derive(Default, Clone)]
pub struct InMemoryEventLedger {
    inner: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<String, LedgerEntry>>>,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    #[allow(dead_code)]
    event_type: String,
    #[allow(dead_code)]
    processed_at: u64,
}

impl InMemoryEventLedger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded event ids (for testing).
    pub fn recorded_ids(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.inner.read().unwrap().contains_key(event_id))
    }

    async fn record(&self, event_id: &str, event_type: &str) -> Result<RecordOutcome> {
        let mut entries = self.inner.write().unwrap();

        // Mirrors a unique-constraint insert: first writer wins, the entry
        // is never overwritten.
        if entries.contains_key(event_id) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        entries.insert(
            event_id.to_string(),
            LedgerEntry {
                event_type: event_type.to_string(),
                processed_at: now,
            },
        );
        Ok(RecordOutcome::Recorded)
    }
}
