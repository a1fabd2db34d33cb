//! Append-only audit entries.
//!
//! Every status transition of a line item is recorded as an audit entry.
//! Entries are never updated or deleted; the sequence number is assigned by
//! the audit log and is monotonically increasing per line item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lineguard_core::LineItemId;

/// One recorded fact about a line item.
///
/// `payload` is the domain event that caused the transition; this type stays
/// generic so the mechanics crate does not depend on the domain event union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry<E> {
    entry_id: Uuid,
    line_item_id: LineItemId,

    /// Monotonically increasing position in the line item's audit stream.
    sequence_number: u64,

    recorded_at: DateTime<Utc>,
    payload: E,
}

impl<E> AuditEntry<E> {
    pub fn new(
        line_item_id: LineItemId,
        sequence_number: u64,
        recorded_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            line_item_id,
            sequence_number,
            recorded_at,
            payload,
        }
    }

    /// Rebuild an entry from persisted fields, keeping its stored id.
    pub fn from_parts(
        entry_id: Uuid,
        line_item_id: LineItemId,
        sequence_number: u64,
        recorded_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            entry_id,
            line_item_id,
            sequence_number,
            recorded_at,
            payload,
        }
    }

    pub fn entry_id(&self) -> Uuid {
        self.entry_id
    }

    pub fn line_item_id(&self) -> LineItemId {
        self.line_item_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entries_get_distinct_ids() {
        let item = LineItemId::new();
        let a = AuditEntry::new(item, 1, Utc::now(), "first");
        let b = AuditEntry::new(item, 2, Utc::now(), "second");
        assert_ne!(a.entry_id(), b.entry_id());
    }

    #[test]
    fn from_parts_keeps_the_stored_id() {
        let original = AuditEntry::new(LineItemId::new(), 3, Utc::now(), "payload");
        let rebuilt = AuditEntry::from_parts(
            original.entry_id(),
            original.line_item_id(),
            original.sequence_number(),
            original.recorded_at(),
            *original.payload(),
        );
        assert_eq!(rebuilt, original);
    }
}
