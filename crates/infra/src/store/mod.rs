//! Store abstractions over durable state.
//!
//! All durable state lives behind these traits: line items with their status
//! and lease, canonical price bands, external observations, explanations,
//! adjustment proposals, and the append-only validation event log. The
//! in-memory implementations back tests and benchmarks; Postgres backs
//! production.

use chrono::{DateTime, Utc};
use thiserror::Error;

use lineguard_core::{CanonicalItemId, Currency, ExplanationId, LineItemId, WorkerId};
use lineguard_events::AuditEntry;
use lineguard_items::{Explanation, LineItem, LineItemEvent, LineItemStatus};
use lineguard_pricing::{ExternalPriceObservation, PriceRange, RangeAdjustmentProposal};

pub mod memory;
pub mod postgres;

pub use memory::{
    InMemoryExplanationStore, InMemoryLineItemStore, InMemoryObservationStore,
    InMemoryPriceRangeStore, InMemoryProposalStore, InMemoryValidationEventLog,
};
pub use postgres::PostgresStores;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn backend(err: impl core::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Line items keyed by id, with status and lease columns queryable by the
/// schedulers.
pub trait LineItemStore: Send + Sync {
    fn insert(&self, item: &LineItem) -> Result<(), StoreError>;

    fn get(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError>;

    fn update(&self, item: &LineItem) -> Result<(), StoreError>;

    /// Claim up to `limit` items in `status` whose lease is free or expired,
    /// acquiring the lease for `worker`. The returned items carry the fresh
    /// lease; a second claim for the same status sees none of them until the
    /// lease expires or is released.
    fn claim_batch(
        &self,
        status: LineItemStatus,
        worker: WorkerId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineItem>, StoreError>;

    /// Release a lease held by `worker`. A mismatched owner is a no-op.
    fn release_lease(&self, id: LineItemId, worker: WorkerId) -> Result<(), StoreError>;
}

/// Canonical price bands, one per (canonical item, currency).
pub trait PriceRangeStore: Send + Sync {
    fn get(
        &self,
        canonical_item_id: CanonicalItemId,
        currency: &Currency,
    ) -> Result<Option<PriceRange>, StoreError>;

    fn upsert(&self, range: &PriceRange) -> Result<(), StoreError>;
}

/// External vendor observations, keyed by (vendor, source URL). Written by
/// the ingestion collaborator, read by the price validator.
pub trait ObservationStore: Send + Sync {
    fn record(&self, observation: &ExternalPriceObservation) -> Result<(), StoreError>;

    fn all(&self) -> Result<Vec<ExternalPriceObservation>, StoreError>;
}

/// User explanations and their verification lifecycle.
pub trait ExplanationStore: Send + Sync {
    fn insert(&self, explanation: &Explanation) -> Result<(), StoreError>;

    fn update(&self, explanation: &Explanation) -> Result<(), StoreError>;

    fn get(&self, id: ExplanationId) -> Result<Option<Explanation>, StoreError>;

    /// Most recently submitted explanation for an item, verified or not.
    fn latest_for_item(&self, line_item_id: LineItemId) -> Result<Option<Explanation>, StoreError>;

    /// Rejection reason of the most recent rejected explanation, used as
    /// prior feedback when judging a resubmission.
    fn prior_feedback(&self, line_item_id: LineItemId) -> Result<Option<String>, StoreError>;
}

/// Advisory range-adjustment proposals awaiting review.
pub trait ProposalStore: Send + Sync {
    fn insert(&self, proposal: &RangeAdjustmentProposal) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<RangeAdjustmentProposal>, StoreError>;
}

/// Append-only audit log of applied events, per line item.
pub trait ValidationEventLog: Send + Sync {
    /// Append an applied event, assigning the next sequence number for the
    /// item's stream.
    fn append(&self, event: &LineItemEvent) -> Result<AuditEntry<LineItemEvent>, StoreError>;

    fn for_item(
        &self,
        line_item_id: LineItemId,
    ) -> Result<Vec<AuditEntry<LineItemEvent>>, StoreError>;
}
