//! In-memory store implementations for tests, benchmarks, and dev runs.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use lineguard_core::{CanonicalItemId, Currency, ExplanationId, LineItemId, VendorId, WorkerId};
use lineguard_events::AuditEntry;
use lineguard_items::{Explanation, LineItem, LineItemEvent, LineItemStatus};
use lineguard_pricing::{ExternalPriceObservation, PriceRange, RangeAdjustmentProposal};

use super::{
    ExplanationStore, LineItemStore, ObservationStore, PriceRangeStore, ProposalStore, StoreError,
    ValidationEventLog,
};

#[derive(Debug, Default)]
pub struct InMemoryLineItemStore {
    items: RwLock<HashMap<LineItemId, LineItem>>,
}

impl InMemoryLineItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LineItemStore for InMemoryLineItemStore {
    fn insert(&self, item: &LineItem) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::Poisoned)?;
        items.insert(item.line_item_id, item.clone());
        Ok(())
    }

    fn get(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::Poisoned)?;
        Ok(items.get(&id).cloned())
    }

    fn update(&self, item: &LineItem) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::Poisoned)?;
        if !items.contains_key(&item.line_item_id) {
            return Err(StoreError::NotFound(item.line_item_id.to_string()));
        }
        items.insert(item.line_item_id, item.clone());
        Ok(())
    }

    fn claim_batch(
        &self,
        status: LineItemStatus,
        worker: WorkerId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineItem>, StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::Poisoned)?;

        let mut candidates: Vec<LineItemId> = items
            .values()
            .filter(|i| i.status == status && !i.is_leased(now))
            .map(|i| i.line_item_id)
            .collect();
        // Oldest first, for deterministic batches.
        candidates.sort_by_key(|id| items[id].created_at);
        candidates.truncate(limit);

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let item = items.get_mut(&id).ok_or_else(|| {
                StoreError::NotFound(id.to_string())
            })?;
            if item.try_acquire_lease(worker, now) {
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    fn release_lease(&self, id: LineItemId, worker: WorkerId) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(item) = items.get_mut(&id) {
            item.release_lease(worker);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPriceRangeStore {
    ranges: RwLock<HashMap<(CanonicalItemId, Currency), PriceRange>>,
}

impl InMemoryPriceRangeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PriceRangeStore for InMemoryPriceRangeStore {
    fn get(
        &self,
        canonical_item_id: CanonicalItemId,
        currency: &Currency,
    ) -> Result<Option<PriceRange>, StoreError> {
        let ranges = self.ranges.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ranges.get(&(canonical_item_id, currency.clone())).cloned())
    }

    fn upsert(&self, range: &PriceRange) -> Result<(), StoreError> {
        let mut ranges = self.ranges.write().map_err(|_| StoreError::Poisoned)?;
        ranges.insert(
            (range.canonical_item_id, range.currency.clone()),
            range.clone(),
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    observations: RwLock<HashMap<(VendorId, String), ExternalPriceObservation>>,
}

impl InMemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObservationStore for InMemoryObservationStore {
    fn record(&self, observation: &ExternalPriceObservation) -> Result<(), StoreError> {
        let mut obs = self.observations.write().map_err(|_| StoreError::Poisoned)?;
        obs.insert(
            (observation.vendor_id, observation.source_url.clone()),
            observation.clone(),
        );
        Ok(())
    }

    fn all(&self) -> Result<Vec<ExternalPriceObservation>, StoreError> {
        let obs = self.observations.read().map_err(|_| StoreError::Poisoned)?;
        Ok(obs.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryExplanationStore {
    explanations: RwLock<HashMap<ExplanationId, Explanation>>,
}

impl InMemoryExplanationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_for_item(&self, line_item_id: LineItemId) -> Result<Vec<Explanation>, StoreError> {
        let explanations = self.explanations.read().map_err(|_| StoreError::Poisoned)?;
        let mut found: Vec<Explanation> = explanations
            .values()
            .filter(|e| e.line_item_id == line_item_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.submitted_at);
        Ok(found)
    }
}

impl ExplanationStore for InMemoryExplanationStore {
    fn insert(&self, explanation: &Explanation) -> Result<(), StoreError> {
        let mut explanations = self.explanations.write().map_err(|_| StoreError::Poisoned)?;
        explanations.insert(explanation.explanation_id, explanation.clone());
        Ok(())
    }

    fn update(&self, explanation: &Explanation) -> Result<(), StoreError> {
        let mut explanations = self.explanations.write().map_err(|_| StoreError::Poisoned)?;
        if !explanations.contains_key(&explanation.explanation_id) {
            return Err(StoreError::NotFound(explanation.explanation_id.to_string()));
        }
        explanations.insert(explanation.explanation_id, explanation.clone());
        Ok(())
    }

    fn get(&self, id: ExplanationId) -> Result<Option<Explanation>, StoreError> {
        let explanations = self.explanations.read().map_err(|_| StoreError::Poisoned)?;
        Ok(explanations.get(&id).cloned())
    }

    fn latest_for_item(&self, line_item_id: LineItemId) -> Result<Option<Explanation>, StoreError> {
        Ok(self.sorted_for_item(line_item_id)?.pop())
    }

    fn prior_feedback(&self, line_item_id: LineItemId) -> Result<Option<String>, StoreError> {
        Ok(self
            .sorted_for_item(line_item_id)?
            .into_iter()
            .rev()
            .find_map(|e| e.rejection_reason))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProposalStore {
    proposals: RwLock<Vec<RangeAdjustmentProposal>>,
}

impl InMemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProposalStore for InMemoryProposalStore {
    fn insert(&self, proposal: &RangeAdjustmentProposal) -> Result<(), StoreError> {
        let mut proposals = self.proposals.write().map_err(|_| StoreError::Poisoned)?;
        proposals.push(proposal.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<RangeAdjustmentProposal>, StoreError> {
        let proposals = self.proposals.read().map_err(|_| StoreError::Poisoned)?;
        Ok(proposals.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryValidationEventLog {
    streams: RwLock<HashMap<LineItemId, Vec<AuditEntry<LineItemEvent>>>>,
}

impl InMemoryValidationEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValidationEventLog for InMemoryValidationEventLog {
    fn append(&self, event: &LineItemEvent) -> Result<AuditEntry<LineItemEvent>, StoreError> {
        let mut streams = self.streams.write().map_err(|_| StoreError::Poisoned)?;
        let stream = streams.entry(event.line_item_id).or_default();
        let sequence = stream.len() as u64 + 1;
        let entry = AuditEntry::new(event.line_item_id, sequence, Utc::now(), event.clone());
        stream.push(entry.clone());
        Ok(entry)
    }

    fn for_item(
        &self,
        line_item_id: LineItemId,
    ) -> Result<Vec<AuditEntry<LineItemEvent>>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::Poisoned)?;
        Ok(streams.get(&line_item_id).cloned().unwrap_or_default())
    }
}
