//! The line item aggregate.
//!
//! Status and match data are mutated only through [`LineItem::apply`]; every
//! other field is set at ingest time. Items are never deleted, the audit
//! trail of applied events lives in the store's event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::money::validate_unit_price;
use lineguard_core::{CanonicalItemId, Currency, DomainError, InvoiceId, LineItemId, VendorId, WorkerId};
use lineguard_rules::{RangeSnapshot, RuleContext, ServiceSnapshot};

use crate::event::{EventPayload, LineItemEvent};
use crate::lease::ProcessingLease;
use crate::status::{LineItemStatus, Transition, transition};

/// Service context captured at ingest, if the invoice carried any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub service_line: Option<String>,
    pub service_type: Option<String>,
    pub scope_of_work: Option<String>,
    pub on_site_hours: Option<f64>,
}

impl ServiceContext {
    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            service_line: self.service_line.clone(),
            service_type: self.service_type.clone(),
            scope_of_work: self.scope_of_work.clone(),
            on_site_hours: self.on_site_hours,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service_line.is_none()
            && self.service_type.is_none()
            && self.scope_of_work.is_none()
            && self.on_site_hours.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_item_id: LineItemId,
    pub invoice_id: InvoiceId,
    pub vendor_id: Option<VendorId>,
    pub raw_name: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub currency: Currency,
    pub canonical_item_id: Option<CanonicalItemId>,
    pub match_confidence: Option<f64>,
    pub service: Option<ServiceContext>,
    pub additional_context: Option<String>,
    pub status: LineItemStatus,
    pub lease: Option<ProcessingLease>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LineItem {
    pub fn new(
        invoice_id: InvoiceId,
        raw_name: impl Into<String>,
        quantity: f64,
        unit_price: f64,
        currency: Currency,
    ) -> Result<Self, DomainError> {
        let raw_name = raw_name.into();
        if raw_name.trim().is_empty() {
            return Err(DomainError::validation("line item name cannot be empty"));
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        validate_unit_price(unit_price)?;

        let now = Utc::now();
        Ok(Self {
            line_item_id: LineItemId::new(),
            invoice_id,
            vendor_id: None,
            raw_name,
            description: None,
            quantity,
            unit_price,
            currency,
            canonical_item_id: None,
            match_confidence: None,
            service: None,
            additional_context: None,
            status: LineItemStatus::New,
            lease: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn total_value(&self) -> f64 {
        self.quantity * self.unit_price
    }

    /// Apply a domain event. Advances status per the transition table and
    /// folds event data into the aggregate. Ignored events leave the item
    /// untouched, so replays are harmless.
    pub fn apply(&mut self, event: &LineItemEvent) -> Result<Transition, DomainError> {
        if event.line_item_id != self.line_item_id {
            return Err(DomainError::invariant(format!(
                "event for item {} applied to item {}",
                event.line_item_id, self.line_item_id
            )));
        }

        let outcome = transition(self.status, event.kind());
        if let Transition::Advance(next) = outcome {
            if let EventPayload::Matched {
                canonical_item_id,
                confidence,
            } = &event.payload
            {
                self.canonical_item_id = *canonical_item_id;
                self.match_confidence = Some(*confidence);
            }
            self.status = next;
            self.updated_at = Utc::now();
        }
        Ok(outcome)
    }

    /// Acquire the processing lease if it is free or expired. Returns false
    /// when another worker holds an unexpired lease.
    pub fn try_acquire_lease(&mut self, worker: WorkerId, now: DateTime<Utc>) -> bool {
        if let Some(lease) = &self.lease {
            if lease.blocks(worker, now) {
                return false;
            }
        }
        self.lease = Some(ProcessingLease::acquire_default(worker, now));
        true
    }

    /// Release the lease. Only the owner may release; a mismatched release
    /// is ignored so stale workers cannot free someone else's lease.
    pub fn release_lease(&mut self, worker: WorkerId) {
        if self.lease.is_some_and(|l| l.owner == worker) {
            self.lease = None;
        }
    }

    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease.is_some_and(|l| !l.is_expired(now))
    }

    /// Snapshot everything the rule engine is allowed to see.
    pub fn rule_context(&self, price_range: Option<RangeSnapshot>) -> RuleContext {
        RuleContext {
            line_item_id: self.line_item_id,
            raw_name: self.raw_name.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            currency: self.currency.clone(),
            canonical_item_id: self.canonical_item_id,
            match_confidence: self.match_confidence,
            vendor_id: self.vendor_id,
            price_range,
            service: self.service.as_ref().map(ServiceContext::snapshot),
            additional_context: self.additional_context.clone(),
        }
    }
}
