//! Domain events for line items.
//!
//! Events are the only mechanism that advances a line item's status. The
//! payload is a closed tagged union, so adding an event kind forces every
//! match site to be revisited at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::{CanonicalItemId, ExplanationId, LineItemId};
use lineguard_events::Event;
use lineguard_pricing::{ExpectedRange, ValidationMethod};
use lineguard_rules::PolicyCode;

/// Compact record of a price validation outcome, carried on the event so
/// downstream consumers never re-run the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCheckSummary {
    pub valid: bool,
    /// Coarser judgment than `valid`; an invalid-but-plausible external
    /// result can still be accepted.
    pub accepted: bool,
    pub method: ValidationMethod,
    pub confidence: f64,
    pub expected_range: Option<ExpectedRange>,
    pub variance_pct: Option<f64>,
    pub sample_size: Option<usize>,
    pub proposal_id: Option<lineguard_core::ProposalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    QueuedForIngest,
    WebIngested {
        observations_found: usize,
    },
    QueuedForMatch,
    Matched {
        canonical_item_id: Option<CanonicalItemId>,
        confidence: f64,
    },
    PriceValidated(PriceCheckSummary),
    NeedsExplanation {
        prompt: String,
        policy_codes: Vec<PolicyCode>,
    },
    ExplanationSubmitted {
        explanation_id: ExplanationId,
    },
    ReadyForSubmission,
    Denied {
        reasons: Vec<String>,
        policy_codes: Vec<PolicyCode>,
    },
}

/// Discriminant of [`EventPayload`], used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    QueuedForIngest,
    WebIngested,
    QueuedForMatch,
    Matched,
    PriceValidated,
    NeedsExplanation,
    ExplanationSubmitted,
    ReadyForSubmission,
    Denied,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::QueuedForIngest,
        EventKind::WebIngested,
        EventKind::QueuedForMatch,
        EventKind::Matched,
        EventKind::PriceValidated,
        EventKind::NeedsExplanation,
        EventKind::ExplanationSubmitted,
        EventKind::ReadyForSubmission,
        EventKind::Denied,
    ];
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::QueuedForIngest => EventKind::QueuedForIngest,
            EventPayload::WebIngested { .. } => EventKind::WebIngested,
            EventPayload::QueuedForMatch => EventKind::QueuedForMatch,
            EventPayload::Matched { .. } => EventKind::Matched,
            EventPayload::PriceValidated(_) => EventKind::PriceValidated,
            EventPayload::NeedsExplanation { .. } => EventKind::NeedsExplanation,
            EventPayload::ExplanationSubmitted { .. } => EventKind::ExplanationSubmitted,
            EventPayload::ReadyForSubmission => EventKind::ReadyForSubmission,
            EventPayload::Denied { .. } => EventKind::Denied,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.kind() {
            EventKind::QueuedForIngest => "QUEUED_FOR_INGEST",
            EventKind::WebIngested => "WEB_INGESTED",
            EventKind::QueuedForMatch => "QUEUED_FOR_MATCH",
            EventKind::Matched => "MATCHED",
            EventKind::PriceValidated => "PRICE_VALIDATED",
            EventKind::NeedsExplanation => "NEEDS_EXPLANATION",
            EventKind::ExplanationSubmitted => "EXPLANATION_SUBMITTED",
            EventKind::ReadyForSubmission => "READY_FOR_SUBMISSION",
            EventKind::Denied => "DENIED",
        }
    }
}

/// Envelope pairing a payload with the line item it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemEvent {
    pub line_item_id: LineItemId,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl LineItemEvent {
    pub fn new(line_item_id: LineItemId, payload: EventPayload) -> Self {
        Self {
            line_item_id,
            payload,
            occurred_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl Event for LineItemEvent {
    fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
