//! Line item status machine.
//!
//! Status only ever changes through [`transition`]. The function is total
//! and forgiving: duplicate, out-of-order, or unknown-for-this-state events
//! produce [`Transition::Ignore`], never an error, so at-least-once event
//! delivery is safe to replay.

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemStatus {
    New,
    AwaitingIngest,
    WebIngested,
    AwaitingMatch,
    Matched,
    PriceValidated,
    NeedsExplanation,
    ExplanationSubmitted,
    ReadyForSubmission,
    Denied,
}

impl LineItemStatus {
    pub const ALL: [LineItemStatus; 10] = [
        LineItemStatus::New,
        LineItemStatus::AwaitingIngest,
        LineItemStatus::WebIngested,
        LineItemStatus::AwaitingMatch,
        LineItemStatus::Matched,
        LineItemStatus::PriceValidated,
        LineItemStatus::NeedsExplanation,
        LineItemStatus::ExplanationSubmitted,
        LineItemStatus::ReadyForSubmission,
        LineItemStatus::Denied,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LineItemStatus::ReadyForSubmission | LineItemStatus::Denied
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemStatus::New => "NEW",
            LineItemStatus::AwaitingIngest => "AWAITING_INGEST",
            LineItemStatus::WebIngested => "WEB_INGESTED",
            LineItemStatus::AwaitingMatch => "AWAITING_MATCH",
            LineItemStatus::Matched => "MATCHED",
            LineItemStatus::PriceValidated => "PRICE_VALIDATED",
            LineItemStatus::NeedsExplanation => "NEEDS_EXPLANATION",
            LineItemStatus::ExplanationSubmitted => "EXPLANATION_SUBMITTED",
            LineItemStatus::ReadyForSubmission => "READY_FOR_SUBMISSION",
            LineItemStatus::Denied => "DENIED",
        }
    }
}

impl core::fmt::Display for LineItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying an event to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance(LineItemStatus),
    /// Duplicate, out-of-order, or irrelevant for the current status.
    Ignore,
}

/// Pure transition function. Terminal states ignore everything.
pub fn transition(status: LineItemStatus, event: EventKind) -> Transition {
    use EventKind as E;
    use LineItemStatus as S;

    if status.is_terminal() {
        return Transition::Ignore;
    }

    let next = match (status, event) {
        (S::New, E::QueuedForIngest) => S::AwaitingIngest,
        (S::New, E::QueuedForMatch) => S::AwaitingMatch,
        (S::AwaitingIngest, E::WebIngested) => S::WebIngested,
        (S::WebIngested, E::QueuedForMatch) => S::AwaitingMatch,
        (S::AwaitingMatch, E::Matched) => S::Matched,
        (S::Matched, E::PriceValidated) => S::PriceValidated,
        (S::PriceValidated, E::ReadyForSubmission) => S::ReadyForSubmission,
        (S::PriceValidated, E::NeedsExplanation) => S::NeedsExplanation,
        (S::PriceValidated, E::Denied) => S::Denied,
        (S::NeedsExplanation, E::ExplanationSubmitted) => S::ExplanationSubmitted,
        (S::NeedsExplanation, E::Denied) => S::Denied,
        (S::ExplanationSubmitted, E::ReadyForSubmission) => S::ReadyForSubmission,
        // A rejected-with-feedback verdict sends the item back for another try.
        (S::ExplanationSubmitted, E::NeedsExplanation) => S::NeedsExplanation,
        (S::ExplanationSubmitted, E::Denied) => S::Denied,
        _ => return Transition::Ignore,
    };
    Transition::Advance(next)
}
