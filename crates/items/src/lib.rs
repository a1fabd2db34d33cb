//! `lineguard-items` — the line item and its status state machine.
//!
//! A line item enters at `New` and is advanced exclusively by domain events
//! applied through the orchestrator. The transition function is pure and
//! forgiving: out-of-order or duplicate events are ignored, never errors,
//! because delivery is at-least-once.

pub mod event;
pub mod explanation;
pub mod item;
pub mod lease;
pub mod status;

pub use event::{EventKind, EventPayload, LineItemEvent, PriceCheckSummary};
pub use explanation::{Explanation, VerificationStatus};
pub use item::{LineItem, ServiceContext};
pub use lease::ProcessingLease;
pub use status::{LineItemStatus, Transition, transition};
