//! `lineguard-events` — event mechanics (no business rules).
//!
//! This crate provides the plumbing that moves domain events around:
//! the [`Event`] trait, a transport-agnostic pub/sub [`EventBus`], an
//! in-memory bus for tests/dev, and the append-only audit entry type.
//!
//! Delivery is **at-least-once**: events may arrive more than once and out of
//! order, so every consumer (the orchestrator first of all) must be
//! idempotent. Duplicates advance nothing; they are ignored, not rejected.

pub mod audit;
pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use audit::AuditEntry;
pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
