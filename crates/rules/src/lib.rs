//! `lineguard-rules` — deterministic business-rule engine.
//!
//! Evaluates an immutable [`RuleContext`] snapshot into exactly one
//! [`RuleResult`]. All applicable rules run (no short-circuiting); later
//! rules can only escalate severity (ALLOW → NEEDS_EXPLANATION → DENY),
//! with one deliberate exception: user-supplied additional context can
//! override mild concerns back to ALLOW, but never a DENY.

pub mod context;
pub mod engine;
pub mod lexicon;
pub mod result;

pub use context::{RangeSnapshot, RuleContext, ServiceSnapshot};
pub use engine::{RuleEngine, RuleEngineConfig};
pub use result::{PolicyCode, RuleDecision, RuleResult};
