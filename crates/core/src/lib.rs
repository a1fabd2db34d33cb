//! `lineguard-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly typed identifiers, the domain error model, currency/price value
//! objects, and the text-matching helpers shared by the decision engines.

pub mod error;
pub mod id;
pub mod money;
pub mod text;

pub use error::{DomainError, DomainResult};
pub use id::{
    CanonicalItemId, ExplanationId, InvoiceId, LineItemId, ProposalId, VendorId, WorkerId,
};
pub use money::Currency;
