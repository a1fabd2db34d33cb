//! `lineguard-pricing` — price plausibility engine.
//!
//! Decides whether an observed unit price is plausible using a three-strategy
//! fallback chain: the canonical catalog range, a provisional range derived
//! from external vendor observations (interquartile method), and finally a
//! no-reference default that accepts with a flag-for-review confidence.
//!
//! The validator is pure: reference data is passed in by the caller, which
//! keeps every branch deterministic and unit-testable.

pub mod observation;
pub mod proposal;
pub mod range;
pub mod validator;

pub use observation::ExternalPriceObservation;
pub use proposal::RangeAdjustmentProposal;
pub use range::{ExpectedRange, PriceRange};
pub use validator::{PriceCheck, PriceValidator, PriceValidatorConfig, PriceVerdict, ValidationMethod};
