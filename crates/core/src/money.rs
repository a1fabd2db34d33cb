//! Currency and price value objects.
//!
//! Prices flow through the validation engines as `f64` because every judgment
//! is fractional (variance percentages, quartile fences, confidence weights).
//! The boundary helpers here keep malformed values out of the engines.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// ISO-4217-style currency code (uppercase, 3 ASCII letters).
///
/// Reference data in a different currency than the observed price must never
/// be compared against it, so currency equality checks gate every price path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> DomainResult<Self> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency code must be 3 ASCII letters, got {code:?}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate an observed unit price before it reaches any engine.
///
/// Zero or negative prices are a caller bug; the engines additionally guard
/// their own divisions so a bad value can never produce NaN/Infinity.
pub fn validate_unit_price(price: f64) -> DomainResult<f64> {
    if !price.is_finite() {
        return Err(DomainError::validation("unit price must be finite"));
    }
    if price <= 0.0 {
        return Err(DomainError::validation(format!(
            "unit price must be positive, got {price}"
        )));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_is_normalized_to_uppercase() {
        let c = Currency::new("usd").unwrap();
        assert_eq!(c.as_str(), "USD");
        assert_eq!(c, Currency::usd());
    }

    #[test]
    fn bad_currency_codes_are_rejected() {
        assert!(Currency::new("").is_err());
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("U5D").is_err());
        assert!(Currency::new("DOLLARS").is_err());
    }

    #[test]
    fn unit_price_must_be_positive_and_finite() {
        assert!(validate_unit_price(12.5).is_ok());
        assert!(validate_unit_price(0.0).is_err());
        assert!(validate_unit_price(-3.0).is_err());
        assert!(validate_unit_price(f64::NAN).is_err());
        assert!(validate_unit_price(f64::INFINITY).is_err());
    }
}
