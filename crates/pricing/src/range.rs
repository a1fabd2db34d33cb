//! Canonical price bands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::{CanonicalItemId, Currency, DomainError, DomainResult};

/// Canonical price band for a catalog item in one currency.
///
/// One band exists per (canonical item, currency); it is created and updated
/// only through the range-adjustment proposal flow, never by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub canonical_item_id: CanonicalItemId,
    pub currency: Currency,
    pub min_price: f64,
    pub max_price: f64,
    /// Where the band came from (e.g. "catalog", "proposal-review").
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriceRange {
    pub fn new(
        canonical_item_id: CanonicalItemId,
        currency: Currency,
        min_price: f64,
        max_price: f64,
        source: impl Into<String>,
    ) -> DomainResult<Self> {
        if !(min_price.is_finite() && max_price.is_finite()) {
            return Err(DomainError::validation("price range bounds must be finite"));
        }
        if min_price < 0.0 || max_price < min_price {
            return Err(DomainError::validation(format!(
                "invalid price range [{min_price}, {max_price}]"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            canonical_item_id,
            currency,
            min_price,
            max_price,
            source: source.into(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

/// The band a verdict was judged against (canonical or provisional).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub min: f64,
    pub max: f64,
}

impl ExpectedRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_or_negative_bounds() {
        let id = CanonicalItemId::new();
        assert!(PriceRange::new(id, Currency::usd(), 20.0, 10.0, "catalog").is_err());
        assert!(PriceRange::new(id, Currency::usd(), -1.0, 10.0, "catalog").is_err());
        assert!(PriceRange::new(id, Currency::usd(), 0.0, f64::NAN, "catalog").is_err());
    }

    #[test]
    fn containment_is_inclusive() {
        let id = CanonicalItemId::new();
        let range = PriceRange::new(id, Currency::usd(), 10.0, 20.0, "catalog").unwrap();
        assert!(range.contains(10.0));
        assert!(range.contains(20.0));
        assert!(!range.contains(20.01));
    }
}
