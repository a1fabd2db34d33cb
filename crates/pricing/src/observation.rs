//! Externally observed vendor prices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::{CanonicalItemId, Currency, VendorId};

/// One price observed at an external vendor source.
///
/// Produced only by the ingestion collaborator; the validator consumes these
/// read-only to derive provisional ranges when no canonical band exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPriceObservation {
    pub vendor_id: VendorId,
    pub source_url: String,
    /// Item name as displayed by the vendor.
    pub observed_name: String,
    pub last_price: f64,
    pub currency: Currency,
    pub unit_of_measure: Option<String>,
    pub pack_quantity: Option<f64>,
    pub canonical_item_id: Option<CanonicalItemId>,
    pub observed_at: DateTime<Utc>,
}

impl ExternalPriceObservation {
    /// Whether the observation is fresh enough to be used as reference data.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age_days: i64) -> bool {
        now.signed_duration_since(self.observed_at).num_days() <= max_age_days
    }
}
