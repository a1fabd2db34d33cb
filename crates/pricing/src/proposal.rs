//! Advisory price-range adjustment proposals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::{CanonicalItemId, Currency, ProposalId};

use crate::range::ExpectedRange;

/// Proposal to widen a canonical band toward an observed price.
///
/// Emitted when an observed price deviates from the canonical band by more
/// than the adjustment threshold. Advisory only: a reviewer decides whether
/// to apply it; the validator never mutates the band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAdjustmentProposal {
    pub proposal_id: ProposalId,
    pub canonical_item_id: CanonicalItemId,
    pub currency: Currency,
    pub current_range: ExpectedRange,
    pub suggested_range: ExpectedRange,
    pub observed_price: f64,
    /// Variance that triggered the proposal, as a fraction of the violated bound.
    pub trigger_variance: f64,
    pub created_at: DateTime<Utc>,
}

impl RangeAdjustmentProposal {
    pub fn new(
        canonical_item_id: CanonicalItemId,
        currency: Currency,
        current_range: ExpectedRange,
        suggested_range: ExpectedRange,
        observed_price: f64,
        trigger_variance: f64,
    ) -> Self {
        Self {
            proposal_id: ProposalId::new(),
            canonical_item_id,
            currency,
            current_range,
            suggested_range,
            observed_price,
            trigger_variance,
            created_at: Utc::now(),
        }
    }
}
