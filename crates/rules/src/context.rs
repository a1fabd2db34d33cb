//! Immutable input snapshot for one rule evaluation.

use serde::{Deserialize, Serialize};

use lineguard_core::{CanonicalItemId, Currency, LineItemId, VendorId};

/// Price band snapshot taken at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub min: f64,
    pub max: f64,
}

/// Service context the line item was billed under, as far as it is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service_line: Option<String>,
    pub service_type: Option<String>,
    pub scope_of_work: Option<String>,
    pub on_site_hours: Option<f64>,
}

impl ServiceSnapshot {
    /// How many descriptive fields are populated (context richness).
    pub fn richness(&self) -> usize {
        [
            self.service_line.is_some(),
            self.service_type.is_some(),
            self.scope_of_work.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    /// All populated text fields joined for categorization.
    pub fn combined_text(&self) -> String {
        [&self.service_line, &self.service_type, &self.scope_of_work]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything the rule engine is allowed to look at. Created fresh per
/// evaluation; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleContext {
    pub line_item_id: LineItemId,
    pub raw_name: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub currency: Currency,
    pub canonical_item_id: Option<CanonicalItemId>,
    pub match_confidence: Option<f64>,
    pub vendor_id: Option<VendorId>,
    pub price_range: Option<RangeSnapshot>,
    pub service: Option<ServiceSnapshot>,
    /// Free-text justification the user attached up front.
    pub additional_context: Option<String>,
}

impl RuleContext {
    pub fn total_value(&self) -> f64 {
        self.quantity * self.unit_price
    }

    /// Item text used for keyword categorization.
    pub fn item_text(&self) -> String {
        match &self.description {
            Some(d) => format!("{} {}", self.raw_name, d),
            None => self.raw_name.clone(),
        }
    }
}
