//! Rule evaluation output value objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Final decision, ordered by severity. Later rules may escalate but never
/// de-escalate (the user-context override is the engine's single exception).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleDecision {
    Allow,
    NeedsExplanation,
    Deny,
}

/// Machine-readable tag identifying which rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyCode {
    #[serde(rename = "NO_CANONICAL_MATCH")]
    NoCanonicalMatch,
    #[serde(rename = "NO_PRICE_RANGE")]
    NoPriceRange,
    #[serde(rename = "PRICE_EXCEEDS_MAX_150")]
    PriceExceedsMax150,
    #[serde(rename = "PRICE_BELOW_MIN_50")]
    PriceBelowMin50,
    #[serde(rename = "USER_CONTEXT_OVERRIDE")]
    UserContextOverride,
    #[serde(rename = "CONTEXT_MISMATCH")]
    ContextMismatch,
    #[serde(rename = "SERVICE_INCONSISTENT")]
    ServiceInconsistent,
    #[serde(rename = "QUANTITY_OVER_LIMIT")]
    QuantityOverLimit,
    #[serde(rename = "VENDOR_EXCLUDED")]
    VendorExcluded,
    #[serde(rename = "BLACKLISTED_TERM")]
    BlacklistedTerm,
}

impl PolicyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCode::NoCanonicalMatch => "NO_CANONICAL_MATCH",
            PolicyCode::NoPriceRange => "NO_PRICE_RANGE",
            PolicyCode::PriceExceedsMax150 => "PRICE_EXCEEDS_MAX_150",
            PolicyCode::PriceBelowMin50 => "PRICE_BELOW_MIN_50",
            PolicyCode::UserContextOverride => "USER_CONTEXT_OVERRIDE",
            PolicyCode::ContextMismatch => "CONTEXT_MISMATCH",
            PolicyCode::ServiceInconsistent => "SERVICE_INCONSISTENT",
            PolicyCode::QuantityOverLimit => "QUANTITY_OVER_LIMIT",
            PolicyCode::VendorExcluded => "VENDOR_EXCLUDED",
            PolicyCode::BlacklistedTerm => "BLACKLISTED_TERM",
        }
    }
}

impl core::fmt::Display for PolicyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value object produced by one evaluation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub decision: RuleDecision,
    /// Human-readable reasons, in the order the rules fired.
    pub reasons: Vec<String>,
    pub policy_codes: Vec<PolicyCode>,
    /// Diagnostic key/values (deterministic ordering).
    pub facts: BTreeMap<String, JsonValue>,
    /// In [0, 1]; the most conservative confidence across fired rules.
    pub confidence: f64,
    /// Prompt shown to the user when the decision asks for an explanation.
    pub explanation_prompt: Option<String>,
}

impl RuleResult {
    pub fn fired(&self, code: PolicyCode) -> bool {
        self.policy_codes.contains(&code)
    }
}
