//! The rule engine.
//!
//! Every applicable rule runs and contributes reasons and policy codes; the
//! final decision is the highest severity reached, and the final confidence
//! is the most conservative (minimum) across fired rules. DENY rules force
//! their own fixed confidence. An internal fault never escapes this
//! boundary: the engine degrades to NEEDS_EXPLANATION at low confidence.

use std::collections::{BTreeMap, HashSet};

use serde_json::json;
use thiserror::Error;
use tracing::warn;

use lineguard_core::VendorId;
use lineguard_core::text::contains_word;

use crate::context::RuleContext;
use crate::lexicon::{
    Category, blacklisted_term, has_strong_opposition, mentions_construction_material,
    mentions_industrial_grade,
};
use crate::result::{PolicyCode, RuleDecision, RuleResult};

const NO_MATCH_CONFIDENCE: f64 = 0.9;
const NO_RANGE_CONFIDENCE: f64 = 0.8;
const PRICE_DENY_CONFIDENCE: f64 = 0.95;
const OVERRIDE_CONFIDENCE: f64 = 0.85;
const MISMATCH_BASE_CONFIDENCE: f64 = 0.6;
const MISMATCH_STRONG_CONFIDENCE: f64 = 0.75;
const MISMATCH_RICHNESS_BONUS: f64 = 0.05;
const MISMATCH_CONFIDENCE_CAP: f64 = 0.9;
const SHORT_VISIT_CONFIDENCE: f64 = 0.7;
const MAINTENANCE_MATERIAL_CONFIDENCE: f64 = 0.65;
const OFFICE_INDUSTRIAL_CONFIDENCE: f64 = 0.6;
const QUANTITY_CONFIDENCE: f64 = 0.8;
const EXCLUSION_CONFIDENCE: f64 = 1.0;
const SAFE_DEFAULT_CONFIDENCE: f64 = 0.1;

#[derive(Debug, Error)]
pub(crate) enum RuleError {
    #[error("invalid rule context: {0}")]
    InvalidContext(String),
}

/// Engine configuration. Thresholds mirror policy, not tuning knobs: change
/// them only when the policy itself changes.
#[derive(Debug, Clone)]
pub struct RuleEngineConfig {
    pub excluded_vendors: HashSet<VendorId>,
    /// Units beyond which a quantity needs justification.
    pub quantity_limit: f64,
    /// Price at or above `max * multiplier` is denied outright.
    pub price_max_multiplier: f64,
    /// Price at or below `min * multiplier` is denied outright.
    pub price_min_multiplier: f64,
    /// A visit this short combined with high value/quantity is suspicious.
    pub short_visit_hours: f64,
    pub high_value_total: f64,
    pub large_quantity: f64,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            excluded_vendors: HashSet::new(),
            quantity_limit: 1000.0,
            price_max_multiplier: 1.5,
            price_min_multiplier: 0.5,
            short_visit_hours: 2.0,
            high_value_total: 1000.0,
            large_quantity: 10.0,
        }
    }
}

struct Finding {
    code: PolicyCode,
    severity: RuleDecision,
    confidence: f64,
    reason: String,
}

/// Deterministic business-rule engine.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RuleEngineConfig,
}

impl RuleEngine {
    pub fn new(config: RuleEngineConfig) -> Self {
        Self { config }
    }

    /// Evaluate a context into exactly one result. Infallible at this
    /// boundary: internal faults degrade to a conservative verdict.
    pub fn evaluate(&self, ctx: &RuleContext) -> RuleResult {
        match self.evaluate_inner(ctx) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    line_item_id = %ctx.line_item_id,
                    error = %err,
                    "rule evaluation failed internally; returning conservative verdict"
                );
                let reason =
                    "Automatic rule evaluation could not complete; manual justification required"
                        .to_string();
                RuleResult {
                    decision: RuleDecision::NeedsExplanation,
                    explanation_prompt: Some(explanation_prompt(std::slice::from_ref(&reason))),
                    reasons: vec![reason],
                    policy_codes: Vec::new(),
                    facts: BTreeMap::new(),
                    confidence: SAFE_DEFAULT_CONFIDENCE,
                }
            }
        }
    }

    fn evaluate_inner(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        if !ctx.unit_price.is_finite() || !ctx.quantity.is_finite() {
            return Err(RuleError::InvalidContext(
                "quantity and unit price must be finite".to_string(),
            ));
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut annotations: Vec<String> = Vec::new();
        let mut facts: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        facts.insert("total_value".to_string(), json!(ctx.total_value()));

        // Match quality.
        if ctx.canonical_item_id.is_none() {
            findings.push(Finding {
                code: PolicyCode::NoCanonicalMatch,
                severity: RuleDecision::NeedsExplanation,
                confidence: NO_MATCH_CONFIDENCE,
                reason: format!("\"{}\" could not be matched to a catalog item", ctx.raw_name),
            });
        } else if ctx.price_range.is_none() {
            findings.push(Finding {
                code: PolicyCode::NoPriceRange,
                severity: RuleDecision::NeedsExplanation,
                confidence: NO_RANGE_CONFIDENCE,
                reason: "No price-range data exists for the matched catalog item".to_string(),
            });
        }

        // Price deviation (hard bounds).
        if let Some(range) = ctx.price_range {
            facts.insert("range_min".to_string(), json!(range.min));
            facts.insert("range_max".to_string(), json!(range.max));

            if range.max > 0.0 && ctx.unit_price >= range.max * self.config.price_max_multiplier {
                findings.push(Finding {
                    code: PolicyCode::PriceExceedsMax150,
                    severity: RuleDecision::Deny,
                    confidence: PRICE_DENY_CONFIDENCE,
                    reason: format!(
                        "Unit price {:.2} is at or above {}% of the range maximum {:.2}",
                        ctx.unit_price,
                        (self.config.price_max_multiplier * 100.0) as u32,
                        range.max
                    ),
                });
            } else if range.min > 0.0
                && ctx.unit_price <= range.min * self.config.price_min_multiplier
            {
                findings.push(Finding {
                    code: PolicyCode::PriceBelowMin50,
                    severity: RuleDecision::Deny,
                    confidence: PRICE_DENY_CONFIDENCE,
                    reason: format!(
                        "Unit price {:.2} is at or below {}% of the range minimum {:.2}",
                        ctx.unit_price,
                        (self.config.price_min_multiplier * 100.0) as u32,
                        range.min
                    ),
                });
            }
        }

        // Benefit of the doubt: user-supplied context overrides mild concerns,
        // never a DENY, and not a pile-up of issues.
        let mut override_applied = false;
        let user_context = ctx
            .additional_context
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(note) = user_context {
            facts.insert("additional_context_present".to_string(), json!(true));
            let deny_fired = findings.iter().any(|f| f.severity == RuleDecision::Deny);
            if !deny_fired && findings.len() <= 1 {
                override_applied = true;
                findings.push(Finding {
                    code: PolicyCode::UserContextOverride,
                    severity: RuleDecision::Allow,
                    confidence: OVERRIDE_CONFIDENCE,
                    reason: format!("User provided context up front: \"{note}\""),
                });
            } else {
                annotations.push(
                    "User context noted, but it cannot override the issues above".to_string(),
                );
            }
        } else if let Some(service) = &ctx.service {
            // Material/context consistency is only judged when the user gave
            // no context of their own.
            let item_cats = Category::categorize(&ctx.item_text());
            let ctx_cats = Category::categorize(&service.combined_text());
            let disjoint = !item_cats.is_empty()
                && !ctx_cats.is_empty()
                && item_cats.iter().all(|c| !ctx_cats.contains(c));
            if disjoint {
                let strong = has_strong_opposition(&item_cats, &ctx_cats);
                let base = if strong {
                    MISMATCH_STRONG_CONFIDENCE
                } else {
                    MISMATCH_BASE_CONFIDENCE
                };
                let confidence = (base + MISMATCH_RICHNESS_BONUS * service.richness() as f64)
                    .min(MISMATCH_CONFIDENCE_CAP);
                facts.insert("item_categories".to_string(), json!(item_cats));
                facts.insert("context_categories".to_string(), json!(ctx_cats));
                findings.push(Finding {
                    code: PolicyCode::ContextMismatch,
                    severity: RuleDecision::NeedsExplanation,
                    confidence,
                    reason: format!(
                        "Item categories {item_cats:?} do not fit the service context {ctx_cats:?}"
                    ),
                });
            }
        }

        // Service-specific consistency.
        if let Some(service) = &ctx.service {
            if service
                .on_site_hours
                .is_some_and(|h| h <= self.config.short_visit_hours)
                && (ctx.total_value() > self.config.high_value_total
                    || ctx.quantity > self.config.large_quantity)
            {
                findings.push(Finding {
                    code: PolicyCode::ServiceInconsistent,
                    severity: RuleDecision::NeedsExplanation,
                    confidence: SHORT_VISIT_CONFIDENCE,
                    reason: format!(
                        "A visit of {:.1}h does not fit a charge of {:.2} across {} unit(s)",
                        service.on_site_hours.unwrap_or_default(),
                        ctx.total_value(),
                        ctx.quantity
                    ),
                });
            }

            let is_maintenance = service
                .service_type
                .as_deref()
                .is_some_and(|t| contains_word(t, "maintenance"));
            if is_maintenance && mentions_construction_material(&ctx.item_text()) {
                findings.push(Finding {
                    code: PolicyCode::ServiceInconsistent,
                    severity: RuleDecision::NeedsExplanation,
                    confidence: MAINTENANCE_MATERIAL_CONFIDENCE,
                    reason: "Construction material billed under a maintenance service".to_string(),
                });
            }

            let office_context = contains_word(&service.combined_text(), "office");
            if office_context && mentions_industrial_grade(&ctx.item_text()) {
                findings.push(Finding {
                    code: PolicyCode::ServiceInconsistent,
                    severity: RuleDecision::NeedsExplanation,
                    confidence: OFFICE_INDUSTRIAL_CONFIDENCE,
                    reason: "Industrial-grade equipment billed in an office context".to_string(),
                });
            }
        }

        // Quantity limit.
        if ctx.quantity > self.config.quantity_limit {
            findings.push(Finding {
                code: PolicyCode::QuantityOverLimit,
                severity: RuleDecision::NeedsExplanation,
                confidence: QUANTITY_CONFIDENCE,
                reason: format!(
                    "Quantity {} exceeds the {} unit limit",
                    ctx.quantity, self.config.quantity_limit
                ),
            });
        }

        // Vendor exclusion.
        if let Some(vendor) = ctx.vendor_id {
            if self.config.excluded_vendors.contains(&vendor) {
                findings.push(Finding {
                    code: PolicyCode::VendorExcluded,
                    severity: RuleDecision::Deny,
                    confidence: EXCLUSION_CONFIDENCE,
                    reason: format!("Vendor {vendor} is excluded from purchasing"),
                });
            }
        }

        // Blacklisted terms in the item name.
        if let Some(term) = blacklisted_term(&ctx.raw_name) {
            facts.insert("blacklisted_term".to_string(), json!(term));
            findings.push(Finding {
                code: PolicyCode::BlacklistedTerm,
                severity: RuleDecision::Deny,
                confidence: EXCLUSION_CONFIDENCE,
                reason: format!("Item name contains the non-allowable term \"{term}\""),
            });
        }

        Ok(self.aggregate(findings, annotations, facts, override_applied))
    }

    fn aggregate(
        &self,
        findings: Vec<Finding>,
        annotations: Vec<String>,
        facts: BTreeMap<String, serde_json::Value>,
        override_applied: bool,
    ) -> RuleResult {
        let deny_confidence = findings
            .iter()
            .filter(|f| f.severity == RuleDecision::Deny)
            .map(|f| f.confidence)
            .fold(None::<f64>, |acc, c| Some(acc.map_or(c, |a| a.max(c))));
        let any_needs_explanation = findings
            .iter()
            .any(|f| f.severity == RuleDecision::NeedsExplanation);

        let decision = if deny_confidence.is_some() {
            RuleDecision::Deny
        } else if override_applied {
            RuleDecision::Allow
        } else if any_needs_explanation {
            RuleDecision::NeedsExplanation
        } else {
            RuleDecision::Allow
        };

        let confidence = match (decision, deny_confidence) {
            // DENY rules force their own confidence regardless of prior math.
            (RuleDecision::Deny, Some(c)) => c,
            (RuleDecision::Allow, _) if override_applied => OVERRIDE_CONFIDENCE,
            _ => findings
                .iter()
                .map(|f| f.confidence)
                .fold(1.0f64, f64::min),
        }
        .clamp(0.0, 1.0);

        let mut reasons: Vec<String> = findings.iter().map(|f| f.reason.clone()).collect();
        reasons.extend(annotations);

        let mut policy_codes: Vec<PolicyCode> = Vec::new();
        for f in &findings {
            if !policy_codes.contains(&f.code) {
                policy_codes.push(f.code);
            }
        }

        let explanation_prompt = (decision == RuleDecision::NeedsExplanation)
            .then(|| explanation_prompt(&reasons));

        RuleResult {
            decision,
            reasons,
            policy_codes,
            facts,
            confidence,
            explanation_prompt,
        }
    }
}

fn explanation_prompt(reasons: &[String]) -> String {
    let mut prompt =
        String::from("This line item needs a justification before it can be approved:\n");
    for reason in reasons {
        prompt.push_str("- ");
        prompt.push_str(reason);
        prompt.push('\n');
    }
    prompt.push_str("Please explain why this purchase was necessary for the work performed.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RangeSnapshot, RuleContext, ServiceSnapshot};
    use lineguard_core::{CanonicalItemId, Currency, LineItemId};
    use proptest::prelude::*;

    fn base_ctx() -> RuleContext {
        RuleContext {
            line_item_id: LineItemId::new(),
            raw_name: "copper pipe".to_string(),
            description: None,
            quantity: 2.0,
            unit_price: 15.0,
            currency: Currency::usd(),
            canonical_item_id: Some(CanonicalItemId::new()),
            match_confidence: Some(0.95),
            vendor_id: None,
            price_range: Some(RangeSnapshot { min: 10.0, max: 20.0 }),
            service: None,
            additional_context: None,
        }
    }

    #[test]
    fn clean_item_is_allowed() {
        let result = RuleEngine::default().evaluate(&base_ctx());
        assert_eq!(result.decision, RuleDecision::Allow);
        assert!(result.policy_codes.is_empty());
        assert!(result.explanation_prompt.is_none());
    }

    #[test]
    fn missing_match_needs_explanation() {
        let mut ctx = base_ctx();
        ctx.canonical_item_id = None;
        ctx.price_range = None;

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::NeedsExplanation);
        assert!(result.fired(PolicyCode::NoCanonicalMatch));
        assert!(!result.fired(PolicyCode::NoPriceRange));
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert!(result.explanation_prompt.is_some());
    }

    #[test]
    fn missing_range_only_checked_with_match() {
        let mut ctx = base_ctx();
        ctx.price_range = None;

        let result = RuleEngine::default().evaluate(&ctx);
        assert!(result.fired(PolicyCode::NoPriceRange));
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn price_at_exactly_150_percent_is_denied() {
        let mut ctx = base_ctx();
        ctx.unit_price = 30.0; // max 20 * 1.5

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Deny);
        assert!(result.fired(PolicyCode::PriceExceedsMax150));
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn price_at_half_the_minimum_is_denied() {
        let mut ctx = base_ctx();
        ctx.unit_price = 5.0; // min 10 * 0.5

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Deny);
        assert!(result.fired(PolicyCode::PriceBelowMin50));
    }

    #[test]
    fn deny_dominates_needs_explanation() {
        let mut ctx = base_ctx();
        ctx.canonical_item_id = None;
        ctx.price_range = None;
        ctx.raw_name = "gift card".to_string();

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Deny);
        assert!(result.fired(PolicyCode::NoCanonicalMatch));
        assert!(result.fired(PolicyCode::BlacklistedTerm));
        // Deny rules force their own fixed confidence.
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blacklist_fires_independent_of_price() {
        let mut ctx = base_ctx();
        ctx.raw_name = "technician labor".to_string();

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Deny);
        assert!(result.fired(PolicyCode::BlacklistedTerm));
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn user_context_overrides_a_single_mild_concern() {
        let mut ctx = base_ctx();
        ctx.price_range = None; // one mild finding
        ctx.additional_context = Some("Special-order fitting requested by the client".to_string());

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Allow);
        assert!(result.fired(PolicyCode::UserContextOverride));
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn user_context_never_overrides_deny() {
        let mut ctx = base_ctx();
        ctx.unit_price = 100.0;
        ctx.additional_context = Some("It was urgent".to_string());

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Deny);
        assert!(!result.fired(PolicyCode::UserContextOverride));
    }

    #[test]
    fn user_context_annotates_when_issues_pile_up() {
        let mut ctx = base_ctx();
        ctx.canonical_item_id = None;
        ctx.price_range = None;
        ctx.quantity = 2000.0; // second finding
        ctx.additional_context = Some("Bulk order".to_string());

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::NeedsExplanation);
        assert!(!result.fired(PolicyCode::UserContextOverride));
        assert!(result.reasons.iter().any(|r| r.contains("cannot override")));
    }

    #[test]
    fn disjoint_categories_flag_context_mismatch() {
        let mut ctx = base_ctx();
        ctx.raw_name = "concrete mix".to_string();
        ctx.service = Some(ServiceSnapshot {
            service_line: Some("Office services".to_string()),
            service_type: Some("Office deep clean".to_string()),
            scope_of_work: Some("weekly office upkeep".to_string()),
            on_site_hours: None,
        });

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::NeedsExplanation);
        assert!(result.fired(PolicyCode::ContextMismatch));
        // Strong opposite (construction vs office) + full richness, capped.
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn context_mismatch_skipped_when_user_context_present() {
        let mut ctx = base_ctx();
        ctx.raw_name = "concrete mix".to_string();
        ctx.service = Some(ServiceSnapshot {
            service_line: Some("Office services".to_string()),
            ..Default::default()
        });
        ctx.additional_context = Some("Patching the loading dock floor".to_string());

        let result = RuleEngine::default().evaluate(&ctx);
        assert!(!result.fired(PolicyCode::ContextMismatch));
        assert_eq!(result.decision, RuleDecision::Allow);
    }

    #[test]
    fn short_visit_with_high_value_is_inconsistent() {
        let mut ctx = base_ctx();
        ctx.quantity = 100.0;
        ctx.unit_price = 15.0; // total 1500
        ctx.service = Some(ServiceSnapshot {
            on_site_hours: Some(1.5),
            ..Default::default()
        });

        let result = RuleEngine::default().evaluate(&ctx);
        assert!(result.fired(PolicyCode::ServiceInconsistent));
        assert_eq!(result.decision, RuleDecision::NeedsExplanation);
    }

    #[test]
    fn quantity_over_limit_needs_explanation() {
        let mut ctx = base_ctx();
        ctx.quantity = 1001.0;

        let result = RuleEngine::default().evaluate(&ctx);
        assert!(result.fired(PolicyCode::QuantityOverLimit));
    }

    #[test]
    fn excluded_vendor_is_denied() {
        let vendor = lineguard_core::VendorId::new();
        let mut config = RuleEngineConfig::default();
        config.excluded_vendors.insert(vendor);

        let mut ctx = base_ctx();
        ctx.vendor_id = Some(vendor);

        let result = RuleEngine::new(config).evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::Deny);
        assert!(result.fired(PolicyCode::VendorExcluded));
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn minimum_confidence_wins_across_mild_rules() {
        let mut ctx = base_ctx();
        ctx.price_range = None; // 0.8
        ctx.quantity = 2000.0; // 0.8
        ctx.service = Some(ServiceSnapshot {
            service_type: Some("Maintenance".to_string()),
            ..Default::default()
        });
        ctx.raw_name = "concrete mix".to_string(); // maintenance/material, 0.65

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::NeedsExplanation);
        assert!((result.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn internal_fault_degrades_to_conservative_verdict() {
        let mut ctx = base_ctx();
        ctx.unit_price = f64::NAN;

        let result = RuleEngine::default().evaluate(&ctx);
        assert_eq!(result.decision, RuleDecision::NeedsExplanation);
        assert!((result.confidence - 0.1).abs() < 1e-9);
        assert!(result.explanation_prompt.is_some());
    }

    proptest! {
        #[test]
        fn confidence_is_always_clamped(
            price in 0.01f64..10_000.0,
            quantity in 0.1f64..5_000.0,
            matched in any::<bool>(),
            has_range in any::<bool>(),
        ) {
            let mut ctx = base_ctx();
            ctx.unit_price = price;
            ctx.quantity = quantity;
            if !matched {
                ctx.canonical_item_id = None;
            }
            if !has_range {
                ctx.price_range = None;
            }

            let result = RuleEngine::default().evaluate(&ctx);
            prop_assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        }

        #[test]
        fn deny_always_dominates(price in 30.0f64..10_000.0) {
            // Anything at/above 150% of max must end in Deny, whatever else fired.
            let mut ctx = base_ctx();
            ctx.unit_price = price;
            ctx.quantity = 2000.0;
            ctx.canonical_item_id = Some(CanonicalItemId::new());

            let result = RuleEngine::default().evaluate(&ctx);
            prop_assert_eq!(result.decision, RuleDecision::Deny);
        }
    }
}
