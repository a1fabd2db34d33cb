//! Price plausibility validator.
//!
//! Strategy order (first applicable wins):
//! 1. canonical range — trusted catalog band for the matched item
//! 2. external provisional — interquartile band over vendor observations
//! 3. no reference — accept with a flag-for-review confidence
//!
//! The validator never mutates reference data. When an observed price
//! deviates hard from a canonical band it emits an advisory
//! [`RangeAdjustmentProposal`] for human review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use lineguard_core::{CanonicalItemId, Currency, LineItemId, text::token_set_similarity};

use crate::observation::ExternalPriceObservation;
use crate::proposal::RangeAdjustmentProposal;
use crate::range::{ExpectedRange, PriceRange};

/// Fixed confidence for a canonical-range verdict.
const CANONICAL_CONFIDENCE: f64 = 0.9;
/// Fixed confidence when no reference data exists at all.
const NO_REFERENCE_CONFIDENCE: f64 = 0.1;

const EXTERNAL_BASE_CONFIDENCE: f64 = 0.3;
const EXTERNAL_SAMPLE_BONUS: f64 = 0.05;
const EXTERNAL_SAMPLE_BONUS_CAP: f64 = 0.3;
const EXTERNAL_OUTLIER_PENALTY_CAP: f64 = 0.2;
const EXTERNAL_CONFIDENCE_MIN: f64 = 0.1;
const EXTERNAL_CONFIDENCE_MAX: f64 = 0.7;

/// Acceptability floor for external-provisional verdicts outside the band.
const EXTERNAL_ACCEPT_CONFIDENCE: f64 = 0.4;
const EXTERNAL_ACCEPT_VARIANCE: f64 = 0.5;

/// How the verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    CanonicalRange,
    ExternalProvisional,
    NoReference,
}

impl ValidationMethod {
    pub fn tag(&self) -> &'static str {
        match self {
            ValidationMethod::CanonicalRange => "canonical_range",
            ValidationMethod::ExternalProvisional => "external_provisional",
            ValidationMethod::NoReference => "no_reference",
        }
    }
}

/// Input to one price validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCheck {
    pub line_item_id: LineItemId,
    pub canonical_item_id: Option<CanonicalItemId>,
    /// Raw invoice name, used for fuzzy-matching external observations
    /// when no canonical link exists.
    pub raw_name: String,
    pub unit_price: f64,
    pub currency: Currency,
}

/// Outcome of one price validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceVerdict {
    pub valid: bool,
    pub method: ValidationMethod,
    pub confidence: f64,
    pub expected_range: Option<ExpectedRange>,
    /// Deviation from the violated bound as a fraction of that bound.
    /// `Some(0.0)` inside the range; `None` when it cannot be computed
    /// without dividing by zero.
    pub variance_pct: Option<f64>,
    /// Number of external observations backing a provisional range.
    pub sample_size: Option<usize>,
    pub proposal: Option<RangeAdjustmentProposal>,
}

impl PriceVerdict {
    /// Coarser judgment used by the pipeline: should this price be allowed
    /// to proceed without forcing an explanation?
    ///
    /// - canonical range: accepted iff valid
    /// - external provisional: accepted if valid, or confidence and variance
    ///   are both tolerable
    /// - no reference: always accepted (review is signalled by the low
    ///   confidence, not by blocking)
    pub fn is_acceptable(&self) -> bool {
        match self.method {
            ValidationMethod::CanonicalRange => self.valid,
            ValidationMethod::ExternalProvisional => {
                self.valid
                    || (self.confidence >= EXTERNAL_ACCEPT_CONFIDENCE
                        && self.variance_pct.is_some_and(|v| v <= EXTERNAL_ACCEPT_VARIANCE))
            }
            ValidationMethod::NoReference => true,
        }
    }
}

/// Tunable thresholds for the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceValidatorConfig {
    /// Canonical variance beyond which an adjustment proposal is emitted.
    pub adjustment_variance_threshold: f64,
    /// How far a proposal widens the violated bound toward the observed price.
    pub range_widen_step: f64,
    /// Buffer around a single external observation (fraction of its value).
    pub single_sample_buffer: f64,
    /// IQR fence multiplier.
    pub iqr_fence: f64,
    /// External tolerance as a multiple of the adjustment threshold.
    pub external_tolerance_factor: f64,
    /// Minimum token-set similarity for fuzzy observation matching.
    pub fuzzy_match_threshold: f64,
    /// Observations older than this are ignored.
    pub max_observation_age_days: i64,
}

impl Default for PriceValidatorConfig {
    fn default() -> Self {
        Self {
            adjustment_variance_threshold: 0.20,
            range_widen_step: 0.05,
            single_sample_buffer: 0.20,
            iqr_fence: 1.5,
            external_tolerance_factor: 1.5,
            fuzzy_match_threshold: 0.86,
            max_observation_age_days: 365,
        }
    }
}

/// The price plausibility engine.
#[derive(Debug, Clone, Default)]
pub struct PriceValidator {
    config: PriceValidatorConfig,
}

impl PriceValidator {
    pub fn new(config: PriceValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriceValidatorConfig {
        &self.config
    }

    /// Validate an observed unit price against the available reference data.
    ///
    /// `range` and `observations` are whatever the caller could load for the
    /// item; reference data in a different currency is excluded here.
    pub fn validate(
        &self,
        check: &PriceCheck,
        range: Option<&PriceRange>,
        observations: &[ExternalPriceObservation],
        now: DateTime<Utc>,
    ) -> PriceVerdict {
        if let Some(range) = range {
            if range.currency == check.currency {
                return self.validate_canonical(check, range);
            }
            debug!(
                line_item_id = %check.line_item_id,
                range_currency = %range.currency,
                price_currency = %check.currency,
                "canonical range excluded due to currency mismatch"
            );
        }

        let prices = self.reference_prices(check, observations, now);
        if !prices.is_empty() {
            return self.validate_external(check, prices);
        }

        debug!(line_item_id = %check.line_item_id, "no reference data; accepting for review");
        PriceVerdict {
            valid: true,
            method: ValidationMethod::NoReference,
            confidence: NO_REFERENCE_CONFIDENCE,
            expected_range: None,
            variance_pct: None,
            sample_size: None,
            proposal: None,
        }
    }

    fn validate_canonical(&self, check: &PriceCheck, range: &PriceRange) -> PriceVerdict {
        let band = ExpectedRange::new(range.min_price, range.max_price);
        let valid = band.contains(check.unit_price);
        let variance = variance_pct(check.unit_price, band);

        let proposal = variance
            .filter(|v| *v > self.config.adjustment_variance_threshold)
            .map(|v| {
                let suggested = self.widened_toward(band, check.unit_price);
                debug!(
                    line_item_id = %check.line_item_id,
                    variance = v,
                    "emitting range adjustment proposal"
                );
                RangeAdjustmentProposal::new(
                    range.canonical_item_id,
                    range.currency.clone(),
                    band,
                    suggested,
                    check.unit_price,
                    v,
                )
            });

        PriceVerdict {
            valid,
            method: ValidationMethod::CanonicalRange,
            confidence: CANONICAL_CONFIDENCE,
            expected_range: Some(band),
            variance_pct: variance,
            sample_size: None,
            proposal,
        }
    }

    fn validate_external(&self, check: &PriceCheck, mut prices: Vec<f64>) -> PriceVerdict {
        prices.sort_by(|a, b| a.total_cmp(b));
        let n = prices.len();

        let band = if n == 1 {
            let p = prices[0];
            ExpectedRange::new(
                (p * (1.0 - self.config.single_sample_buffer)).max(0.0),
                p * (1.0 + self.config.single_sample_buffer),
            )
        } else {
            let (q1, q3) = tukey_hinges(&prices);
            let iqr = q3 - q1;
            ExpectedRange::new(
                (q1 - self.config.iqr_fence * iqr).max(0.0),
                q3 + self.config.iqr_fence * iqr,
            )
        };

        let variance = variance_pct(check.unit_price, band);
        let tolerance =
            self.config.adjustment_variance_threshold * self.config.external_tolerance_factor;
        let valid =
            band.contains(check.unit_price) || variance.is_some_and(|v| v <= tolerance);

        let sample_bonus = (EXTERNAL_SAMPLE_BONUS * n as f64).min(EXTERNAL_SAMPLE_BONUS_CAP);
        let med = median(&prices);
        let outlier_penalty = if med > f64::EPSILON {
            ((check.unit_price - med).abs() / med).min(1.0) * EXTERNAL_OUTLIER_PENALTY_CAP
        } else {
            0.0
        };
        let confidence = (EXTERNAL_BASE_CONFIDENCE + sample_bonus - outlier_penalty)
            .clamp(EXTERNAL_CONFIDENCE_MIN, EXTERNAL_CONFIDENCE_MAX);

        PriceVerdict {
            valid,
            method: ValidationMethod::ExternalProvisional,
            confidence,
            expected_range: Some(band),
            variance_pct: variance,
            sample_size: Some(n),
            proposal: None,
        }
    }

    /// Collect usable reference prices: same currency, fresh, matched by
    /// canonical link when one exists, otherwise by fuzzy name.
    fn reference_prices(
        &self,
        check: &PriceCheck,
        observations: &[ExternalPriceObservation],
        now: DateTime<Utc>,
    ) -> Vec<f64> {
        let usable: Vec<&ExternalPriceObservation> = observations
            .iter()
            .filter(|o| o.currency == check.currency)
            .filter(|o| o.is_fresh(now, self.config.max_observation_age_days))
            .filter(|o| o.last_price.is_finite() && o.last_price > 0.0)
            .collect();

        if let Some(canonical_id) = check.canonical_item_id {
            let linked: Vec<f64> = usable
                .iter()
                .filter(|o| o.canonical_item_id == Some(canonical_id))
                .map(|o| o.last_price)
                .collect();
            if !linked.is_empty() {
                return linked;
            }
        }

        usable
            .iter()
            .filter(|o| {
                token_set_similarity(&o.observed_name, &check.raw_name)
                    >= self.config.fuzzy_match_threshold
            })
            .map(|o| o.last_price)
            .collect()
    }

    fn widened_toward(&self, band: ExpectedRange, price: f64) -> ExpectedRange {
        let step = self.config.range_widen_step;
        if price > band.max {
            ExpectedRange::new(band.min, band.max * (1.0 + step))
        } else {
            ExpectedRange::new((band.min * (1.0 - step)).max(0.0), band.max)
        }
    }
}

/// Deviation from the violated bound as a fraction of that bound.
///
/// Inside the band the variance is 0. A bound of ~0 cannot be used as a
/// denominator; in that case the variance is undefined rather than
/// NaN/Infinity.
fn variance_pct(price: f64, band: ExpectedRange) -> Option<f64> {
    if band.contains(price) {
        return Some(0.0);
    }
    if price < band.min {
        if band.min > f64::EPSILON {
            return Some((band.min - price) / band.min);
        }
        return None;
    }
    if band.max > f64::EPSILON {
        return Some((price - band.max) / band.max);
    }
    None
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Inclusive Tukey hinges: medians of the lower and upper halves, with the
/// sample median included in both halves for odd-length samples.
fn tukey_hinges(sorted: &[f64]) -> (f64, f64) {
    let n = sorted.len();
    let cut = n / 2 + n % 2;
    (median(&sorted[..cut]), median(&sorted[n / 2..]))
}
