//! Rubric-weighted heuristic scoring over the raw text.
//!
//! Used directly when no remote judge is configured and as the fallback when
//! the remote path fails. Scoring is keyword presence, length, and structure
//! only, so it is fully deterministic.

use lineguard_core::text::contains_word;

use crate::evaluator::{EvaluationRequest, EvaluatorError, ExplanationEvaluator};
use crate::rubric::{JudgeVerdict, Rubric, RubricScores};

const JUSTIFICATION_KEYWORDS: &[&str] = &[
    "required",
    "requested",
    "needed",
    "necessary",
    "repair",
    "replace",
    "replacement",
    "safety",
    "emergency",
    "client",
    "contract",
    "code",
    "scheduled",
];

const UNIT_KEYWORDS: &[&str] = &[
    "mm", "cm", "ft", "inch", "gallon", "model", "serial", "sku", "quantity", "units",
];

const LOCATION_KEYWORDS: &[&str] = &["site", "building", "room", "floor", "basement", "roof"];

const WORK_KEYWORDS: &[&str] = &[
    "facility",
    "maintenance",
    "repair",
    "service",
    "installation",
    "equipment",
    "work",
];

const INAPPROPRIATE_KEYWORDS: &[&str] = &[
    "personal",
    "gift",
    "entertainment",
    "alcohol",
    "convenience",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

impl HeuristicEvaluator {
    fn score(text: &str) -> RubricScores {
        RubricScores {
            clarity: clarity(text),
            business_justification: business_justification(text),
            specificity: specificity(text),
            appropriateness: appropriateness(text),
        }
        .clamped()
    }
}

impl ExplanationEvaluator for HeuristicEvaluator {
    fn evaluate(&self, request: &EvaluationRequest) -> Result<JudgeVerdict, EvaluatorError> {
        let text = &request.explanation_text;
        let mut scores = Self::score(text);

        let mut prior_concerns_addressed = None;
        if let Rubric::Resubmission { prior_feedback } = &request.rubric {
            let addressed = addresses_prior_feedback(text, prior_feedback);
            if addressed {
                scores.business_justification = (scores.business_justification + 5).min(25);
            }
            prior_concerns_addressed = Some(addressed);
        }

        let total = scores.total();
        let accept_bar = request.rubric.accept_score();
        // More confident the further the total sits from the decision bar.
        let confidence =
            0.4 + (f64::from(total.abs_diff(accept_bar)) / 100.0).min(0.25);

        let mut verdict = JudgeVerdict::from_scores(scores, &request.rubric, confidence)
            .with_reasoning(reasoning(&scores, total));
        verdict.prior_concerns_addressed = prior_concerns_addressed;
        Ok(verdict)
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn clarity(text: &str) -> u8 {
    let words = word_count(text);
    let base = match words {
        0 => 0,
        1..=4 => 5,
        5..=14 => 12,
        15..=39 => 20,
        _ => 22,
    };
    let structure = if text.contains('.') { 3 } else { 0 };
    base + structure
}

fn business_justification(text: &str) -> u8 {
    let hits = JUSTIFICATION_KEYWORDS
        .iter()
        .filter(|k| contains_word(text, k))
        .count();
    match hits {
        0 => 4,
        1 => 12,
        2 => 18,
        _ => 25,
    }
}

fn specificity(text: &str) -> u8 {
    let mut score = 4u8;
    if text.chars().any(|c| c.is_ascii_digit()) {
        score += 8;
    }
    if UNIT_KEYWORDS.iter().any(|k| contains_word(text, k)) {
        score += 8;
    }
    if LOCATION_KEYWORDS.iter().any(|k| contains_word(text, k)) {
        score += 5;
    }
    score
}

fn appropriateness(text: &str) -> u8 {
    let mut score = 15u8;
    if INAPPROPRIATE_KEYWORDS.iter().any(|k| contains_word(text, k)) {
        score = score.saturating_sub(12);
    }
    if WORK_KEYWORDS.iter().any(|k| contains_word(text, k)) {
        score += 10;
    }
    score
}

/// Whether the new text engages with the prior feedback at all: any
/// substantive feedback word reappearing counts.
fn addresses_prior_feedback(text: &str, feedback: &str) -> bool {
    feedback
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .any(|w| contains_word(text, w))
}

fn reasoning(scores: &RubricScores, total: u8) -> String {
    format!(
        "Heuristic evaluation: clarity {}, business justification {}, specificity {}, appropriateness {} (total {}/100)",
        scores.clarity,
        scores.business_justification,
        scores.specificity,
        scores.appropriateness,
        total
    )
}
