//! Scoring rubric and verdict types.
//!
//! Every evaluation path (remote judge capability or local heuristics)
//! produces the same schema, so callers never know which path ran.

use serde::{Deserialize, Serialize};

/// Accept bar under the standard rubric.
pub const STANDARD_ACCEPT_SCORE: u8 = 60;
/// Accept bar for high-value items.
pub const HIGH_VALUE_ACCEPT_SCORE: u8 = 75;
/// Below this the explanation is rejected outright under every rubric.
pub const REJECT_BELOW_SCORE: u8 = 40;
/// Each sub-score contributes at most this much.
pub const SUB_SCORE_MAX: u8 = 25;

/// Which rubric governs an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rubric {
    /// Default thresholds.
    Standard,
    /// Stricter bar for items whose total cost crosses the high-value line.
    HighValue,
    /// A resubmission answering specific prior feedback. Acceptance bar is
    /// the standard one, but the verdict additionally reports whether the
    /// prior concerns were addressed.
    Resubmission { prior_feedback: String },
}

impl Rubric {
    pub fn accept_score(&self) -> u8 {
        match self {
            Rubric::HighValue => HIGH_VALUE_ACCEPT_SCORE,
            Rubric::Standard | Rubric::Resubmission { .. } => STANDARD_ACCEPT_SCORE,
        }
    }
}

/// Four named sub-scores, each in [0, 25].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricScores {
    pub clarity: u8,
    pub business_justification: u8,
    pub specificity: u8,
    pub appropriateness: u8,
}

impl RubricScores {
    /// Clamp every sub-score into [0, 25].
    pub fn clamped(self) -> Self {
        Self {
            clarity: self.clarity.min(SUB_SCORE_MAX),
            business_justification: self.business_justification.min(SUB_SCORE_MAX),
            specificity: self.specificity.min(SUB_SCORE_MAX),
            appropriateness: self.appropriateness.min(SUB_SCORE_MAX),
        }
    }

    /// Total in [0, 100].
    pub fn total(&self) -> u8 {
        let s = self.clamped();
        s.clarity + s.business_justification + s.specificity + s.appropriateness
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JudgeDecision {
    Accept,
    NeedsRevision,
    Reject,
}

/// Map a total score onto a decision under a rubric.
pub fn decide(total: u8, rubric: &Rubric) -> JudgeDecision {
    if total >= rubric.accept_score() {
        JudgeDecision::Accept
    } else if total >= REJECT_BELOW_SCORE {
        JudgeDecision::NeedsRevision
    } else {
        JudgeDecision::Reject
    }
}

/// Structured evaluation result. Identical for every evaluation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub decision: JudgeDecision,
    pub scores: RubricScores,
    pub total_score: u8,
    /// In [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    /// Only populated under the resubmission rubric.
    pub prior_concerns_addressed: Option<bool>,
    /// True when the remote judge path failed and a heuristic answered.
    pub degraded: bool,
}

impl JudgeVerdict {
    pub fn from_scores(scores: RubricScores, rubric: &Rubric, confidence: f64) -> Self {
        let scores = scores.clamped();
        let total = scores.total();
        Self {
            decision: decide(total, rubric),
            scores,
            total_score: total,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: String::new(),
            prior_concerns_addressed: None,
            degraded: false,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(total: u8) -> RubricScores {
        // Spread a target total over the four sub-scores.
        let q = total / 4;
        RubricScores {
            clarity: q + (total - q * 4),
            business_justification: q,
            specificity: q,
            appropriateness: q,
        }
    }

    #[test]
    fn standard_thresholds() {
        assert_eq!(decide(85, &Rubric::Standard), JudgeDecision::Accept);
        assert_eq!(decide(60, &Rubric::Standard), JudgeDecision::Accept);
        assert_eq!(decide(59, &Rubric::Standard), JudgeDecision::NeedsRevision);
        assert_eq!(decide(40, &Rubric::Standard), JudgeDecision::NeedsRevision);
        assert_eq!(decide(39, &Rubric::Standard), JudgeDecision::Reject);
    }

    #[test]
    fn high_value_raises_the_accept_bar() {
        assert_eq!(decide(74, &Rubric::HighValue), JudgeDecision::NeedsRevision);
        assert_eq!(decide(75, &Rubric::HighValue), JudgeDecision::Accept);
        // Reject floor is unchanged.
        assert_eq!(decide(39, &Rubric::HighValue), JudgeDecision::Reject);
    }

    #[test]
    fn resubmission_uses_the_standard_bar() {
        let rubric = Rubric::Resubmission {
            prior_feedback: "be specific".to_string(),
        };
        assert_eq!(decide(60, &rubric), JudgeDecision::Accept);
    }

    #[test]
    fn sub_scores_are_clamped_before_totaling() {
        let s = RubricScores {
            clarity: 40,
            business_justification: 25,
            specificity: 25,
            appropriateness: 25,
        };
        assert_eq!(s.total(), 100);
    }

    #[test]
    fn verdict_derives_decision_from_total() {
        let v = JudgeVerdict::from_scores(scores(64), &Rubric::Standard, 1.2);
        assert_eq!(v.decision, JudgeDecision::Accept);
        assert_eq!(v.total_score, 64);
        assert!((v.confidence - 1.0).abs() < 1e-9);
    }
}
