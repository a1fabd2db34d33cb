//! The evaluator capability seam and the judge service.
//!
//! A remote judge (LLM or otherwise) and the local heuristic implement the
//! same trait; the service picks the rubric, delegates, and falls back to
//! the heuristic when the remote path fails, so a verdict always comes back.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use lineguard_core::LineItemId;

use crate::heuristic::HeuristicEvaluator;
use crate::rubric::{JudgeVerdict, Rubric, decide};

pub const DEFAULT_HIGH_VALUE_THRESHOLD: f64 = 5_000.0;

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluator timed out after {0:?}")]
    Timeout(Duration),
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
    #[error("malformed evaluator output: {0}")]
    Malformed(String),
}

/// One evaluation request. Cloneable so timeout wrappers can move it onto
/// a worker thread.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub line_item_id: LineItemId,
    pub item_name: String,
    pub total_value: f64,
    pub explanation_text: String,
    pub rubric: Rubric,
}

/// Capability interface: given text and a rubric, return a verdict. The
/// remote judge and the heuristic are interchangeable behind this.
pub trait ExplanationEvaluator: Send + Sync {
    fn evaluate(&self, request: &EvaluationRequest) -> Result<JudgeVerdict, EvaluatorError>;
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Total cost above which the stricter rubric applies.
    pub high_value_threshold: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            high_value_threshold: DEFAULT_HIGH_VALUE_THRESHOLD,
        }
    }
}

/// Verifies explanations. Owns the fallback policy: primary evaluator if
/// configured, heuristic otherwise or on primary failure.
pub struct JudgeService {
    primary: Option<Box<dyn ExplanationEvaluator>>,
    heuristic: HeuristicEvaluator,
    config: JudgeConfig,
}

impl JudgeService {
    /// Heuristic-only service (no remote judge configured).
    pub fn heuristic_only(config: JudgeConfig) -> Self {
        Self {
            primary: None,
            heuristic: HeuristicEvaluator,
            config,
        }
    }

    pub fn with_primary(primary: Box<dyn ExplanationEvaluator>, config: JudgeConfig) -> Self {
        Self {
            primary: Some(primary),
            heuristic: HeuristicEvaluator,
            config,
        }
    }

    /// Rubric selection: resubmissions answer prior feedback; otherwise the
    /// total cost decides between standard and high-value.
    pub fn select_rubric(&self, total_value: f64, prior_feedback: Option<&str>) -> Rubric {
        if let Some(feedback) = prior_feedback {
            return Rubric::Resubmission {
                prior_feedback: feedback.to_string(),
            };
        }
        if total_value > self.config.high_value_threshold {
            Rubric::HighValue
        } else {
            Rubric::Standard
        }
    }

    /// Evaluate an explanation. Never fails: the heuristic answers whenever
    /// the primary path cannot, with the verdict marked degraded.
    pub fn verify(
        &self,
        line_item_id: LineItemId,
        item_name: &str,
        total_value: f64,
        explanation_text: &str,
        prior_feedback: Option<&str>,
    ) -> JudgeVerdict {
        let rubric = self.select_rubric(total_value, prior_feedback);
        let request = EvaluationRequest {
            line_item_id,
            item_name: item_name.to_string(),
            total_value,
            explanation_text: explanation_text.to_string(),
            rubric: rubric.clone(),
        };

        if let Some(primary) = &self.primary {
            match primary.evaluate(&request) {
                Ok(verdict) => return sanitize(verdict, &rubric),
                Err(err) => {
                    warn!(
                        line_item_id = %line_item_id,
                        error = %err,
                        "primary evaluator failed; falling back to heuristic"
                    );
                    let mut verdict = self.heuristic_verdict(&request);
                    verdict.degraded = true;
                    return verdict;
                }
            }
        }
        self.heuristic_verdict(&request)
    }

    fn heuristic_verdict(&self, request: &EvaluationRequest) -> JudgeVerdict {
        match self.heuristic.evaluate(request) {
            Ok(verdict) => verdict,
            // The heuristic is infallible in practice; this arm is the
            // conservative floor if it ever stops being so.
            Err(err) => {
                warn!(error = %err, "heuristic evaluator failed");
                let scores = crate::rubric::RubricScores {
                    clarity: 0,
                    business_justification: 0,
                    specificity: 0,
                    appropriateness: 0,
                };
                let mut verdict = JudgeVerdict::from_scores(scores, &request.rubric, 0.1);
                verdict.degraded = true;
                verdict
                    .with_reasoning("Evaluation unavailable; explanation could not be verified")
            }
        }
    }
}

/// Re-derive the decision and clamp scores so a misbehaving remote judge
/// cannot smuggle an inconsistent verdict past the rubric.
fn sanitize(mut verdict: JudgeVerdict, rubric: &Rubric) -> JudgeVerdict {
    verdict.scores = verdict.scores.clamped();
    verdict.total_score = verdict.scores.total();
    verdict.decision = decide(verdict.total_score, rubric);
    verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{JudgeDecision, RubricScores};

    struct FixedEvaluator(Result<JudgeVerdict, &'static str>);

    impl ExplanationEvaluator for FixedEvaluator {
        fn evaluate(&self, request: &EvaluationRequest) -> Result<JudgeVerdict, EvaluatorError> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(msg) => {
                    let _ = request;
                    Err(EvaluatorError::Unavailable(msg.to_string()))
                }
            }
        }
    }

    fn verdict(total_per_score: u8, confidence: f64) -> JudgeVerdict {
        JudgeVerdict::from_scores(
            RubricScores {
                clarity: total_per_score,
                business_justification: total_per_score,
                specificity: total_per_score,
                appropriateness: total_per_score,
            },
            &Rubric::Standard,
            confidence,
        )
    }

    #[test]
    fn rubric_selection_by_value_and_feedback() {
        let service = JudgeService::heuristic_only(JudgeConfig::default());
        assert_eq!(service.select_rubric(100.0, None), Rubric::Standard);
        assert_eq!(service.select_rubric(5_000.0, None), Rubric::Standard);
        assert_eq!(service.select_rubric(5_000.01, None), Rubric::HighValue);
        assert!(matches!(
            service.select_rubric(9_999.0, Some("be specific")),
            Rubric::Resubmission { .. }
        ));
    }

    #[test]
    fn primary_verdict_is_used_when_it_succeeds() {
        let service = JudgeService::with_primary(
            Box::new(FixedEvaluator(Ok(verdict(20, 0.9)))),
            JudgeConfig::default(),
        );
        let v = service.verify(LineItemId::new(), "pipe", 100.0, "because reasons", None);
        assert_eq!(v.total_score, 80);
        assert_eq!(v.decision, JudgeDecision::Accept);
        assert!(!v.degraded);
    }

    #[test]
    fn primary_failure_falls_back_to_heuristic_and_marks_degraded() {
        let service = JudgeService::with_primary(
            Box::new(FixedEvaluator(Err("remote judge down"))),
            JudgeConfig::default(),
        );
        let v = service.verify(LineItemId::new(), "pipe", 100.0, "ok", None);
        assert!(v.degraded);
        // "ok" alone scores poorly under the heuristic.
        assert_eq!(v.decision, JudgeDecision::Reject);
    }

    #[test]
    fn sanitize_rederives_decision_under_the_active_rubric() {
        // Remote claims a standard-rubric Accept at 64, but the item is
        // high-value: the service must re-decide under the stricter bar.
        let service = JudgeService::with_primary(
            Box::new(FixedEvaluator(Ok(verdict(16, 2.0)))),
            JudgeConfig::default(),
        );
        let v = service.verify(LineItemId::new(), "chiller", 10_000.0, "text", None);
        assert_eq!(v.total_score, 64);
        assert_eq!(v.decision, JudgeDecision::NeedsRevision);
        assert!(v.confidence <= 1.0);
    }
}
