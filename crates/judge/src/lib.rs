//! `lineguard-judge` — explanation verification.
//!
//! Scores a free-text justification against a rubric (clarity, business
//! justification, specificity, appropriateness; each 0 to 25) and returns
//! ACCEPT, NEEDS_REVISION, or REJECT. The scorer is a capability seam: a
//! remote judge and a local heuristic are interchangeable, and the service
//! always degrades to the heuristic rather than failing a request.

pub mod evaluator;
pub mod heuristic;
pub mod rubric;
pub mod timeout;

pub use evaluator::{
    EvaluationRequest, EvaluatorError, ExplanationEvaluator, JudgeConfig, JudgeService,
};
pub use heuristic::HeuristicEvaluator;
pub use rubric::{JudgeDecision, JudgeVerdict, Rubric, RubricScores};
pub use timeout::{DEFAULT_JUDGE_TIMEOUT, TimeoutEvaluator};
