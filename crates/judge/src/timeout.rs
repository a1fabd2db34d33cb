//! Hard-timeout wrapper for evaluators that call out of process.
//!
//! The wrapped evaluator runs on its own thread; if it does not answer
//! within the deadline the caller gets `EvaluatorError::Timeout` and the
//! service's fallback path takes over. The stray thread finishes in the
//! background and its late result is dropped.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::evaluator::{EvaluationRequest, EvaluatorError, ExplanationEvaluator};
use crate::rubric::JudgeVerdict;

pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TimeoutEvaluator<E> {
    inner: Arc<E>,
    timeout: Duration,
}

impl<E> TimeoutEvaluator<E> {
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    pub fn with_default_timeout(inner: E) -> Self {
        Self::new(inner, DEFAULT_JUDGE_TIMEOUT)
    }
}

impl<E: ExplanationEvaluator + 'static> ExplanationEvaluator for TimeoutEvaluator<E> {
    fn evaluate(&self, request: &EvaluationRequest) -> Result<JudgeVerdict, EvaluatorError> {
        let (tx, rx) = mpsc::channel();
        let inner = self.inner.clone();
        let request = request.clone();

        thread::spawn(move || {
            let _ = tx.send(inner.evaluate(&request));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "evaluator missed its deadline");
                Err(EvaluatorError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::HeuristicEvaluator;
    use crate::rubric::Rubric;
    use lineguard_core::LineItemId;

    struct SlowEvaluator(Duration);

    impl ExplanationEvaluator for SlowEvaluator {
        fn evaluate(&self, request: &EvaluationRequest) -> Result<JudgeVerdict, EvaluatorError> {
            thread::sleep(self.0);
            HeuristicEvaluator.evaluate(request)
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            line_item_id: LineItemId::new(),
            item_name: "pipe".to_string(),
            total_value: 50.0,
            explanation_text: "Needed for the scheduled repair in building 2.".to_string(),
            rubric: Rubric::Standard,
        }
    }

    #[test]
    fn fast_evaluator_passes_through() {
        let evaluator = TimeoutEvaluator::new(SlowEvaluator(Duration::ZERO), Duration::from_secs(2));
        assert!(evaluator.evaluate(&request()).is_ok());
    }

    #[test]
    fn slow_evaluator_times_out() {
        let evaluator = TimeoutEvaluator::new(
            SlowEvaluator(Duration::from_millis(500)),
            Duration::from_millis(20),
        );
        match evaluator.evaluate(&request()) {
            Err(EvaluatorError::Timeout(_)) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
