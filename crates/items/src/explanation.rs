//! User-submitted justification and its verification lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::{DomainError, ExplanationId, LineItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub explanation_id: ExplanationId,
    pub line_item_id: LineItemId,
    pub text: String,
    pub submitted_by: String,
    pub status: VerificationStatus,
    pub clarity_score: Option<u8>,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Explanation {
    pub fn submit(
        line_item_id: LineItemId,
        text: impl Into<String>,
        submitted_by: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::validation("explanation text cannot be empty"));
        }
        Ok(Self {
            explanation_id: ExplanationId::new(),
            line_item_id,
            text,
            submitted_by: submitted_by.into(),
            status: VerificationStatus::Pending,
            clarity_score: None,
            rejection_reason: None,
            submitted_at: Utc::now(),
            verified_at: None,
        })
    }

    pub fn accept(&mut self, clarity_score: u8) {
        self.status = VerificationStatus::Accepted;
        self.clarity_score = Some(clarity_score);
        self.rejection_reason = None;
        self.verified_at = Some(Utc::now());
    }

    pub fn reject(&mut self, clarity_score: u8, reason: impl Into<String>) {
        self.status = VerificationStatus::Rejected;
        self.clarity_score = Some(clarity_score);
        self.rejection_reason = Some(reason.into());
        self.verified_at = Some(Utc::now());
    }

    pub fn is_verified(&self) -> bool {
        self.status != VerificationStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_starts_pending() {
        let exp = Explanation::submit(LineItemId::new(), "needed for repair", "tech-17")
            .expect("valid submission");
        assert_eq!(exp.status, VerificationStatus::Pending);
        assert!(!exp.is_verified());
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(Explanation::submit(LineItemId::new(), "   ", "tech-17").is_err());
    }

    #[test]
    fn rejection_records_reason_and_score() {
        let mut exp =
            Explanation::submit(LineItemId::new(), "because", "tech-17").expect("valid submission");
        exp.reject(12, "too vague");
        assert_eq!(exp.status, VerificationStatus::Rejected);
        assert_eq!(exp.clarity_score, Some(12));
        assert_eq!(exp.rejection_reason.as_deref(), Some("too vague"));
        assert!(exp.verified_at.is_some());
    }
}
