//! The orchestrator: the single entry point for domain events.
//!
//! Applies events to line items through the pure transition function,
//! persists the result, appends to the audit log, publishes on the bus, and
//! fires the downstream engine a transition calls for. Event application is
//! idempotent end to end: an ignored event changes nothing and appends
//! nothing.
//!
//! Engine wiring per transition:
//! - `WEB_INGESTED` queues the item for matching.
//! - `PRICE_VALIDATED` runs the rule engine and feeds its decision back in
//!   as `READY_FOR_SUBMISSION`, `NEEDS_EXPLANATION`, or `DENIED`.
//! - `EXPLANATION_SUBMITTED` leaves the item for the verification scheduler,
//!   which owns the judge timeout and concurrency window.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use lineguard_core::{DomainError, ExplanationId, LineItemId};
use lineguard_events::EventBus;
use lineguard_items::{
    EventPayload, Explanation, LineItem, LineItemEvent, LineItemStatus, PriceCheckSummary,
    Transition,
};
use lineguard_judge::{JudgeDecision, JudgeService, JudgeVerdict};
use lineguard_pricing::{PriceCheck, PriceValidator, PriceVerdict};
use lineguard_rules::{RangeSnapshot, RuleDecision, RuleEngine};

use crate::store::{
    ExplanationStore, LineItemStore, ObservationStore, PriceRangeStore, ProposalStore, StoreError,
    ValidationEventLog,
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("unknown line item {0}")]
    UnknownItem(LineItemId),
    #[error("line item {0} has no explanation to verify")]
    NoExplanation(LineItemId),
}

/// Durable state handles, grouped so the orchestrator constructor stays
/// readable.
pub struct Stores {
    pub items: Arc<dyn LineItemStore>,
    pub ranges: Arc<dyn PriceRangeStore>,
    pub observations: Arc<dyn ObservationStore>,
    pub explanations: Arc<dyn ExplanationStore>,
    pub proposals: Arc<dyn ProposalStore>,
    pub event_log: Arc<dyn ValidationEventLog>,
}

pub struct Orchestrator<B> {
    stores: Stores,
    bus: B,
    price_validator: PriceValidator,
    rule_engine: RuleEngine,
    judge: JudgeService,
}

impl<B> Orchestrator<B>
where
    B: EventBus<LineItemEvent>,
{
    pub fn new(
        stores: Stores,
        bus: B,
        price_validator: PriceValidator,
        rule_engine: RuleEngine,
        judge: JudgeService,
    ) -> Self {
        Self {
            stores,
            bus,
            price_validator,
            rule_engine,
            judge,
        }
    }

    /// Register a freshly ingested item and queue it. Items with no vendor
    /// price data yet go through the ingestion branch first.
    pub fn ingest(
        &self,
        item: LineItem,
        needs_web_ingest: bool,
    ) -> Result<LineItemId, OrchestratorError> {
        let id = item.line_item_id;
        self.stores.items.insert(&item)?;
        let payload = if needs_web_ingest {
            EventPayload::QueuedForIngest
        } else {
            EventPayload::QueuedForMatch
        };
        self.handle(LineItemEvent::new(id, payload))?;
        Ok(id)
    }

    /// Apply one domain event. Returns how the status reacted; `Ignore`
    /// means the event was a duplicate or out of order and nothing changed.
    pub fn handle(&self, event: LineItemEvent) -> Result<Transition, OrchestratorError> {
        let mut item = self
            .stores
            .items
            .get(event.line_item_id)?
            .ok_or(OrchestratorError::UnknownItem(event.line_item_id))?;

        let outcome = item.apply(&event)?;
        let Transition::Advance(next) = outcome else {
            debug!(
                line_item_id = %event.line_item_id,
                event = event.payload.event_type(),
                status = %item.status,
                "event ignored"
            );
            return Ok(outcome);
        };

        // Audit first: an item must never advance without a trail entry. If
        // the update then fails the item stays put and the event can be
        // redelivered; the log tolerates the duplicate entry.
        self.stores.event_log.append(&event)?;
        self.stores.items.update(&item)?;
        if let Err(err) = self.bus.publish(event.clone()) {
            // The audit log is already written; subscribers catch up from it.
            warn!(line_item_id = %event.line_item_id, error = ?err, "event publish failed");
        }
        info!(
            line_item_id = %event.line_item_id,
            event = event.payload.event_type(),
            status = %next,
            "line item advanced"
        );

        match &event.payload {
            EventPayload::WebIngested { .. } => {
                self.handle(LineItemEvent::new(item.line_item_id, EventPayload::QueuedForMatch))?;
            }
            EventPayload::PriceValidated(summary) => {
                self.run_rules(&item, summary)?;
            }
            EventPayload::NeedsExplanation { prompt, .. } => {
                info!(line_item_id = %item.line_item_id, prompt, "explanation requested");
            }
            _ => {}
        }

        Ok(outcome)
    }

    /// Price-validate a matched item and feed the result back in as a
    /// `PRICE_VALIDATED` event. Called by the price scheduler.
    pub fn validate_price(
        &self,
        line_item_id: LineItemId,
    ) -> Result<PriceCheckSummary, OrchestratorError> {
        let item = self
            .stores
            .items
            .get(line_item_id)?
            .ok_or(OrchestratorError::UnknownItem(line_item_id))?;

        let check = PriceCheck {
            line_item_id,
            canonical_item_id: item.canonical_item_id,
            raw_name: item.raw_name.clone(),
            unit_price: item.unit_price,
            currency: item.currency.clone(),
        };
        let range = match item.canonical_item_id {
            Some(canonical) => self.stores.ranges.get(canonical, &item.currency)?,
            None => None,
        };
        let observations = self.stores.observations.all()?;

        let verdict = self
            .price_validator
            .validate(&check, range.as_ref(), &observations, Utc::now());
        if let Some(proposal) = &verdict.proposal {
            self.stores.proposals.insert(proposal)?;
            info!(
                line_item_id = %line_item_id,
                proposal_id = %proposal.proposal_id,
                "range adjustment proposed"
            );
        }

        let summary = summarize(&verdict);
        self.handle(LineItemEvent::new(
            line_item_id,
            EventPayload::PriceValidated(summary.clone()),
        ))?;
        Ok(summary)
    }

    /// Record a user explanation and queue it for verification. The bool
    /// reports whether verification was actually triggered; false means the
    /// item was not waiting for an explanation and nothing was stored.
    pub fn submit_explanation(
        &self,
        line_item_id: LineItemId,
        text: &str,
        submitted_by: &str,
    ) -> Result<(ExplanationId, bool), OrchestratorError> {
        let explanation = Explanation::submit(line_item_id, text, submitted_by)?;

        let outcome = self.handle(LineItemEvent::new(
            line_item_id,
            EventPayload::ExplanationSubmitted {
                explanation_id: explanation.explanation_id,
            },
        ))?;
        let Transition::Advance(_) = outcome else {
            return Ok((explanation.explanation_id, false));
        };

        self.stores.explanations.insert(&explanation)?;
        Ok((explanation.explanation_id, true))
    }

    /// Judge the latest explanation of an item and translate the verdict
    /// back into a domain event. Called by the verification scheduler.
    pub fn verify_explanation(
        &self,
        line_item_id: LineItemId,
    ) -> Result<JudgeVerdict, OrchestratorError> {
        let item = self
            .stores
            .items
            .get(line_item_id)?
            .ok_or(OrchestratorError::UnknownItem(line_item_id))?;
        let mut explanation = self
            .stores
            .explanations
            .latest_for_item(line_item_id)?
            .ok_or(OrchestratorError::NoExplanation(line_item_id))?;
        let prior_feedback = self.stores.explanations.prior_feedback(line_item_id)?;

        let verdict = self.judge.verify(
            line_item_id,
            &item.raw_name,
            item.total_value(),
            &explanation.text,
            prior_feedback.as_deref(),
        );

        let payload = match verdict.decision {
            JudgeDecision::Accept => {
                explanation.accept(verdict.scores.clarity);
                EventPayload::ReadyForSubmission
            }
            JudgeDecision::Reject => {
                explanation.reject(verdict.scores.clarity, verdict.reasoning.clone());
                EventPayload::Denied {
                    reasons: vec![verdict.reasoning.clone()],
                    policy_codes: Vec::new(),
                }
            }
            JudgeDecision::NeedsRevision => {
                // Rejected-with-feedback: the reason becomes the prior
                // feedback for the resubmission rubric.
                explanation.reject(verdict.scores.clarity, verdict.reasoning.clone());
                EventPayload::NeedsExplanation {
                    prompt: verdict.reasoning.clone(),
                    policy_codes: Vec::new(),
                }
            }
        };
        self.stores.explanations.update(&explanation)?;
        self.handle(LineItemEvent::new(line_item_id, payload))?;
        Ok(verdict)
    }

    /// Translate a rule evaluation into the item's next event. An allowed
    /// item whose price check was not acceptable still needs an explanation.
    fn run_rules(
        &self,
        item: &LineItem,
        summary: &PriceCheckSummary,
    ) -> Result<(), OrchestratorError> {
        let range = match item.canonical_item_id {
            Some(canonical) => self.stores.ranges.get(canonical, &item.currency)?,
            None => None,
        };
        let snapshot = range.map(|r| RangeSnapshot {
            min: r.min_price,
            max: r.max_price,
        });
        let result = self.rule_engine.evaluate(&item.rule_context(snapshot));

        let payload = match result.decision {
            RuleDecision::Deny => EventPayload::Denied {
                reasons: result.reasons,
                policy_codes: result.policy_codes,
            },
            RuleDecision::NeedsExplanation => EventPayload::NeedsExplanation {
                prompt: result
                    .explanation_prompt
                    .unwrap_or_else(|| "Please justify this purchase.".to_string()),
                policy_codes: result.policy_codes,
            },
            RuleDecision::Allow if !summary.accepted => EventPayload::NeedsExplanation {
                prompt: format!(
                    "The unit price {:.2} {} could not be confirmed as plausible. \
                     Please explain how it was arrived at.",
                    item.unit_price, item.currency
                ),
                policy_codes: result.policy_codes,
            },
            RuleDecision::Allow => EventPayload::ReadyForSubmission,
        };
        self.handle(LineItemEvent::new(item.line_item_id, payload))?;
        Ok(())
    }

    pub fn item(&self, id: LineItemId) -> Result<Option<LineItem>, OrchestratorError> {
        Ok(self.stores.items.get(id)?)
    }

    pub fn status(&self, id: LineItemId) -> Result<Option<LineItemStatus>, OrchestratorError> {
        Ok(self.stores.items.get(id)?.map(|i| i.status))
    }

    pub(crate) fn stores(&self) -> &Stores {
        &self.stores
    }
}

fn summarize(verdict: &PriceVerdict) -> PriceCheckSummary {
    PriceCheckSummary {
        valid: verdict.valid,
        accepted: verdict.is_acceptable(),
        method: verdict.method,
        confidence: verdict.confidence,
        expected_range: verdict.expected_range,
        variance_pct: verdict.variance_pct,
        sample_size: verdict.sample_size,
        proposal_id: verdict.proposal.as_ref().map(|p| p.proposal_id),
    }
}
