//! Integration tests for the full validation pipeline.
//!
//! Ingest -> match -> price validation -> rules -> explanation -> verdict,
//! driven through the orchestrator and the batch schedulers over in-memory
//! stores.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lineguard_core::{CanonicalItemId, Currency, InvoiceId, LineItemId};
    use lineguard_events::{AuditEntry, EventBus, InMemoryEventBus};
    use lineguard_items::{EventPayload, LineItem, LineItemEvent, LineItemStatus};
    use lineguard_judge::{JudgeConfig, JudgeService};
    use lineguard_pricing::{PriceRange, PriceValidator};
    use lineguard_rules::RuleEngine;

    use crate::event_worker::EventWorker;
    use crate::orchestrator::{Orchestrator, Stores};
    use crate::scheduler::{
        BatchScheduler, BatchSchedulerConfig, BatchStage, ExplanationVerificationStage,
        PriceValidationStage,
    };
    use crate::store::{
        InMemoryExplanationStore, InMemoryLineItemStore, InMemoryObservationStore,
        InMemoryPriceRangeStore, InMemoryProposalStore, InMemoryValidationEventLog, LineItemStore,
        PriceRangeStore, ProposalStore, StoreError, ValidationEventLog,
    };

    type Bus = Arc<InMemoryEventBus<LineItemEvent>>;

    struct Harness {
        orchestrator: Arc<Orchestrator<Bus>>,
        bus: Bus,
        items: Arc<InMemoryLineItemStore>,
        ranges: Arc<InMemoryPriceRangeStore>,
        proposals: Arc<InMemoryProposalStore>,
        event_log: Arc<InMemoryValidationEventLog>,
    }

    fn setup() -> Harness {
        let items = Arc::new(InMemoryLineItemStore::new());
        let ranges = Arc::new(InMemoryPriceRangeStore::new());
        let observations = Arc::new(InMemoryObservationStore::new());
        let explanations = Arc::new(InMemoryExplanationStore::new());
        let proposals = Arc::new(InMemoryProposalStore::new());
        let event_log = Arc::new(InMemoryValidationEventLog::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());

        let stores = Stores {
            items: items.clone(),
            ranges: ranges.clone(),
            observations: observations.clone(),
            explanations: explanations.clone(),
            proposals: proposals.clone(),
            event_log: event_log.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(
            stores,
            bus.clone(),
            PriceValidator::default(),
            RuleEngine::default(),
            JudgeService::heuristic_only(JudgeConfig::default()),
        ));

        Harness {
            orchestrator,
            bus,
            items,
            ranges,
            proposals,
            event_log,
        }
    }

    fn seed_range(harness: &Harness, canonical: CanonicalItemId, min: f64, max: f64) {
        let range = PriceRange::new(canonical, Currency::usd(), min, max, "catalog")
            .expect("valid range");
        harness.ranges.upsert(&range).expect("upsert");
    }

    fn ingest_item(harness: &Harness, price: f64) -> LineItemId {
        let item = LineItem::new(InvoiceId::new(), "copper pipe", 2.0, price, Currency::usd())
            .expect("valid item");
        harness
            .orchestrator
            .ingest(item, false)
            .expect("ingest succeeds")
    }

    fn mark_matched(harness: &Harness, id: LineItemId, canonical: Option<CanonicalItemId>) {
        harness
            .orchestrator
            .handle(LineItemEvent::new(
                id,
                EventPayload::Matched {
                    canonical_item_id: canonical,
                    confidence: 0.95,
                },
            ))
            .expect("matched event applies");
    }

    fn run_price_stage(harness: &Harness) -> crate::scheduler::BatchSummary {
        let stage = Arc::new(PriceValidationStage::new(harness.orchestrator.clone()));
        let scheduler = BatchScheduler::new(
            stage,
            harness.items.clone() as Arc<dyn LineItemStore>,
            BatchSchedulerConfig::default().with_name("price-test"),
        );
        scheduler.run_once()
    }

    fn run_verification_stage(harness: &Harness) -> crate::scheduler::BatchSummary {
        let stage = Arc::new(ExplanationVerificationStage::new(
            harness.orchestrator.clone(),
        ));
        let scheduler = BatchScheduler::new(
            stage,
            harness.items.clone() as Arc<dyn LineItemStore>,
            BatchSchedulerConfig::default()
                .with_name("verify-test")
                .with_concurrency(crate::scheduler::EXPLANATION_VERIFICATION_CONCURRENCY),
        );
        scheduler.run_once()
    }

    fn status(harness: &Harness, id: LineItemId) -> LineItemStatus {
        harness
            .orchestrator
            .status(id)
            .expect("status query")
            .expect("item exists")
    }

    const GOOD_EXPLANATION: &str =
        "Replaced the failed shutoff valve on the roof of building 3. The client requested \
         an emergency repair and the replacement part was required to restore heating \
         service before the weekend.";

    #[test]
    fn clean_item_reaches_ready_for_submission() {
        let harness = setup();
        let canonical = CanonicalItemId::new();
        seed_range(&harness, canonical, 10.0, 20.0);

        let id = ingest_item(&harness, 15.0);
        assert_eq!(status(&harness, id), LineItemStatus::AwaitingMatch);

        mark_matched(&harness, id, Some(canonical));
        assert_eq!(status(&harness, id), LineItemStatus::Matched);

        let summary = run_price_stage(&harness);
        assert_eq!(status(&harness, id), LineItemStatus::ReadyForSubmission);
        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.allowed, 1);
        assert_eq!(summary.errored, 0);

        // Audit trail covers the whole journey in order.
        let log = harness.event_log.for_item(id).expect("audit log");
        let kinds: Vec<&str> = log
            .iter()
            .map(|e| e.payload().payload.event_type())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "QUEUED_FOR_MATCH",
                "MATCHED",
                "PRICE_VALIDATED",
                "READY_FOR_SUBMISSION"
            ]
        );
        let sequences: Vec<u64> = log.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[test]
    fn gross_overpricing_is_denied_terminally() {
        let harness = setup();
        let canonical = CanonicalItemId::new();
        seed_range(&harness, canonical, 10.0, 20.0);

        let id = ingest_item(&harness, 30.0); // exactly 150% of max
        mark_matched(&harness, id, Some(canonical));
        let summary = run_price_stage(&harness);

        assert_eq!(status(&harness, id), LineItemStatus::Denied);
        assert_eq!(summary.denied, 1);

        // Replaying an earlier event against the terminal state is a no-op.
        let outcome = harness
            .orchestrator
            .handle(LineItemEvent::new(
                id,
                EventPayload::Matched {
                    canonical_item_id: Some(canonical),
                    confidence: 0.95,
                },
            ))
            .expect("replay handled");
        assert_eq!(outcome, lineguard_items::Transition::Ignore);
        assert_eq!(status(&harness, id), LineItemStatus::Denied);
    }

    #[test]
    fn moderate_overpricing_yields_proposal_and_explanation_request() {
        let harness = setup();
        let canonical = CanonicalItemId::new();
        seed_range(&harness, canonical, 10.0, 20.0);

        let id = ingest_item(&harness, 25.0); // 25% over, below the deny bar
        mark_matched(&harness, id, Some(canonical));
        let summary = run_price_stage(&harness);

        assert_eq!(status(&harness, id), LineItemStatus::NeedsExplanation);
        assert_eq!(summary.needs_explanation, 1);
        let proposals = harness.proposals.list().expect("proposals");
        assert_eq!(proposals.len(), 1);
        assert!(proposals[0].suggested_range.max > 20.0);
    }

    #[test]
    fn unmatched_item_needs_explanation_then_accepts_good_one() {
        let harness = setup();

        let id = ingest_item(&harness, 15.0);
        mark_matched(&harness, id, None);
        run_price_stage(&harness);
        assert_eq!(status(&harness, id), LineItemStatus::NeedsExplanation);

        let (_, triggered) = harness
            .orchestrator
            .submit_explanation(id, GOOD_EXPLANATION, "tech-17")
            .expect("submission");
        assert!(triggered);
        assert_eq!(status(&harness, id), LineItemStatus::ExplanationSubmitted);

        run_verification_stage(&harness);
        assert_eq!(status(&harness, id), LineItemStatus::ReadyForSubmission);
    }

    #[test]
    fn worthless_explanation_is_denied() {
        let harness = setup();
        let id = ingest_item(&harness, 15.0);
        mark_matched(&harness, id, None);
        run_price_stage(&harness);

        harness
            .orchestrator
            .submit_explanation(id, "ok", "tech-17")
            .expect("submission");
        run_verification_stage(&harness);

        assert_eq!(status(&harness, id), LineItemStatus::Denied);
    }

    #[test]
    fn mediocre_explanation_loops_back_with_feedback() {
        let harness = setup();
        let id = ingest_item(&harness, 15.0);
        mark_matched(&harness, id, None);
        run_price_stage(&harness);

        harness
            .orchestrator
            .submit_explanation(id, "This was needed for the site.", "tech-17")
            .expect("submission");
        run_verification_stage(&harness);

        // Revision requested: back to needing an explanation, with the
        // verdict reasoning recorded as prior feedback.
        assert_eq!(status(&harness, id), LineItemStatus::NeedsExplanation);
        let feedback = harness
            .orchestrator
            .stores()
            .explanations
            .prior_feedback(id)
            .expect("feedback query");
        assert!(feedback.is_some());

        // A solid resubmission gets through.
        harness
            .orchestrator
            .submit_explanation(id, GOOD_EXPLANATION, "tech-17")
            .expect("resubmission");
        run_verification_stage(&harness);
        assert_eq!(status(&harness, id), LineItemStatus::ReadyForSubmission);
    }

    #[test]
    fn premature_explanation_is_not_stored() {
        let harness = setup();
        let id = ingest_item(&harness, 15.0);
        assert_eq!(status(&harness, id), LineItemStatus::AwaitingMatch);

        // Not waiting for an explanation: the event is ignored and the
        // verification stage must never see a pending row for this item.
        let (_, triggered) = harness
            .orchestrator
            .submit_explanation(id, GOOD_EXPLANATION, "tech-17")
            .expect("submission handled");
        assert!(!triggered);
        assert_eq!(status(&harness, id), LineItemStatus::AwaitingMatch);
        assert!(
            harness
                .orchestrator
                .stores()
                .explanations
                .latest_for_item(id)
                .expect("query")
                .is_none()
        );
    }

    #[test]
    fn failed_audit_append_blocks_the_transition() {
        struct FailingEventLog;

        impl ValidationEventLog for FailingEventLog {
            fn append(
                &self,
                _event: &LineItemEvent,
            ) -> Result<AuditEntry<LineItemEvent>, StoreError> {
                Err(StoreError::Backend("log unavailable".to_string()))
            }

            fn for_item(
                &self,
                _line_item_id: LineItemId,
            ) -> Result<Vec<AuditEntry<LineItemEvent>>, StoreError> {
                Ok(Vec::new())
            }
        }

        let items = Arc::new(InMemoryLineItemStore::new());
        let stores = Stores {
            items: items.clone(),
            ranges: Arc::new(InMemoryPriceRangeStore::new()),
            observations: Arc::new(InMemoryObservationStore::new()),
            explanations: Arc::new(InMemoryExplanationStore::new()),
            proposals: Arc::new(InMemoryProposalStore::new()),
            event_log: Arc::new(FailingEventLog),
        };
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let orchestrator = Orchestrator::new(
            stores,
            bus,
            PriceValidator::default(),
            RuleEngine::default(),
            JudgeService::heuristic_only(JudgeConfig::default()),
        );

        let item = LineItem::new(InvoiceId::new(), "copper pipe", 2.0, 15.0, Currency::usd())
            .expect("valid item");
        let id = item.line_item_id;
        items.insert(&item).expect("insert");

        let result = orchestrator.handle(LineItemEvent::new(id, EventPayload::QueuedForMatch));
        assert!(result.is_err());

        // The status must not advance when the trail cannot be written.
        let stored = items.get(id).expect("query").expect("item exists");
        assert_eq!(stored.status, LineItemStatus::New);
    }

    #[test]
    fn ingestion_branch_flows_through_the_bus() {
        let harness = setup();
        let subscription = harness.bus.subscribe();
        let worker = EventWorker::new(subscription, harness.orchestrator.clone());

        let item = LineItem::new(InvoiceId::new(), "hvac filter", 1.0, 9.5, Currency::usd())
            .expect("valid item");
        let id = harness
            .orchestrator
            .ingest(item, true)
            .expect("ingest succeeds");
        assert_eq!(status(&harness, id), LineItemStatus::AwaitingIngest);

        // The ingestion collaborator reports back over the bus.
        harness
            .bus
            .publish(LineItemEvent::new(
                id,
                EventPayload::WebIngested {
                    observations_found: 4,
                },
            ))
            .expect("publish");
        let stats = worker.drain();

        assert!(stats.events_applied >= 1);
        assert_eq!(status(&harness, id), LineItemStatus::AwaitingMatch);
    }

    #[test]
    fn one_failing_item_does_not_abort_the_batch() {
        struct FlakyStage {
            poison: LineItemId,
        }

        impl BatchStage for FlakyStage {
            fn pending_status(&self) -> LineItemStatus {
                LineItemStatus::New
            }

            fn process(&self, item: &LineItem) -> Result<(), String> {
                if item.line_item_id == self.poison {
                    Err("simulated failure".to_string())
                } else {
                    Ok(())
                }
            }
        }

        let items = Arc::new(InMemoryLineItemStore::new());
        let mut poison = None;
        for i in 0..3 {
            let item = LineItem::new(InvoiceId::new(), "widget", 1.0, 5.0, Currency::usd())
                .expect("valid item");
            if i == 1 {
                poison = Some(item.line_item_id);
            }
            items.insert(&item).expect("insert");
        }

        let scheduler = BatchScheduler::new(
            Arc::new(FlakyStage {
                poison: poison.expect("poison id"),
            }),
            items.clone() as Arc<dyn LineItemStore>,
            BatchSchedulerConfig::default().with_name("flaky-test"),
        );
        let summary = scheduler.run_once();

        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.errored, 1);
    }

    #[test]
    fn scheduler_releases_leases_after_the_batch() {
        let harness = setup();
        let canonical = CanonicalItemId::new();
        seed_range(&harness, canonical, 10.0, 20.0);

        let id = ingest_item(&harness, 15.0);
        mark_matched(&harness, id, Some(canonical));
        run_price_stage(&harness);

        let item = harness
            .orchestrator
            .item(id)
            .expect("query")
            .expect("item exists");
        assert!(item.lease.is_none());
    }
}
