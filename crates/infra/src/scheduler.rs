//! Bounded-concurrency batch schedulers.
//!
//! A scheduler claims a page of items in one status (acquiring each item's
//! processing lease), runs its stage over them with a fixed concurrency
//! window, and releases every lease on the way out. A failure in one item
//! never aborts the batch; it is counted and logged, and the item becomes
//! eligible again once its lease is released.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info};

use lineguard_core::WorkerId;
use lineguard_events::EventBus;
use lineguard_items::{LineItem, LineItemEvent, LineItemStatus};

use crate::orchestrator::Orchestrator;
use crate::store::LineItemStore;

/// Observed defaults for the two pipeline stages.
pub const PRICE_VALIDATION_CONCURRENCY: usize = 5;
pub const EXPLANATION_VERIFICATION_CONCURRENCY: usize = 3;

/// One stage of the pipeline, drivable by a [`BatchScheduler`].
pub trait BatchStage: Send + Sync + 'static {
    /// Status of the items this stage pulls.
    fn pending_status(&self) -> LineItemStatus;

    /// Process one claimed item. Errors are reported per item and isolated
    /// from the rest of the batch.
    fn process(&self, item: &LineItem) -> Result<(), String>;
}

/// Price validation stage: pulls `MATCHED` items.
pub struct PriceValidationStage<B> {
    orchestrator: Arc<Orchestrator<B>>,
}

impl<B> PriceValidationStage<B> {
    pub fn new(orchestrator: Arc<Orchestrator<B>>) -> Self {
        Self { orchestrator }
    }
}

impl<B> BatchStage for PriceValidationStage<B>
where
    B: EventBus<LineItemEvent> + 'static,
{
    fn pending_status(&self) -> LineItemStatus {
        LineItemStatus::Matched
    }

    fn process(&self, item: &LineItem) -> Result<(), String> {
        self.orchestrator
            .validate_price(item.line_item_id)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Explanation verification stage: pulls `EXPLANATION_SUBMITTED` items.
pub struct ExplanationVerificationStage<B> {
    orchestrator: Arc<Orchestrator<B>>,
}

impl<B> ExplanationVerificationStage<B> {
    pub fn new(orchestrator: Arc<Orchestrator<B>>) -> Self {
        Self { orchestrator }
    }
}

impl<B> BatchStage for ExplanationVerificationStage<B>
where
    B: EventBus<LineItemEvent> + 'static,
{
    fn pending_status(&self) -> LineItemStatus {
        LineItemStatus::ExplanationSubmitted
    }

    fn process(&self, item: &LineItem) -> Result<(), String> {
        self.orchestrator
            .verify_explanation(item.line_item_id)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct BatchSchedulerConfig {
    pub name: String,
    /// How often to poll when no work is pending.
    pub poll_interval: Duration,
    /// Page size pulled per batch.
    pub batch_size: usize,
    /// Concurrency window within a batch.
    pub concurrency: usize,
    /// Pause between consecutive non-empty batches.
    pub inter_batch_delay: Duration,
}

impl Default for BatchSchedulerConfig {
    fn default() -> Self {
        Self {
            name: "batch-scheduler".to_string(),
            poll_interval: Duration::from_millis(100),
            batch_size: 20,
            concurrency: PRICE_VALIDATION_CONCURRENCY,
            inter_batch_delay: Duration::from_millis(50),
        }
    }
}

impl BatchSchedulerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Per-batch outcome counts. The decision buckets reflect the status each
/// successfully processed item landed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchSummary {
    pub claimed: usize,
    pub succeeded: usize,
    pub errored: usize,
    pub allowed: usize,
    pub denied: usize,
    pub needs_explanation: usize,
}

/// Cumulative scheduler statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStats {
    pub batches: u64,
    pub items_processed: u64,
    pub items_succeeded: u64,
    pub items_errored: u64,
    pub uptime_secs: u64,
}

/// Handle to control a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl SchedulerHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub struct BatchScheduler<S> {
    stage: Arc<S>,
    items: Arc<dyn LineItemStore>,
    worker: WorkerId,
    config: BatchSchedulerConfig,
}

impl<S: BatchStage> BatchScheduler<S> {
    pub fn new(stage: Arc<S>, items: Arc<dyn LineItemStore>, config: BatchSchedulerConfig) -> Self {
        Self {
            stage,
            items,
            worker: WorkerId::new(),
            config,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker
    }

    /// Claim and process one batch synchronously. Used by tests and by the
    /// background loop alike.
    pub fn run_once(&self) -> BatchSummary {
        let now = Utc::now();
        let batch = match self.items.claim_batch(
            self.stage.pending_status(),
            self.worker,
            now,
            self.config.batch_size,
        ) {
            Ok(batch) => batch,
            Err(err) => {
                error!(scheduler = %self.config.name, error = %err, "failed to claim batch");
                return BatchSummary::default();
            }
        };
        if batch.is_empty() {
            return BatchSummary::default();
        }

        let mut summary = BatchSummary {
            claimed: batch.len(),
            ..BatchSummary::default()
        };
        let outcomes = Mutex::new(Vec::with_capacity(batch.len()));

        // Fixed concurrency window: at most `concurrency` items in flight.
        for window in batch.chunks(self.config.concurrency.max(1)) {
            thread::scope(|scope| {
                for item in window {
                    let stage = Arc::clone(&self.stage);
                    let outcomes = &outcomes;
                    scope.spawn(move || {
                        let result = stage.process(item);
                        if let Ok(mut o) = outcomes.lock() {
                            o.push((item.line_item_id, result));
                        }
                    });
                }
            });
        }

        for (id, result) in outcomes.into_inner().unwrap_or_default() {
            match result {
                Ok(()) => {
                    summary.succeeded += 1;
                    if let Ok(Some(item)) = self.items.get(id) {
                        match item.status {
                            LineItemStatus::ReadyForSubmission => summary.allowed += 1,
                            LineItemStatus::Denied => summary.denied += 1,
                            LineItemStatus::NeedsExplanation => summary.needs_explanation += 1,
                            _ => {}
                        }
                    }
                }
                Err(err) => {
                    summary.errored += 1;
                    error!(
                        scheduler = %self.config.name,
                        line_item_id = %id,
                        error = %err,
                        "item processing failed"
                    );
                }
            }
            if let Err(err) = self.items.release_lease(id, self.worker) {
                error!(
                    scheduler = %self.config.name,
                    line_item_id = %id,
                    error = %err,
                    "lease release failed"
                );
            }
        }

        info!(
            scheduler = %self.config.name,
            claimed = summary.claimed,
            succeeded = summary.succeeded,
            errored = summary.errored,
            allowed = summary.allowed,
            denied = summary.denied,
            needs_explanation = summary.needs_explanation,
            "batch complete"
        );
        summary
    }

    /// Spawn the polling loop in a background thread.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let stats_clone = Arc::clone(&stats);

        let name = self.config.name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || scheduler_loop(self, shutdown_rx, stats_clone))
            .expect("failed to spawn scheduler thread");

        SchedulerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn scheduler_loop<S: BatchStage>(
    scheduler: BatchScheduler<S>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    info!(scheduler = %scheduler.config.name, "scheduler started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let summary = scheduler.run_once();

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
            if summary.claimed > 0 {
                s.batches += 1;
                s.items_processed += summary.claimed as u64;
                s.items_succeeded += summary.succeeded as u64;
                s.items_errored += summary.errored as u64;
            }
        }

        if summary.claimed == 0 {
            thread::sleep(scheduler.config.poll_interval);
        } else {
            debug!(scheduler = %scheduler.config.name, "batch pause");
            thread::sleep(scheduler.config.inter_batch_delay);
        }
    }

    info!(scheduler = %scheduler.config.name, "scheduler stopped");
}
