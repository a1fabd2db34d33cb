//! Bus-fed event worker.
//!
//! External collaborators (the ingestion crawler, API callers) publish
//! domain events onto a bus rather than calling the orchestrator directly.
//! This worker drains a subscription and applies each event. Delivery is
//! at-least-once, which is safe because event application is idempotent.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use lineguard_events::{EventBus, Subscription};
use lineguard_items::{LineItemEvent, Transition};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EventWorkerStats {
    pub events_applied: u64,
    pub events_ignored: u64,
    pub events_failed: u64,
}

#[derive(Debug)]
pub struct EventWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<EventWorkerStats>>,
}

impl EventWorkerHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> EventWorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub struct EventWorker<B> {
    subscription: Subscription<LineItemEvent>,
    orchestrator: Arc<Orchestrator<B>>,
}

impl<B> EventWorker<B>
where
    B: EventBus<LineItemEvent> + 'static,
{
    pub fn new(
        subscription: Subscription<LineItemEvent>,
        orchestrator: Arc<Orchestrator<B>>,
    ) -> Self {
        Self {
            subscription,
            orchestrator,
        }
    }

    /// Drain any currently queued events without blocking. Used by tests.
    pub fn drain(&self) -> EventWorkerStats {
        let mut stats = EventWorkerStats::default();
        while let Ok(event) = self.subscription.try_recv() {
            apply(&self.orchestrator, event, &mut stats);
        }
        stats
    }

    pub fn spawn(self, name: impl Into<String>) -> EventWorkerHandle {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(EventWorkerStats::default()));
        let stats_clone = Arc::clone(&stats);

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!(worker = %name, "event worker started");
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    match self.subscription.recv_timeout(Duration::from_millis(100)) {
                        Ok(event) => {
                            if let Ok(mut s) = stats_clone.lock() {
                                apply(&self.orchestrator, event, &mut s);
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(worker = %name, "event worker stopped");
            })
            .expect("failed to spawn event worker thread");

        EventWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn apply<B>(orchestrator: &Orchestrator<B>, event: LineItemEvent, stats: &mut EventWorkerStats)
where
    B: EventBus<LineItemEvent>,
{
    let event_type = event.payload.event_type();
    let line_item_id = event.line_item_id;
    match orchestrator.handle(event) {
        Ok(Transition::Advance(_)) => stats.events_applied += 1,
        Ok(Transition::Ignore) => stats.events_ignored += 1,
        Err(err) => {
            stats.events_failed += 1;
            error!(
                line_item_id = %line_item_id,
                event = event_type,
                error = %err,
                "event application failed"
            );
        }
    }
}
