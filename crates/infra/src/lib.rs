//! Infrastructure layer: stores, orchestrator wiring, schedulers, workers.

pub mod event_worker;
pub mod orchestrator;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use event_worker::{EventWorker, EventWorkerHandle, EventWorkerStats};
pub use orchestrator::{Orchestrator, OrchestratorError, Stores};
pub use scheduler::{
    BatchScheduler, BatchSchedulerConfig, BatchStage, BatchSummary,
    EXPLANATION_VERIFICATION_CONCURRENCY, ExplanationVerificationStage,
    PRICE_VALIDATION_CONCURRENCY, PriceValidationStage, SchedulerHandle, SchedulerStats,
};
pub use store::StoreError;
