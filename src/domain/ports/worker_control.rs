//! Worker control port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Worker;

/// Control over the worker fleet.
#[async_trait]
pub trait WorkerControl: Send + Sync {
    /// Pause one worker.
    async fn pause_worker(&self, worker_id: &str) -> DomainResult<()>;

    /// Workers of an outcome that are idle or working.
    async fn active_workers_by_outcome(&self, outcome_id: Uuid) -> DomainResult<Vec<Worker>>;
}
