//! Observation repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Observation;

/// Repository interface for observations. Observations are never updated.
#[async_trait]
pub trait ObservationRepository: Send + Sync {
    /// Persist a new observation.
    async fn create(&self, observation: &Observation) -> DomainResult<()>;

    /// Get an observation by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Observation>>;

    /// Most recent observations of an outcome, newest first.
    async fn list_recent(&self, outcome_id: Uuid, limit: usize) -> DomainResult<Vec<Observation>>;

    /// Observations recorded for one task, newest first.
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Observation>>;
}
