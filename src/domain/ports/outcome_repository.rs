//! Outcome repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Outcome, OutcomeStatus};

/// Repository interface for Outcome persistence.
#[async_trait]
pub trait OutcomeRepository: Send + Sync {
    /// Create a new outcome.
    async fn create(&self, outcome: &Outcome) -> DomainResult<()>;

    /// Get an outcome by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Outcome>>;

    /// Update an existing outcome.
    async fn update(&self, outcome: &Outcome) -> DomainResult<()>;

    /// List outcomes, optionally restricted to one status.
    async fn list(&self, status: Option<OutcomeStatus>) -> DomainResult<Vec<Outcome>>;
}
