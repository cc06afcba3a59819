//! Context store repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ContextStore;

/// Repository interface for per-outcome context stores.
#[async_trait]
pub trait ContextStoreRepository: Send + Sync {
    /// Get the store of an outcome, if one was ever saved.
    async fn get(&self, outcome_id: Uuid) -> DomainResult<Option<ContextStore>>;

    /// Save the store if its `version` matches the persisted one.
    ///
    /// Returns the new version. A mismatch yields
    /// [`DomainError::ConcurrencyConflict`](crate::domain::errors::DomainError::ConcurrencyConflict).
    async fn save(&self, store: &ContextStore) -> DomainResult<u64>;
}
