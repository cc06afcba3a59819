//! Task decomposition port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DecompositionResult, Task};

/// Splits a task into smaller subtasks that carry its work forward.
#[async_trait]
pub trait TaskDecomposer: Send + Sync {
    async fn decompose(
        &self,
        task: &Task,
        outcome_intent: &str,
        outcome_approach: Option<&str>,
    ) -> DomainResult<DecompositionResult>;
}
