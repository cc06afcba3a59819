//! Completion service port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CompletionRequest, CompletionResponse};

/// A language-model completion backend.
///
/// Implementations must honor `request.timeout_ms` and report expiry as
/// [`DomainError::CompletionTimeout`](crate::domain::errors::DomainError::CompletionTimeout).
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse>;
}
