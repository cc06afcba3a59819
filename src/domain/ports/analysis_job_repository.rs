//! Analysis job repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AnalysisJob;

/// Repository interface for improvement-analysis jobs.
#[async_trait]
pub trait AnalysisJobRepository: Send + Sync {
    /// Create a new job record.
    async fn create(&self, job: &AnalysisJob) -> DomainResult<()>;

    /// Get a job by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<AnalysisJob>>;

    /// Persist the job's current state.
    async fn update(&self, job: &AnalysisJob) -> DomainResult<()>;

    /// Jobs that are `pending` or `running`, oldest first.
    async fn list_active(&self) -> DomainResult<Vec<AnalysisJob>>;

    /// Most recent jobs of any status, newest first.
    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<AnalysisJob>>;
}
