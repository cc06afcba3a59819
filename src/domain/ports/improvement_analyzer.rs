//! Improvement analysis port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Escalation, EscalationCluster, ImprovementProposal};

/// Clusters escalations into root-cause groups and proposes fixes.
#[async_trait]
pub trait ImprovementAnalyzer: Send + Sync {
    /// Group escalations that share a probable root cause.
    async fn cluster(&self, escalations: &[Escalation]) -> DomainResult<Vec<EscalationCluster>>;

    /// Derive at most `max_proposals` remediation proposals.
    async fn propose(
        &self,
        clusters: &[EscalationCluster],
        max_proposals: usize,
    ) -> DomainResult<Vec<ImprovementProposal>>;
}
