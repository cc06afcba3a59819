//! Escalation repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Escalation, EscalationStatus};

/// Filter criteria for listing escalations.
#[derive(Debug, Clone, Default)]
pub struct EscalationFilter {
    pub outcome_id: Option<Uuid>,
    pub status: Option<EscalationStatus>,
    /// Only escalations created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Skip escalations already folded into an improvement outcome.
    pub exclude_incorporated: bool,
}

impl EscalationFilter {
    pub fn pending(outcome_id: Option<Uuid>) -> Self {
        Self {
            outcome_id,
            status: Some(EscalationStatus::Pending),
            ..Default::default()
        }
    }
}

/// Repository interface for Escalation persistence.
#[async_trait]
pub trait EscalationRepository: Send + Sync {
    /// Create a new escalation.
    async fn create(&self, escalation: &Escalation) -> DomainResult<()>;

    /// Get an escalation by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Escalation>>;

    /// Update an existing escalation.
    async fn update(&self, escalation: &Escalation) -> DomainResult<()>;

    /// List escalations, newest first.
    async fn list(&self, filter: EscalationFilter) -> DomainResult<Vec<Escalation>>;

    /// Count escalations matching a filter.
    async fn count(&self, filter: EscalationFilter) -> DomainResult<u64>;

    /// Stamp escalations as incorporated into `outcome_id`. Returns rows changed.
    async fn mark_incorporated(&self, ids: &[Uuid], outcome_id: Uuid) -> DomainResult<u64>;
}
