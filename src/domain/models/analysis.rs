//! Improvement analysis job model.
//!
//! A job tracks one background run that clusters escalations into
//! root-cause groups and proposes systemic fixes. Status only moves forward:
//! `pending -> running -> completed | failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Status of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending | Self::Running, Self::Failed)
                | (Self::Running, Self::Completed)
        )
    }
}

/// What an analysis run should look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Restrict to one outcome; `None` analyzes every outcome.
    pub outcome_id: Option<Uuid>,
    pub lookback_days: u32,
    pub max_proposals: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            outcome_id: None,
            lookback_days: 7,
            max_proposals: 5,
        }
    }
}

/// A group of escalations sharing a probable root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationCluster {
    pub key: String,
    pub trigger_type: String,
    pub keyword: Option<String>,
    pub root_cause: String,
    pub escalation_ids: Vec<Uuid>,
    pub outcome_ids: Vec<Uuid>,
    pub sample_questions: Vec<String>,
}

/// Category of systemic fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    /// Teach workers a reusable technique.
    Skill,
    /// Seed outcomes with missing context up front.
    Context,
    /// Change how work is planned or reviewed.
    Process,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skill => "skill",
            Self::Context => "context",
            Self::Process => "process",
        }
    }
}

/// A remediation proposal derived from one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementProposal {
    pub kind: ProposalKind,
    pub title: String,
    pub description: String,
    pub cluster_key: String,
    pub escalation_count: usize,
}

/// Serialized output of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    pub escalations_analyzed: usize,
    pub clusters: Vec<EscalationCluster>,
    pub proposals: Vec<ImprovementProposal>,
    pub summary: String,
}

/// One background improvement-analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub options: AnalysisOptions,
    pub progress: String,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(options: AnalysisOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            options,
            progress: "Queued".to_string(),
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: JobStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::ValidationFailed(format!(
                "analysis job {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start(&mut self) -> DomainResult<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(self.updated_at);
        self.progress = "Starting analysis".to_string();
        Ok(())
    }

    pub fn set_progress(&mut self, message: impl Into<String>) {
        self.progress = message.into();
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, result: AnalysisResult) -> DomainResult<()> {
        self.transition(JobStatus::Completed)?;
        self.completed_at = Some(self.updated_at);
        self.progress = result.summary.clone();
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.transition(JobStatus::Failed)?;
        self.completed_at = Some(self.updated_at);
        let error = error.into();
        self.progress = format!("Failed: {error}");
        self.error = Some(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut job = AnalysisJob::new(AnalysisOptions::default());
        assert!(job.status.is_active());
        job.start().unwrap();
        job.set_progress("Clustering");
        job.complete(AnalysisResult {
            summary: "done".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.status.is_active());
        assert_eq!(job.progress, "done");
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_transitions_are_one_directional() {
        let mut job = AnalysisJob::new(AnalysisOptions::default());
        assert!(job.complete(AnalysisResult::default()).is_err());
        job.start().unwrap();
        assert!(job.start().is_err());
        job.fail("boom").unwrap();
        assert!(job.start().is_err());
        assert!(job.fail("again").is_err());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_pending_can_fail() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
    }
}
