//! Domain errors for the HOMR supervision engine.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur in the supervision engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Outcome not found: {0}")]
    OutcomeNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Escalation not found: {0}")]
    EscalationNotFound(Uuid),

    #[error("Analysis job not found: {0}")]
    AnalysisJobNotFound(Uuid),

    #[error("Task {0} cannot depend on itself")]
    SelfDependency(Uuid),

    #[error("Tasks {dependent} and {dependency} belong to different outcomes")]
    CrossOutcomeDependency { dependent: Uuid, dependency: Uuid },

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Escalation {id} is {status}, only pending escalations can be changed")]
    EscalationNotPending { id: Uuid, status: String },

    #[error("Option '{option}' is not offered by escalation {escalation_id}")]
    InvalidOption { escalation_id: Uuid, option: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Completion failed: {0}")]
    CompletionFailed(String),

    #[error("Completion timed out after {0}ms")]
    CompletionTimeout(u64),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
