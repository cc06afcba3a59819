//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub outcome_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn outcome(outcome_id: Uuid) -> Self {
        Self {
            outcome_id: Some(outcome_id),
            status: None,
        }
    }

    pub fn pending_in(outcome_id: Uuid) -> Self {
        Self {
            outcome_id: Some(outcome_id),
            status: Some(TaskStatus::Pending),
        }
    }
}

/// Repository interface for Task persistence.
///
/// Dependency edges are written by `create` and by the explicit edge
/// methods; `update` only persists the task's own fields.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a task together with its dependency edges.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by ID, with its dependencies loaded.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Update the task's fields (not its edges).
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Delete a task and prune every edge pointing at it.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List tasks ordered by creation time.
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Insert an edge. Returns `false` if it already existed.
    async fn add_dependency(&self, task_id: Uuid, depends_on: Uuid) -> DomainResult<bool>;

    /// Remove an edge. Returns `false` if it did not exist.
    async fn remove_dependency(&self, task_id: Uuid, depends_on: Uuid) -> DomainResult<bool>;

    /// Tasks that list `task_id` among their dependencies.
    async fn get_dependents(&self, task_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Conditionally move a task `pending -> claimed`. Returns `false` if
    /// the task was no longer pending.
    async fn claim(&self, task_id: Uuid, worker_id: &str) -> DomainResult<bool>;
}
