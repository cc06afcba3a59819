//! Task creation and claiming.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::dependency_graph::DependencyGraph;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{OutcomeRepository, TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct TaskService {
    outcomes: Arc<dyn OutcomeRepository>,
    tasks: Arc<dyn TaskRepository>,
    graph: DependencyGraph,
}

impl TaskService {
    pub fn new(outcomes: Arc<dyn OutcomeRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self {
            outcomes,
            graph: DependencyGraph::new(tasks.clone()),
            tasks,
        }
    }

    /// Persist a task after checking its outcome and every dependency edge.
    #[instrument(skip_all, fields(outcome_id = %task.outcome_id))]
    pub async fn create_task(&self, task: Task) -> DomainResult<Task> {
        if task.title.trim().is_empty() {
            return Err(DomainError::ValidationFailed("task title cannot be empty".to_string()));
        }
        if self.outcomes.get(task.outcome_id).await?.is_none() {
            return Err(DomainError::OutcomeNotFound(task.outcome_id));
        }

        // Edges go through the graph so each one is validated before commit.
        let dependencies = task.depends_on.clone();
        let mut bare = task;
        bare.depends_on.clear();
        self.tasks.create(&bare).await?;
        for dependency in dependencies {
            if let Err(e) = self.graph.add_dependency(bare.id, dependency).await {
                self.tasks.delete(bare.id).await?;
                return Err(e);
            }
            bare.depends_on.push(dependency);
        }

        info!(task_id = %bare.id, "task created");
        Ok(bare)
    }

    pub async fn get_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        self.tasks.list(filter).await
    }

    /// Claim the most urgent claimable task of an outcome for `worker_id`.
    ///
    /// Candidates are tried in order; a lost race on one moves on to the next.
    #[instrument(skip_all, fields(outcome_id = %outcome_id, worker_id = %worker_id))]
    pub async fn claim_next(&self, outcome_id: Uuid, worker_id: &str) -> DomainResult<Option<Task>> {
        let tasks = self.tasks.list(TaskFilter::outcome(outcome_id)).await?;
        let completed: HashSet<Uuid> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect();

        let mut candidates: Vec<&Task> = tasks.iter().filter(|t| t.is_claimable(&completed)).collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)));

        for candidate in candidates {
            if self.tasks.claim(candidate.id, worker_id).await? {
                info!(task_id = %candidate.id, "task claimed");
                return self.tasks.get(candidate.id).await;
            }
            debug!(task_id = %candidate.id, "claim lost, trying next candidate");
        }
        Ok(None)
    }

    /// Record a worker's result for a claimed or running task.
    #[instrument(skip_all, fields(task_id = %task_id, success))]
    pub async fn finish_task(&self, task_id: Uuid, success: bool) -> DomainResult<Task> {
        let mut task = self.get_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(DomainError::ValidationFailed(format!(
                "task {task_id} is already {}",
                task.status.as_str()
            )));
        }
        task.status = if success {
            TaskStatus::Completed
        } else if task.attempts < task.max_attempts {
            TaskStatus::Pending
        } else {
            TaskStatus::Failed
        };
        task.claimed_by = None;
        task.touch();
        self.tasks.update(&task).await?;
        Ok(task)
    }
}
