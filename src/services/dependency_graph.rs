//! Dependency graph manager.
//!
//! Mutates blocking relationships between tasks of one outcome. Every edge
//! insert is validated for acyclicity before it is written; callers that can
//! race on the same outcome must hold the outcome lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskPriority, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

/// Per-target result of [`DependencyGraph::block_task_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResult {
    pub task_id: Uuid,
    /// `true` if a new edge was written.
    pub added: bool,
    pub error: Option<String>,
}

impl BlockResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Search `depends_on` edges from `start` for `goal`.
///
/// Returns the path `start -> ... -> goal` if one exists.
fn find_path(graph: &HashMap<Uuid, Vec<Uuid>>, start: Uuid, goal: Uuid) -> Option<Vec<Uuid>> {
    let mut parent: HashMap<Uuid, Uuid> = HashMap::new();
    let mut visited: HashSet<Uuid> = HashSet::from([start]);
    let mut queue: VecDeque<Uuid> = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        if node == goal {
            let mut path = vec![goal];
            let mut cursor = goal;
            while let Some(&prev) = parent.get(&cursor) {
                path.push(prev);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }
        for &next in graph.get(&node).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

#[derive(Clone)]
pub struct DependencyGraph {
    tasks: Arc<dyn TaskRepository>,
}

impl DependencyGraph {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    async fn require(&self, id: Uuid) -> DomainResult<Task> {
        self.tasks.get(id).await?.ok_or(DomainError::TaskNotFound(id))
    }

    /// Make `dependent` wait for `dependency`.
    ///
    /// Returns `false` when the edge already existed.
    #[instrument(skip_all, fields(dependent = %dependent, dependency = %dependency))]
    pub async fn add_dependency(&self, dependent: Uuid, dependency: Uuid) -> DomainResult<bool> {
        if dependent == dependency {
            return Err(DomainError::SelfDependency(dependent));
        }
        let dependent_task = self.require(dependent).await?;
        let dependency_task = self.require(dependency).await?;
        if dependent_task.outcome_id != dependency_task.outcome_id {
            return Err(DomainError::CrossOutcomeDependency { dependent, dependency });
        }
        if dependent_task.depends_on.contains(&dependency) {
            debug!("dependency already present");
            return Ok(false);
        }

        let graph: HashMap<Uuid, Vec<Uuid>> = self
            .tasks
            .list(TaskFilter::outcome(dependent_task.outcome_id))
            .await?
            .into_iter()
            .map(|t| (t.id, t.depends_on))
            .collect();

        // The new edge closes a cycle iff `dependency` already reaches `dependent`.
        if let Some(path) = find_path(&graph, dependency, dependent) {
            let mut cycle = vec![dependent];
            cycle.extend(path);
            warn!(?cycle, "rejected cycle-introducing dependency");
            return Err(DomainError::DependencyCycle(cycle));
        }

        self.tasks.add_dependency(dependent, dependency).await
    }

    /// Remove an edge. Returns `false` if it did not exist.
    pub async fn remove_dependency(&self, dependent: Uuid, dependency: Uuid) -> DomainResult<bool> {
        self.tasks.remove_dependency(dependent, dependency).await
    }

    /// Create a pending task in the target's outcome and phase, without edges.
    pub async fn create_corrective_task(
        &self,
        target: &Task,
        title: &str,
        description: &str,
        priority: TaskPriority,
    ) -> DomainResult<Task> {
        let task = Task::new(target.outcome_id, title, description)
            .with_phase(target.phase.clone())
            .with_priority(priority);
        self.tasks.create(&task).await?;
        info!(task_id = %task.id, target = %target.id, "created corrective task");
        Ok(task)
    }

    /// Create a corrective task and make `target` depend on it.
    ///
    /// `priority` defaults to the target's. A failure to add the edge is
    /// logged; the new task is kept.
    #[instrument(skip_all, fields(target = %target_id))]
    pub async fn insert_corrective_task(
        &self,
        title: &str,
        description: &str,
        target_id: Uuid,
        priority: Option<TaskPriority>,
    ) -> DomainResult<Task> {
        let target = self.require(target_id).await?;
        let priority = priority.unwrap_or(target.priority);
        let task = self
            .create_corrective_task(&target, title, description, priority)
            .await?;
        if let Err(e) = self.add_dependency(target_id, task.id).await {
            warn!(task_id = %task.id, error = %e, "corrective task created without blocking edge");
        }
        Ok(task)
    }

    /// Make every target (except the blocker itself) depend on `blocker`.
    ///
    /// Failures are collected per target; the batch always runs to the end.
    pub async fn block_task_chain(&self, blocker: Uuid, targets: &[Uuid]) -> Vec<BlockResult> {
        let mut results = Vec::with_capacity(targets.len());
        for &target in targets.iter().filter(|&&t| t != blocker) {
            let result = match self.add_dependency(target, blocker).await {
                Ok(added) => BlockResult {
                    task_id: target,
                    added,
                    error: None,
                },
                Err(e) => {
                    warn!(target = %target, blocker = %blocker, error = %e, "failed to block task");
                    BlockResult {
                        task_id: target,
                        added: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    /// Pending tasks of the same outcome that depend on `task_id`.
    pub async fn tasks_depending_on(&self, task_id: Uuid) -> DomainResult<Vec<Task>> {
        let task = self.require(task_id).await?;
        Ok(self
            .tasks
            .get_dependents(task_id)
            .await?
            .into_iter()
            .filter(|t| t.outcome_id == task.outcome_id && t.status == TaskStatus::Pending)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(Uuid, Uuid)]) -> HashMap<Uuid, Vec<Uuid>> {
        let mut g: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (from, to) in edges {
            g.entry(*from).or_default().push(*to);
        }
        g
    }

    #[test]
    fn test_find_path_reports_route() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let g = graph(&[(a, b), (b, c)]);
        assert_eq!(find_path(&g, a, c), Some(vec![a, b, c]));
        assert_eq!(find_path(&g, c, a), None);
    }

    #[test]
    fn test_find_path_trivial() {
        let a = Uuid::new_v4();
        assert_eq!(find_path(&HashMap::new(), a, a), Some(vec![a]));
    }
}
