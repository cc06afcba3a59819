//! Completion-backed task decomposition.
//!
//! Subtasks are created in the task's outcome and phase as a chain: the
//! first inherits the original dependencies, each later one depends on its
//! predecessor, and every dependent of the original is re-pointed at the
//! last subtask.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dependency_graph::DependencyGraph;
use super::extract_json_from_response;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    truncate_chars, CompletionRequest, DecompositionResult, Task, COMPONENT_KEY,
};
use crate::domain::ports::{CompletionService, TaskDecomposer, TaskRepository};

const MIN_SUBTASKS: usize = 2;
const MAX_SUBTASKS: usize = 5;

#[derive(Debug, Clone)]
pub struct DecomposerConfig {
    pub timeout_ms: u64,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self { timeout_ms: 120_000 }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawDecomposition {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    subtasks: Vec<RawSubtask>,
}

pub struct CompletionTaskDecomposer {
    completion: Arc<dyn CompletionService>,
    tasks: Arc<dyn TaskRepository>,
    graph: DependencyGraph,
    config: DecomposerConfig,
}

impl CompletionTaskDecomposer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        tasks: Arc<dyn TaskRepository>,
        config: DecomposerConfig,
    ) -> Self {
        Self {
            completion,
            graph: DependencyGraph::new(tasks.clone()),
            tasks,
            config,
        }
    }

    fn build_prompt(task: &Task, intent: &str, approach: Option<&str>) -> String {
        let approach = approach.map_or_else(String::new, |a| format!("\nDesign approach: {a}\n"));
        format!(
            r#"Outcome intent: {intent}
{approach}
The following task is too large to complete in one pass. Split it into {MIN_SUBTASKS}-{MAX_SUBTASKS} sequential subtasks that together deliver the same result.

Task: {title}
Description: {description}

Respond with JSON only:
{{"reasoning": "why this split", "subtasks": [{{"title": "...", "description": "..."}}]}}"#,
            title = task.title,
            description = truncate_chars(task.working_description(), 4_000),
        )
    }

    fn parse(text: &str) -> DomainResult<RawDecomposition> {
        let raw: RawDecomposition = serde_json::from_str(&extract_json_from_response(text))
            .map_err(|e| DomainError::ExecutionFailed(format!("unparseable decomposition: {e}")))?;

        let subtasks: Vec<RawSubtask> = raw
            .subtasks
            .into_iter()
            .filter(|s| !s.title.trim().is_empty())
            .take(MAX_SUBTASKS)
            .collect();
        if subtasks.len() < MIN_SUBTASKS {
            return Err(DomainError::ExecutionFailed(format!(
                "decomposition produced {} usable subtasks, need at least {MIN_SUBTASKS}",
                subtasks.len()
            )));
        }
        Ok(RawDecomposition {
            reasoning: raw.reasoning,
            subtasks,
        })
    }
}

#[async_trait]
impl TaskDecomposer for CompletionTaskDecomposer {
    #[instrument(skip_all, fields(task_id = %task.id))]
    async fn decompose(
        &self,
        task: &Task,
        outcome_intent: &str,
        outcome_approach: Option<&str>,
    ) -> DomainResult<DecompositionResult> {
        let request = CompletionRequest::new(Self::build_prompt(task, outcome_intent, outcome_approach))
            .with_system_prompt("You plan software work. Respond with JSON only.")
            .with_timeout_ms(self.config.timeout_ms)
            .with_metadata(COMPONENT_KEY, "decomposer")
            .with_metadata("task_id", task.id.to_string());
        // Only the model call is bounded; graph writes below always run to completion.
        let response = tokio::time::timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.completion.complete(request),
        )
        .await
        .map_err(|_| DomainError::CompletionTimeout(self.config.timeout_ms))??;
        let plan = Self::parse(&response.text)?;

        let mut created = Vec::with_capacity(plan.subtasks.len());
        let mut previous: Option<Uuid> = None;
        for (index, raw) in plan.subtasks.into_iter().enumerate() {
            let mut subtask = Task::new(task.outcome_id, raw.title.trim(), raw.description)
                .with_priority(task.priority)
                .with_phase(task.phase.clone());
            match previous {
                Some(prev) => subtask = subtask.with_dependency(prev),
                None => {
                    for dep in &task.depends_on {
                        subtask = subtask.with_dependency(*dep);
                    }
                }
            }
            self.tasks.create(&subtask).await?;
            info!(subtask_id = %subtask.id, position = index + 1, "subtask created");
            previous = Some(subtask.id);
            created.push(subtask.id);
        }

        if let Some(last) = previous {
            for dependent in self.tasks.get_dependents(task.id).await? {
                if created.contains(&dependent.id) {
                    continue;
                }
                if let Err(e) = self.graph.add_dependency(dependent.id, last).await {
                    warn!(dependent = %dependent.id, error = %e, "could not re-point dependent at last subtask");
                    continue;
                }
                self.tasks.remove_dependency(dependent.id, task.id).await?;
            }
        }

        Ok(DecompositionResult {
            created_task_ids: created,
            reasoning: plan.reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteOutcomeRepository, SqliteTaskRepository};
    use crate::adapters::{MockCompletion, MockResponse};
    use crate::domain::models::Outcome;
    use crate::domain::ports::OutcomeRepository;

    const PLAN: &str = r#"```json
{"reasoning": "split by layer", "subtasks": [
  {"title": "Define schema", "description": "tables"},
  {"title": "Write queries", "description": "CRUD"},
  {"title": "  ", "description": "blank titles are dropped"}
]}
```"#;

    async fn setup(response: MockResponse) -> (CompletionTaskDecomposer, Arc<MockCompletion>, Arc<SqliteTaskRepository>, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Store", "Persist things");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        let tasks = Arc::new(SqliteTaskRepository::new(pool));
        let completion = Arc::new(MockCompletion::with_default_response(response));
        let decomposer = CompletionTaskDecomposer::new(completion.clone(), tasks.clone(), DecomposerConfig::default());
        (decomposer, completion, tasks, outcome.id)
    }

    #[tokio::test]
    async fn test_decompose_chains_and_repoints_dependents() {
        let (decomposer, completion, tasks, outcome_id) = setup(MockResponse::success(PLAN)).await;
        let root = Task::new(outcome_id, "Root", "first");
        let big = Task::new(outcome_id, "Build storage", "everything").with_phase("build").with_dependency(root.id);
        let after = Task::new(outcome_id, "Use storage", "later").with_dependency(big.id);
        for t in [&root, &big, &after] {
            tasks.create(t).await.unwrap();
        }

        let result = decomposer.decompose(&big, "Persist things", None).await.unwrap();
        assert_eq!(result.created_task_ids.len(), 2);
        assert_eq!(result.reasoning, "split by layer");

        let first = tasks.get(result.created_task_ids[0]).await.unwrap().unwrap();
        let second = tasks.get(result.created_task_ids[1]).await.unwrap().unwrap();
        assert_eq!(first.depends_on, vec![root.id]);
        assert_eq!(second.depends_on, vec![first.id]);
        assert_eq!(second.phase, "build");

        let after = tasks.get(after.id).await.unwrap().unwrap();
        assert_eq!(after.depends_on, vec![second.id]);

        let requests = completion.requests_for("decomposer").await;
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_too_few_subtasks_is_an_error() {
        let response = r#"{"subtasks": [{"title": "Only one"}]}"#;
        let (decomposer, _, tasks, outcome_id) = setup(MockResponse::success(response)).await;
        let task = Task::new(outcome_id, "Big", "work");
        tasks.create(&task).await.unwrap();

        let err = decomposer.decompose(&task, "intent", None).await.unwrap_err();
        assert!(matches!(err, DomainError::ExecutionFailed(_)));
        assert_eq!(tasks.list(crate::domain::ports::TaskFilter::outcome(outcome_id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_model_times_out_before_any_write() {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Store", "Persist things");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        let tasks = Arc::new(SqliteTaskRepository::new(pool));
        let completion = Arc::new(MockCompletion::with_default_response(MockResponse::delayed(PLAN, 2_000)));
        let decomposer = CompletionTaskDecomposer::new(completion, tasks.clone(), DecomposerConfig { timeout_ms: 20 });
        let task = Task::new(outcome.id, "Big", "work");
        tasks.create(&task).await.unwrap();

        assert!(matches!(
            decomposer.decompose(&task, "intent", None).await,
            Err(DomainError::CompletionTimeout(20))
        ));
        assert_eq!(tasks.list(crate::domain::ports::TaskFilter::outcome(outcome.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_propagates() {
        let (decomposer, _, tasks, outcome_id) = setup(MockResponse::failure("offline")).await;
        let task = Task::new(outcome_id, "Big", "work");
        tasks.create(&task).await.unwrap();
        assert!(matches!(
            decomposer.decompose(&task, "intent", Some("layered")).await,
            Err(DomainError::CompletionFailed(_))
        ));
    }
}
