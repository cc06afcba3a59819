//! Steering engine: reacts to an observation by injecting context and
//! mutating the task graph.
//!
//! Actions run in emission order with no rollback across the batch; each
//! failure is recorded and the batch continues.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::context_store::ContextStoreService;
use super::dependency_graph::DependencyGraph;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    truncate_chars, ActivityDetails, ActivityEntry, CompactionReport, ContextInjection,
    InjectionPriority, InjectionTarget, Observation, Relevance, Severity, StatCounter, Task,
    TaskPriority, TaskStatus, DEFAULT_MAX_DISCOVERIES,
};
use crate::domain::ports::{ActivityRepository, TaskFilter, TaskRepository};

/// One steering decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SteeringAction {
    InjectContext {
        target: InjectionTarget,
        content: String,
        priority: InjectionPriority,
    },
    CreateCorrectiveTask {
        target_task: Uuid,
        title: String,
        description: String,
        priority: TaskPriority,
    },
    Reprioritize {
        task_id: Uuid,
        priority: TaskPriority,
    },
    MarkObsolete {
        task_id: Uuid,
        reason: String,
    },
}

impl SteeringAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InjectContext { .. } => "inject_context",
            Self::CreateCorrectiveTask { .. } => "create_corrective_task",
            Self::Reprioritize { .. } => "reprioritize",
            Self::MarkObsolete { .. } => "mark_obsolete",
        }
    }
}

/// What a steering pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteeringResult {
    pub actions: Vec<SteeringAction>,
    pub executed: usize,
    pub corrective_tasks: Vec<Uuid>,
    pub failures: Vec<String>,
    pub compaction: Option<CompactionReport>,
}

/// Decide actions for an observation.
///
/// `drifted` is the observed task; `pending` the outcome's pending tasks.
pub fn plan_actions(observation: &Observation, drifted: &Task, pending: &[Task]) -> Vec<SteeringAction> {
    let mut actions = Vec::new();

    for drift in &observation.drift {
        match drift.severity {
            Severity::High => {
                let mut description = format!(
                    "Correct {} detected in task '{}'.\n\n{}",
                    drift.drift_type.as_str().replace('_', " "),
                    drifted.title,
                    drift.description
                );
                if !drift.evidence.is_empty() {
                    description.push_str("\n\nEvidence:\n");
                    for line in &drift.evidence {
                        description.push_str(&format!("- {line}\n"));
                    }
                }
                actions.push(SteeringAction::CreateCorrectiveTask {
                    target_task: drifted.id,
                    title: format!("Fix: {}", truncate_chars(&drift.description, 60)),
                    description,
                    priority: drifted.priority.elevated(),
                });
            }
            Severity::Medium | Severity::Low => {
                let priority = if drift.severity == Severity::Medium {
                    InjectionPriority::ShouldKnow
                } else {
                    InjectionPriority::NiceToKnow
                };
                let content = format!(
                    "Drift observed in '{}' ({}): {}",
                    drifted.title,
                    drift.drift_type.as_str(),
                    drift.description
                );
                for task in pending.iter().filter(|t| t.id != drifted.id) {
                    actions.push(SteeringAction::InjectContext {
                        target: InjectionTarget::Task(task.id),
                        content: content.clone(),
                        priority,
                    });
                }
            }
        }
    }

    for discovery in &observation.discoveries {
        let priority = discovery.discovery_type.injection_priority();
        let content = format!("[{}] {}", discovery.discovery_type.as_str(), discovery.content);
        match &discovery.relevant_to {
            Relevance::All => actions.push(SteeringAction::InjectContext {
                target: InjectionTarget::All,
                content,
                priority,
            }),
            Relevance::Tasks(ids) => {
                for id in ids {
                    actions.push(SteeringAction::InjectContext {
                        target: InjectionTarget::Task(*id),
                        content: content.clone(),
                        priority,
                    });
                }
            }
        }
    }

    actions
}

pub struct SteeringEngine {
    tasks: Arc<dyn TaskRepository>,
    graph: DependencyGraph,
    context: ContextStoreService,
    activity: Arc<dyn ActivityRepository>,
    max_discoveries: usize,
}

impl SteeringEngine {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        graph: DependencyGraph,
        context: ContextStoreService,
        activity: Arc<dyn ActivityRepository>,
    ) -> Self {
        Self {
            tasks,
            graph,
            context,
            activity,
            max_discoveries: DEFAULT_MAX_DISCOVERIES,
        }
    }

    pub fn with_max_discoveries(mut self, max_discoveries: usize) -> Self {
        self.max_discoveries = max_discoveries;
        self
    }

    /// Plan and execute steering for one observation, then compact context.
    #[instrument(skip_all, fields(outcome_id = %observation.outcome_id, task_id = %observation.task_id))]
    pub async fn steer(&self, observation: &Observation) -> DomainResult<SteeringResult> {
        let drifted = self
            .tasks
            .get(observation.task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(observation.task_id))?;
        let pending = self.tasks.list(TaskFilter::pending_in(observation.outcome_id)).await?;
        let actions = plan_actions(observation, &drifted, &pending);

        let mut result = SteeringResult::default();
        for action in &actions {
            match self.execute(observation.outcome_id, action).await {
                Ok(created) => {
                    result.executed += 1;
                    result.corrective_tasks.extend(created);
                }
                Err(e) => {
                    warn!(action = action.name(), error = %e, "steering action failed");
                    result.failures.push(format!("{}: {e}", action.name()));
                }
            }
        }

        if !actions.is_empty() {
            self.context
                .mutate(observation.outcome_id, |store| store.increment(StatCounter::SteeringActions, 1))
                .await?;
            let names: Vec<String> = actions.iter().map(|a| a.name().to_string()).collect();
            self.activity
                .append(&ActivityEntry::new(
                    observation.outcome_id,
                    format!("Steered after '{}': {} action(s)", drifted.title, actions.len()),
                    ActivityDetails::Steered {
                        task_id: observation.task_id,
                        actions: names,
                        corrective_tasks: result.corrective_tasks.clone(),
                        failures: result.failures.clone(),
                    },
                ))
                .await?;
            info!(
                actions = actions.len(),
                failures = result.failures.len(),
                corrective = result.corrective_tasks.len(),
                "steering batch executed"
            );
        }

        result.compaction = self.compact_context(observation.outcome_id, self.max_discoveries).await?;
        result.actions = actions;
        Ok(result)
    }

    /// Execute one action. Returns ids of tasks it created.
    pub async fn execute(&self, outcome_id: Uuid, action: &SteeringAction) -> DomainResult<Vec<Uuid>> {
        match action {
            SteeringAction::InjectContext {
                target,
                content,
                priority,
            } => {
                let injection = ContextInjection::new(*target, content.clone(), *priority, "steering");
                self.context
                    .mutate(outcome_id, |store| store.add_injection(injection.clone()))
                    .await?;
                Ok(Vec::new())
            }
            SteeringAction::CreateCorrectiveTask {
                target_task,
                title,
                description,
                priority,
            } => {
                let target = self
                    .tasks
                    .get(*target_task)
                    .await?
                    .ok_or(DomainError::TaskNotFound(*target_task))?;
                if target.status == TaskStatus::Pending {
                    let task = self
                        .graph
                        .insert_corrective_task(title, description, target.id, Some(*priority))
                        .await?;
                    return Ok(vec![task.id]);
                }

                // The target already ran: gate whatever still waits on it.
                let task = self
                    .graph
                    .create_corrective_task(&target, title, description, *priority)
                    .await?;
                let dependents: Vec<Uuid> = self
                    .graph
                    .tasks_depending_on(target.id)
                    .await?
                    .into_iter()
                    .map(|t| t.id)
                    .collect();
                let failed: Vec<String> = self
                    .graph
                    .block_task_chain(task.id, &dependents)
                    .await
                    .into_iter()
                    .filter_map(|r| r.error.map(|e| format!("{}: {e}", r.task_id)))
                    .collect();
                if !failed.is_empty() {
                    warn!(task_id = %task.id, failed = ?failed, "corrective task could not block every dependent");
                }
                Ok(vec![task.id])
            }
            SteeringAction::Reprioritize { task_id, priority } => {
                let mut task = self.tasks.get(*task_id).await?.ok_or(DomainError::TaskNotFound(*task_id))?;
                if task.status.is_terminal() {
                    return Err(already_terminal(&task));
                }
                task.priority = *priority;
                task.touch();
                self.tasks.update(&task).await?;
                Ok(Vec::new())
            }
            SteeringAction::MarkObsolete { task_id, reason } => {
                let mut task = self.tasks.get(*task_id).await?.ok_or(DomainError::TaskNotFound(*task_id))?;
                if task.status.is_terminal() {
                    return Err(already_terminal(&task));
                }
                task.mark_obsolete(reason);
                self.tasks.update(&task).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Bound an outcome's discoveries log.
    pub async fn compact_context(
        &self,
        outcome_id: Uuid,
        max_discoveries: usize,
    ) -> DomainResult<Option<CompactionReport>> {
        let report = self.context.compact(outcome_id, max_discoveries).await?;
        if let Some(report) = &report {
            info!(outcome_id = %outcome_id, before = report.before, merged = report.merged, "context compacted");
        }
        Ok(report)
    }
}

fn already_terminal(task: &Task) -> DomainError {
    DomainError::ValidationFailed(format!("task {} is already {}", task.id, task.status.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteActivityRepository, SqliteContextStoreRepository, SqliteOutcomeRepository,
        SqliteTaskRepository,
    };
    use crate::domain::models::{Discovery, DiscoveryType, DriftItem, DriftType, Outcome};
    use crate::domain::ports::OutcomeRepository;

    async fn engine() -> (SteeringEngine, Arc<dyn TaskRepository>, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Steer", "Steering tests");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let engine = SteeringEngine::new(
            tasks.clone(),
            DependencyGraph::new(tasks.clone()),
            ContextStoreService::new(Arc::new(SqliteContextStoreRepository::new(pool.clone()))),
            Arc::new(SqliteActivityRepository::new(pool)),
        );
        (engine, tasks, outcome.id)
    }

    fn drift(severity: Severity) -> DriftItem {
        DriftItem {
            drift_type: DriftType::ScopeCreep,
            severity,
            description: "Added an unrequested web UI".to_string(),
            evidence: vec!["src/ui.rs".to_string()],
        }
    }

    #[test]
    fn test_high_drift_creates_corrective_task() {
        let outcome = Uuid::new_v4();
        let drifted = Task::new(outcome, "Parse CSV", "d").with_priority(TaskPriority::Normal);
        let mut obs = Observation::new(outcome, drifted.id);
        obs.drift.push(drift(Severity::High));

        let actions = plan_actions(&obs, &drifted, &[]);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            SteeringAction::CreateCorrectiveTask { priority, description, target_task, .. } => {
                assert_eq!(*priority, TaskPriority::High);
                assert_eq!(*target_task, drifted.id);
                assert!(description.contains("Added an unrequested web UI"));
                assert!(description.contains("src/ui.rs"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_medium_and_low_drift_inject_into_pending() {
        let outcome = Uuid::new_v4();
        let drifted = Task::new(outcome, "Parse CSV", "d");
        let pending = vec![Task::new(outcome, "B", "b"), Task::new(outcome, "C", "c")];
        let mut obs = Observation::new(outcome, drifted.id);
        obs.drift.push(drift(Severity::Medium));
        obs.drift.push(drift(Severity::Low));

        let actions = plan_actions(&obs, &drifted, &pending);
        assert_eq!(actions.len(), 4);
        let priorities: Vec<InjectionPriority> = actions
            .iter()
            .map(|a| match a {
                SteeringAction::InjectContext { priority, .. } => *priority,
                other => panic!("unexpected action {other:?}"),
            })
            .collect();
        assert_eq!(
            priorities,
            vec![
                InjectionPriority::ShouldKnow,
                InjectionPriority::ShouldKnow,
                InjectionPriority::NiceToKnow,
                InjectionPriority::NiceToKnow
            ]
        );
    }

    #[test]
    fn test_discovery_relevance_routing() {
        let outcome = Uuid::new_v4();
        let drifted = Task::new(outcome, "A", "a");
        let target = Uuid::new_v4();
        let mut obs = Observation::new(outcome, drifted.id);
        obs.discoveries.push(Discovery::new(DiscoveryType::Blocker, "API is rate limited", Relevance::All));
        obs.discoveries.push(Discovery::new(DiscoveryType::Insight, "Use serde", Relevance::Tasks(vec![target])));
        obs.discoveries.push(Discovery::new(DiscoveryType::Constraint, "ignored", Relevance::Tasks(vec![])));

        let actions = plan_actions(&obs, &drifted, &[]);
        assert_eq!(
            actions,
            vec![
                SteeringAction::InjectContext {
                    target: InjectionTarget::All,
                    content: "[blocker] API is rate limited".to_string(),
                    priority: InjectionPriority::MustKnow,
                },
                SteeringAction::InjectContext {
                    target: InjectionTarget::Task(target),
                    content: "[insight] Use serde".to_string(),
                    priority: InjectionPriority::NiceToKnow,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_terminal_tasks_reject_obsolete_and_reprioritize() {
        let (engine, tasks, outcome_id) = engine().await;
        let done = Task::new(outcome_id, "Parse CSV", "d").with_status(TaskStatus::Completed);
        tasks.create(&done).await.unwrap();

        let obsolete = SteeringAction::MarkObsolete {
            task_id: done.id,
            reason: "superseded".to_string(),
        };
        assert!(matches!(
            engine.execute(outcome_id, &obsolete).await,
            Err(DomainError::ValidationFailed(_))
        ));
        let reprioritize = SteeringAction::Reprioritize {
            task_id: done.id,
            priority: TaskPriority::Critical,
        };
        assert!(matches!(
            engine.execute(outcome_id, &reprioritize).await,
            Err(DomainError::ValidationFailed(_))
        ));

        let stored = tasks.get(done.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.priority, done.priority);
    }

    #[tokio::test]
    async fn test_mark_obsolete_pending_task() {
        let (engine, tasks, outcome_id) = engine().await;
        let task = Task::new(outcome_id, "Write docs", "d");
        tasks.create(&task).await.unwrap();

        let action = SteeringAction::MarkObsolete {
            task_id: task.id,
            reason: "covered elsewhere".to_string(),
        };
        assert!(engine.execute(outcome_id, &action).await.unwrap().is_empty());
        assert!(tasks.get(task.id).await.unwrap().unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn test_corrective_task_for_pending_target_gates_it() {
        let (engine, tasks, outcome_id) = engine().await;
        let target = Task::new(outcome_id, "Ship release", "d");
        tasks.create(&target).await.unwrap();

        let action = SteeringAction::CreateCorrectiveTask {
            target_task: target.id,
            title: "Fix: flaky test".to_string(),
            description: "stabilize".to_string(),
            priority: TaskPriority::High,
        };
        let created = engine.execute(outcome_id, &action).await.unwrap();
        assert_eq!(created.len(), 1);
        assert!(tasks.get(target.id).await.unwrap().unwrap().depends_on.contains(&created[0]));
    }
}
