//! Supervision services: the control-loop components and the facade that
//! wires them together.

pub mod affinity;
pub mod analysis_jobs;
pub mod auto_resolver;
pub mod context_store;
pub mod decomposition;
pub mod dependency_graph;
pub mod escalator;
pub mod observer;
pub mod outcome_locks;
pub mod steering;
pub mod supervisor;
pub mod task_service;

pub use affinity::{KeywordAffinity, TaskAffinity};
pub use analysis_jobs::AnalysisJobRunner;
pub use auto_resolver::{
    AutoResolveAttempt, AutoResolveSummary, AutoResolver, AutoResolverConfig, EscalationCategory,
};
pub use context_store::ContextStoreService;
pub use decomposition::{CompletionTaskDecomposer, DecomposerConfig};
pub use dependency_graph::{BlockResult, DependencyGraph};
pub use escalator::{ActionOutcome, Escalator, EscalatorConfig, Resolution};
pub use observer::{Observer, ObserverConfig};
pub use outcome_locks::OutcomeLocks;
pub use steering::{SteeringAction, SteeringEngine, SteeringResult};
pub use supervisor::{ControlLoopReport, HomrStatus, Supervisor, SupervisorConfig};
pub use task_service::TaskService;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    SqliteActivityRepository, SqliteAnalysisJobRepository, SqliteContextStoreRepository,
    SqliteEscalationRepository, SqliteObservationRepository, SqliteOutcomeRepository,
    SqliteTaskRepository,
};
use crate::domain::ports::{
    ActivityRepository, AnalysisJobRepository, ContextStoreRepository, EscalationRepository,
    ObservationRepository, OutcomeRepository, TaskRepository,
};

/// Every repository the services read or write.
#[derive(Clone)]
pub struct Repositories {
    pub outcomes: Arc<dyn OutcomeRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub contexts: Arc<dyn ContextStoreRepository>,
    pub observations: Arc<dyn ObservationRepository>,
    pub escalations: Arc<dyn EscalationRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub jobs: Arc<dyn AnalysisJobRepository>,
}

impl Repositories {
    /// SQLite-backed repositories sharing one pool.
    pub fn sqlite(pool: &SqlitePool) -> Self {
        Self {
            outcomes: Arc::new(SqliteOutcomeRepository::new(pool.clone())),
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            contexts: Arc::new(SqliteContextStoreRepository::new(pool.clone())),
            observations: Arc::new(SqliteObservationRepository::new(pool.clone())),
            escalations: Arc::new(SqliteEscalationRepository::new(pool.clone())),
            activity: Arc::new(SqliteActivityRepository::new(pool.clone())),
            jobs: Arc::new(SqliteAnalysisJobRepository::new(pool.clone())),
        }
    }
}

/// Extract a JSON object from a model response.
///
/// Handles bare JSON, ```json fenced blocks, and prose around a single object.
pub fn extract_json_from_response(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}
