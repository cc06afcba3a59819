//! Common test utilities for integration tests
//!
//! Provides a fully wired supervisor over an in-memory database with
//! scriptable completion, decomposition and worker doubles.

#![allow(dead_code)]

use std::sync::Arc;

use homr::adapters::mock::{MockCompletion, MockResponse, MockTaskDecomposer, MockWorkerControl};
use homr::adapters::sqlite::create_migrated_test_pool;
use homr::adapters::TriggerClusterAnalyzer;
use homr::domain::models::{AutoResolveConfig, AutoResolveMode, Outcome, Task};
use homr::services::{Repositories, Supervisor, SupervisorConfig, TaskService};
use sqlx::SqlitePool;

pub struct Harness {
    pub pool: SqlitePool,
    pub repos: Repositories,
    pub completion: Arc<MockCompletion>,
    pub decomposer: Arc<MockTaskDecomposer>,
    pub workers: Arc<MockWorkerControl>,
    pub supervisor: Supervisor,
    pub tasks: TaskService,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(SupervisorConfig::default()).await
    }

    pub async fn with_config(config: SupervisorConfig) -> Self {
        let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
        let repos = Repositories::sqlite(&pool);
        let completion = Arc::new(MockCompletion::new());
        let decomposer = Arc::new(MockTaskDecomposer::with_repository(repos.tasks.clone()));
        let workers = Arc::new(MockWorkerControl::new());
        let supervisor = Supervisor::new(
            repos.clone(),
            completion.clone(),
            decomposer.clone(),
            workers.clone(),
            Arc::new(TriggerClusterAnalyzer::new()),
            config,
        );
        let tasks = TaskService::new(repos.outcomes.clone(), repos.tasks.clone());

        Self {
            pool,
            repos,
            completion,
            decomposer,
            workers,
            supervisor,
            tasks,
        }
    }

    pub async fn outcome(&self, name: &str, intent: &str) -> Outcome {
        let outcome = Outcome::new(name, intent);
        self.repos.outcomes.create(&outcome).await.expect("Failed to create outcome");
        outcome
    }

    pub async fn outcome_with_mode(&self, name: &str, intent: &str, mode: AutoResolveMode) -> Outcome {
        let outcome = Outcome::new(name, intent).with_auto_resolve(AutoResolveConfig::new(mode, 0.8).unwrap());
        self.repos.outcomes.create(&outcome).await.expect("Failed to create outcome");
        outcome
    }

    pub async fn task(&self, outcome: &Outcome, title: &str, description: &str) -> Task {
        self.tasks
            .create_task(Task::new(outcome.id, title, description))
            .await
            .expect("Failed to create task")
    }

    pub async fn reload(&self, task: &Task) -> Task {
        self.tasks.get_task(task.id).await.expect("Task should exist")
    }

    /// Script the next observer verdict.
    pub async fn observer_says(&self, json: &str) {
        self.completion.respond_to("observer", MockResponse::success(json)).await;
    }

    /// Script the next auto-resolver verdict.
    pub async fn auto_resolver_says(&self, json: &str) {
        self.completion.respond_to("auto_resolver", MockResponse::success(json)).await;
    }
}

/// Observer verdict for healthy work with an explicit ambiguity.
pub fn ambiguous_verdict(kind: &str, description: &str, options: &[(&str, &str)]) -> String {
    let options: Vec<serde_json::Value> = options
        .iter()
        .map(|(id, label)| serde_json::json!({"id": id, "label": label, "description": "", "implications": ""}))
        .collect();
    serde_json::json!({
        "on_track": true,
        "alignment_score": 75,
        "quality": "good",
        "summary": "work done, one open question",
        "ambiguity": {
            "detected": true,
            "type": kind,
            "description": description,
            "evidence": [description],
            "options": options,
        }
    })
    .to_string()
}
