//! Scriptable test doubles for the external boundaries.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CompletionRequest, CompletionResponse, DecompositionResult, Task, Worker, WorkerStatus,
    COMPONENT_KEY,
};
use crate::domain::ports::{CompletionService, TaskDecomposer, TaskRepository, WorkerControl};

/// Mock response configuration.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Output text
    pub output: String,
    /// Whether to simulate failure
    pub fail: bool,
    /// Error message if failing
    pub error_message: Option<String>,
    /// Simulate a timeout instead of a plain failure
    pub timeout: bool,
    /// Sleep this long before answering
    pub delay_ms: u64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            output: String::new(),
            fail: true,
            error_message: Some("no scripted response".to_string()),
            timeout: false,
            delay_ms: 0,
        }
    }
}

impl MockResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            fail: false,
            error_message: None,
            timeout: false,
            delay_ms: 0,
        }
    }

    pub fn delayed(output: impl Into<String>, delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::success(output)
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            fail: true,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            timeout: true,
            ..Default::default()
        }
    }
}

/// Completion service returning scripted responses.
///
/// Responses queued for a component (the request's `component` metadata)
/// are consumed first, then the shared queue, then the default response.
/// By default every call fails, which exercises the fallback paths.
pub struct MockCompletion {
    default_response: MockResponse,
    by_component: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    queue: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::with_default_response(MockResponse::default())
    }

    pub fn with_default_response(response: MockResponse) -> Self {
        Self {
            default_response: response,
            by_component: Arc::new(Mutex::new(HashMap::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a response for the next request of `component`.
    pub async fn respond_to(&self, component: &str, response: MockResponse) {
        self.by_component
            .lock()
            .await
            .entry(component.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a response for the next request of any component.
    pub async fn push(&self, response: MockResponse) {
        self.queue.lock().await.push_back(response);
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    /// Requests received from one component.
    pub async fn requests_for(&self, component: &str) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.metadata.get(COMPONENT_KEY).map(String::as_str) == Some(component))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse> {
        let component = request.metadata.get(COMPONENT_KEY).cloned().unwrap_or_default();
        let timeout_ms = request.timeout_ms;
        self.requests.lock().await.push(request);

        let scripted = {
            let mut by_component = self.by_component.lock().await;
            by_component.get_mut(&component).and_then(VecDeque::pop_front)
        };
        let scripted = match scripted {
            Some(r) => Some(r),
            None => self.queue.lock().await.pop_front(),
        };
        let response = scripted.unwrap_or_else(|| self.default_response.clone());
        if response.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(response.delay_ms)).await;
        }

        if response.timeout {
            return Err(DomainError::CompletionTimeout(timeout_ms));
        }
        if response.fail {
            return Err(DomainError::CompletionFailed(
                response.error_message.unwrap_or_else(|| "mock failure".to_string()),
            ));
        }
        Ok(CompletionResponse {
            text: response.output,
            duration_ms: 0,
        })
    }
}

/// Task decomposer double.
///
/// With a repository attached it persists two chained subtasks per call;
/// otherwise it returns fresh ids without persisting anything.
pub struct MockTaskDecomposer {
    tasks: Option<Arc<dyn TaskRepository>>,
    failing: Arc<Mutex<HashSet<Uuid>>>,
    calls: Arc<Mutex<Vec<Uuid>>>,
}

impl Default for MockTaskDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskDecomposer {
    pub fn new() -> Self {
        Self {
            tasks: None,
            failing: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_repository(tasks: Arc<dyn TaskRepository>) -> Self {
        Self {
            tasks: Some(tasks),
            ..Self::new()
        }
    }

    /// Make decomposition of `task_id` fail.
    pub async fn fail_for(&self, task_id: Uuid) {
        self.failing.lock().await.insert(task_id);
    }

    /// Ids of tasks decomposition was requested for.
    pub async fn calls(&self) -> Vec<Uuid> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl TaskDecomposer for MockTaskDecomposer {
    async fn decompose(
        &self,
        task: &Task,
        _outcome_intent: &str,
        _outcome_approach: Option<&str>,
    ) -> DomainResult<DecompositionResult> {
        self.calls.lock().await.push(task.id);
        if self.failing.lock().await.contains(&task.id) {
            return Err(DomainError::ExecutionFailed(format!("cannot decompose {}", task.id)));
        }

        let mut created = Vec::new();
        if let Some(repo) = &self.tasks {
            let first = Task::new(task.outcome_id, format!("{} (part 1)", task.title), task.working_description())
                .with_phase(task.phase.clone())
                .with_priority(task.priority);
            let second = Task::new(task.outcome_id, format!("{} (part 2)", task.title), task.working_description())
                .with_phase(task.phase.clone())
                .with_priority(task.priority)
                .with_dependency(first.id);
            repo.create(&first).await?;
            repo.create(&second).await?;
            created.push(first.id);
            created.push(second.id);
        } else {
            created.push(Uuid::new_v4());
            created.push(Uuid::new_v4());
        }

        Ok(DecompositionResult {
            created_task_ids: created,
            reasoning: "split into two parts".to_string(),
        })
    }
}

/// In-memory worker fleet.
#[derive(Default)]
pub struct MockWorkerControl {
    workers: Arc<Mutex<HashMap<String, Worker>>>,
}

impl MockWorkerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_worker(&self, worker: Worker) {
        self.workers.lock().await.insert(worker.id.clone(), worker);
    }

    /// Ids of paused workers, sorted.
    pub async fn paused(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workers
            .lock()
            .await
            .values()
            .filter(|w| w.status == WorkerStatus::Paused)
            .map(|w| w.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl WorkerControl for MockWorkerControl {
    async fn pause_worker(&self, worker_id: &str) -> DomainResult<()> {
        let mut workers = self.workers.lock().await;
        let worker = workers
            .get_mut(worker_id)
            .ok_or_else(|| DomainError::ValidationFailed(format!("unknown worker: {worker_id}")))?;
        worker.status = WorkerStatus::Paused;
        Ok(())
    }

    async fn active_workers_by_outcome(&self, outcome_id: Uuid) -> DomainResult<Vec<Worker>> {
        let mut active: Vec<Worker> = self
            .workers
            .lock()
            .await
            .values()
            .filter(|w| w.outcome_id == outcome_id && w.status.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_component_queue_takes_precedence() {
        let mock = MockCompletion::new();
        mock.push(MockResponse::success("shared")).await;
        mock.respond_to("observer", MockResponse::success("observer-only")).await;

        let observer = CompletionRequest::new("x").with_metadata(COMPONENT_KEY, "observer");
        assert_eq!(mock.complete(observer.clone()).await.unwrap().text, "observer-only");
        assert_eq!(mock.complete(observer.clone()).await.unwrap().text, "shared");
        assert!(matches!(mock.complete(observer).await, Err(DomainError::CompletionFailed(_))));
        assert_eq!(mock.requests_for("observer").await.len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_response() {
        let mock = MockCompletion::with_default_response(MockResponse::timeout());
        let err = mock.complete(CompletionRequest::new("x").with_timeout_ms(10)).await.unwrap_err();
        assert!(matches!(err, DomainError::CompletionTimeout(10)));
    }

    #[tokio::test]
    async fn test_worker_pause() {
        let control = MockWorkerControl::new();
        let outcome = Uuid::new_v4();
        control.add_worker(Worker::new("a", outcome)).await;
        control.add_worker(Worker::new("b", outcome)).await;
        control.pause_worker("a").await.unwrap();
        assert_eq!(control.paused().await, vec!["a".to_string()]);
        assert_eq!(control.active_workers_by_outcome(outcome).await.unwrap().len(), 1);
    }
}
