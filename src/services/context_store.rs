//! Per-outcome context store access.
//!
//! Mutations go through [`ContextStoreService::mutate`], which reloads and
//! retries when a concurrent writer bumped the store version first.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompactionReport, ContextInjection, ContextStore};
use crate::domain::ports::ContextStoreRepository;

const MAX_SAVE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct ContextStoreService {
    repo: Arc<dyn ContextStoreRepository>,
}

impl ContextStoreService {
    pub fn new(repo: Arc<dyn ContextStoreRepository>) -> Self {
        Self { repo }
    }

    /// Load the store of an outcome, or an empty unsaved one.
    pub async fn load_or_create(&self, outcome_id: Uuid) -> DomainResult<ContextStore> {
        Ok(self
            .repo
            .get(outcome_id)
            .await?
            .unwrap_or_else(|| ContextStore::new(outcome_id)))
    }

    /// Apply `f` to the latest store and save it, retrying on version conflicts.
    pub async fn mutate<F, R>(&self, outcome_id: Uuid, mut f: F) -> DomainResult<R>
    where
        F: FnMut(&mut ContextStore) -> R + Send,
        R: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut store = self.load_or_create(outcome_id).await?;
            let result = f(&mut store);
            match self.repo.save(&store).await {
                Ok(version) => {
                    debug!(outcome_id = %outcome_id, version, "context store saved");
                    return Ok(result);
                }
                Err(DomainError::ConcurrencyConflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(outcome_id = %outcome_id, attempt, "context store conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Injections for a task, most important first.
    pub async fn injections_for_task(
        &self,
        outcome_id: Uuid,
        task_id: Uuid,
    ) -> DomainResult<Vec<ContextInjection>> {
        let store = self.load_or_create(outcome_id).await?;
        Ok(store.injections_for_task(task_id).into_iter().cloned().collect())
    }

    /// Trimmed summary for prompts.
    pub async fn prompt_summary(&self, outcome_id: Uuid, max_items: usize) -> DomainResult<String> {
        Ok(self.load_or_create(outcome_id).await?.prompt_summary(max_items))
    }

    /// Bound the discoveries log. `None` when nothing needed compacting.
    pub async fn compact(
        &self,
        outcome_id: Uuid,
        max_discoveries: usize,
    ) -> DomainResult<Option<CompactionReport>> {
        let current = self.load_or_create(outcome_id).await?;
        if current.discoveries.len() <= max_discoveries {
            return Ok(None);
        }
        self.mutate(outcome_id, |store| store.compact(max_discoveries)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteContextStoreRepository, SqliteOutcomeRepository};
    use crate::domain::models::{
        Discovery, DiscoveryType, InjectionPriority, InjectionTarget, Outcome, Relevance, StatCounter,
    };
    use crate::domain::ports::OutcomeRepository;

    async fn setup() -> (ContextStoreService, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Ctx", "Context tests");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        let service = ContextStoreService::new(Arc::new(SqliteContextStoreRepository::new(pool)));
        (service, outcome.id)
    }

    #[tokio::test]
    async fn test_mutate_persists_and_bumps_version() {
        let (service, outcome_id) = setup().await;
        service
            .mutate(outcome_id, |s| s.increment(StatCounter::TasksObserved, 1))
            .await
            .unwrap();
        service
            .mutate(outcome_id, |s| s.increment(StatCounter::TasksObserved, 1))
            .await
            .unwrap();

        let store = service.load_or_create(outcome_id).await.unwrap();
        assert_eq!(store.stats.tasks_observed, 2);
        assert_eq!(store.version, 2);
    }

    #[tokio::test]
    async fn test_injections_for_task_ordered() {
        let (service, outcome_id) = setup().await;
        let task = Uuid::new_v4();
        service
            .mutate(outcome_id, |s| {
                s.add_injection(ContextInjection::new(InjectionTarget::All, "fyi", InjectionPriority::NiceToKnow, "test"));
                s.add_injection(ContextInjection::new(InjectionTarget::Task(task), "blocker", InjectionPriority::MustKnow, "test"));
                s.add_injection(ContextInjection::new(InjectionTarget::Task(Uuid::new_v4()), "other", InjectionPriority::MustKnow, "test"));
            })
            .await
            .unwrap();

        let injections = service.injections_for_task(outcome_id, task).await.unwrap();
        let contents: Vec<&str> = injections.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, vec!["blocker", "fyi"]);
    }

    #[tokio::test]
    async fn test_compact_noop_under_limit() {
        let (service, outcome_id) = setup().await;
        service
            .mutate(outcome_id, |s| {
                s.add_discovery(Discovery::new(DiscoveryType::Insight, "one", Relevance::All));
            })
            .await
            .unwrap();
        assert!(service.compact(outcome_id, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compact_bounds_discoveries() {
        let (service, outcome_id) = setup().await;
        service
            .mutate(outcome_id, |s| {
                for i in 0..12 {
                    s.add_discovery(Discovery::new(DiscoveryType::Insight, format!("d{i}"), Relevance::All));
                }
            })
            .await
            .unwrap();

        let report = service.compact(outcome_id, 5).await.unwrap().unwrap();
        assert_eq!(report.merged, 7);
        let store = service.load_or_create(outcome_id).await.unwrap();
        assert!(store.discoveries.len() <= 6);
    }
}
