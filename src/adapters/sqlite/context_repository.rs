//! SQLite implementation of the ContextStoreRepository.
//!
//! Each collection is a JSON column; `version` guards against lost updates.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ContextStats, ContextStore};
use crate::domain::ports::ContextStoreRepository;

#[derive(Clone)]
pub struct SqliteContextStoreRepository {
    pool: SqlitePool,
}

impl SqliteContextStoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn counter(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl ContextStoreRepository for SqliteContextStoreRepository {
    async fn get(&self, outcome_id: Uuid) -> DomainResult<Option<ContextStore>> {
        let row: Option<ContextStoreRow> = sqlx::query_as(
            r#"SELECT outcome_id, discoveries, decisions, constraints, injections, tasks_observed,
               discoveries_extracted, escalations_created, steering_actions, version, updated_at
               FROM context_stores WHERE outcome_id = ?"#
        )
        .bind(outcome_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn save(&self, store: &ContextStore) -> DomainResult<u64> {
        let discoveries = serde_json::to_string(&store.discoveries)?;
        let decisions = serde_json::to_string(&store.decisions)?;
        let constraints = serde_json::to_string(&store.constraints)?;
        let injections = serde_json::to_string(&store.injections)?;
        let new_version = store.version + 1;

        let result = if store.version == 0 {
            sqlx::query(
                r#"INSERT OR IGNORE INTO context_stores (outcome_id, discoveries, decisions, constraints,
                   injections, tasks_observed, discoveries_extracted, escalations_created,
                   steering_actions, version, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
            )
            .bind(store.outcome_id.to_string())
            .bind(&discoveries)
            .bind(&decisions)
            .bind(&constraints)
            .bind(&injections)
            .bind(counter(store.stats.tasks_observed))
            .bind(counter(store.stats.discoveries_extracted))
            .bind(counter(store.stats.escalations_created))
            .bind(counter(store.stats.steering_actions))
            .bind(counter(new_version))
            .bind(format_datetime(&store.updated_at))
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"UPDATE context_stores SET discoveries = ?, decisions = ?, constraints = ?,
                   injections = ?, tasks_observed = ?, discoveries_extracted = ?,
                   escalations_created = ?, steering_actions = ?, version = ?, updated_at = ?
                   WHERE outcome_id = ? AND version = ?"#
            )
            .bind(&discoveries)
            .bind(&decisions)
            .bind(&constraints)
            .bind(&injections)
            .bind(counter(store.stats.tasks_observed))
            .bind(counter(store.stats.discoveries_extracted))
            .bind(counter(store.stats.escalations_created))
            .bind(counter(store.stats.steering_actions))
            .bind(counter(new_version))
            .bind(format_datetime(&store.updated_at))
            .bind(store.outcome_id.to_string())
            .bind(counter(store.version))
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(DomainError::ConcurrencyConflict {
                entity: "context_store".to_string(),
                id: store.outcome_id.to_string(),
            });
        }

        Ok(new_version)
    }
}

#[derive(sqlx::FromRow)]
struct ContextStoreRow {
    outcome_id: String,
    discoveries: String,
    decisions: String,
    constraints: String,
    injections: String,
    tasks_observed: i64,
    discoveries_extracted: i64,
    escalations_created: i64,
    steering_actions: i64,
    version: i64,
    updated_at: String,
}

impl TryFrom<ContextStoreRow> for ContextStore {
    type Error = DomainError;

    fn try_from(row: ContextStoreRow) -> Result<Self, Self::Error> {
        let unsigned = |v: i64| u64::try_from(v).unwrap_or(0);
        Ok(ContextStore {
            outcome_id: parse_uuid(&row.outcome_id)?,
            discoveries: parse_json(&row.discoveries)?,
            decisions: parse_json(&row.decisions)?,
            constraints: parse_json(&row.constraints)?,
            injections: parse_json(&row.injections)?,
            stats: ContextStats {
                tasks_observed: unsigned(row.tasks_observed),
                discoveries_extracted: unsigned(row.discoveries_extracted),
                escalations_created: unsigned(row.escalations_created),
                steering_actions: unsigned(row.steering_actions),
            },
            version: unsigned(row.version),
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteOutcomeRepository};
    use crate::domain::models::{Discovery, DiscoveryType, Outcome, Relevance, StatCounter};
    use crate::domain::ports::OutcomeRepository;

    async fn setup() -> (SqliteContextStoreRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Test", "Test outcome");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        (SqliteContextStoreRepository::new(pool), outcome.id)
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let (repo, outcome_id) = setup().await;
        assert!(repo.get(outcome_id).await.unwrap().is_none());

        let mut store = ContextStore::new(outcome_id);
        store.add_discovery(Discovery::new(DiscoveryType::Blocker, "rate limits", Relevance::All));
        store.increment(StatCounter::TasksObserved, 2);
        store.version = repo.save(&store).await.unwrap();
        assert_eq!(store.version, 1);

        let loaded = repo.get(outcome_id).await.unwrap().unwrap();
        assert_eq!(loaded.discoveries, store.discoveries);
        assert_eq!(loaded.stats.tasks_observed, 2);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let (repo, outcome_id) = setup().await;
        let store = ContextStore::new(outcome_id);
        repo.save(&store).await.unwrap();

        // A second writer that never saw version 1.
        let stale = ContextStore::new(outcome_id);
        assert!(matches!(
            repo.save(&stale).await,
            Err(DomainError::ConcurrencyConflict { .. })
        ));

        let mut fresh = repo.get(outcome_id).await.unwrap().unwrap();
        fresh.increment(StatCounter::SteeringActions, 1);
        assert_eq!(repo.save(&fresh).await.unwrap(), 2);
    }
}
