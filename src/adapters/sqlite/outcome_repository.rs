//! SQLite implementation of the OutcomeRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutoResolveConfig, AutoResolveMode, Outcome, OutcomeStatus};
use crate::domain::ports::OutcomeRepository;

const OUTCOME_COLUMNS: &str = "id, name, intent, design_approach, status, homr_enabled, auto_resolve_mode, auto_resolve_threshold, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteOutcomeRepository {
    pool: SqlitePool,
}

impl SqliteOutcomeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutcomeRepository for SqliteOutcomeRepository {
    async fn create(&self, outcome: &Outcome) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO outcomes (id, name, intent, design_approach, status, homr_enabled,
               auto_resolve_mode, auto_resolve_threshold, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(outcome.id.to_string())
        .bind(&outcome.name)
        .bind(&outcome.intent)
        .bind(&outcome.design_approach)
        .bind(outcome.status.as_str())
        .bind(outcome.homr_enabled)
        .bind(outcome.auto_resolve.mode.as_str())
        .bind(outcome.auto_resolve.confidence_threshold)
        .bind(format_datetime(&outcome.created_at))
        .bind(format_datetime(&outcome.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Outcome>> {
        let row: Option<OutcomeRow> = sqlx::query_as(&format!("SELECT {OUTCOME_COLUMNS} FROM outcomes WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, outcome: &Outcome) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE outcomes SET name = ?, intent = ?, design_approach = ?, status = ?,
               homr_enabled = ?, auto_resolve_mode = ?, auto_resolve_threshold = ?, updated_at = ?
               WHERE id = ?"#
        )
        .bind(&outcome.name)
        .bind(&outcome.intent)
        .bind(&outcome.design_approach)
        .bind(outcome.status.as_str())
        .bind(outcome.homr_enabled)
        .bind(outcome.auto_resolve.mode.as_str())
        .bind(outcome.auto_resolve.confidence_threshold)
        .bind(format_datetime(&outcome.updated_at))
        .bind(outcome.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::OutcomeNotFound(outcome.id));
        }

        Ok(())
    }

    async fn list(&self, status: Option<OutcomeStatus>) -> DomainResult<Vec<Outcome>> {
        let rows: Vec<OutcomeRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {OUTCOME_COLUMNS} FROM outcomes WHERE status = ? ORDER BY created_at, rowid"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!("SELECT {OUTCOME_COLUMNS} FROM outcomes ORDER BY created_at, rowid"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct OutcomeRow {
    id: String,
    name: String,
    intent: String,
    design_approach: Option<String>,
    status: String,
    homr_enabled: bool,
    auto_resolve_mode: String,
    auto_resolve_threshold: f64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OutcomeRow> for Outcome {
    type Error = DomainError;

    fn try_from(row: OutcomeRow) -> Result<Self, Self::Error> {
        let status = OutcomeStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid outcome status: {}", row.status)))?;
        let mode = AutoResolveMode::from_str(&row.auto_resolve_mode).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid auto-resolve mode: {}", row.auto_resolve_mode))
        })?;

        Ok(Outcome {
            id: parse_uuid(&row.id)?,
            name: row.name,
            intent: row.intent,
            design_approach: row.design_approach,
            status,
            homr_enabled: row.homr_enabled,
            auto_resolve: AutoResolveConfig {
                mode,
                confidence_threshold: row.auto_resolve_threshold,
            },
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
