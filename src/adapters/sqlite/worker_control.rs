//! `workers` table implementation of the WorkerControl port.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Worker, WorkerStatus};
use crate::domain::ports::WorkerControl;

#[derive(Clone)]
pub struct SqliteWorkerControl {
    pool: SqlitePool,
}

impl SqliteWorkerControl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a worker row.
    pub async fn register(&self, worker: &Worker) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO workers (id, outcome_id, status, current_task_id, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET outcome_id = excluded.outcome_id, status = excluded.status,
               current_task_id = excluded.current_task_id, updated_at = excluded.updated_at"#
        )
        .bind(&worker.id)
        .bind(worker.outcome_id.to_string())
        .bind(worker.status.as_str())
        .bind(worker.current_task_id.map(|id| id.to_string()))
        .bind(format_datetime(&worker.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WorkerControl for SqliteWorkerControl {
    async fn pause_worker(&self, worker_id: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE workers SET status = 'paused', updated_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ValidationFailed(format!("unknown worker: {worker_id}")));
        }

        Ok(())
    }

    async fn active_workers_by_outcome(&self, outcome_id: Uuid) -> DomainResult<Vec<Worker>> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            r#"SELECT id, outcome_id, status, current_task_id, updated_at FROM workers
               WHERE outcome_id = ? AND status IN ('idle', 'working') ORDER BY id"#
        )
        .bind(outcome_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct WorkerRow {
    id: String,
    outcome_id: String,
    status: String,
    current_task_id: Option<String>,
    updated_at: String,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = DomainError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let status = WorkerStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid worker status: {}", row.status)))?;

        Ok(Worker {
            id: row.id,
            outcome_id: parse_uuid(&row.outcome_id)?,
            status,
            current_task_id: parse_optional_uuid(row.current_task_id)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
