//! SQLite implementation of the AnalysisJobRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json, parse_optional_datetime, parse_optional_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AnalysisJob, JobStatus};
use crate::domain::ports::AnalysisJobRepository;

const JOB_COLUMNS: &str = "id, status, options, progress, result, error, created_at, started_at, completed_at, updated_at";

#[derive(Clone)]
pub struct SqliteAnalysisJobRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisJobRepository for SqliteAnalysisJobRepository {
    async fn create(&self, job: &AnalysisJob) -> DomainResult<()> {
        let options = serde_json::to_string(&job.options)?;
        let result = job.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO analysis_jobs (id, status, options, progress, result, error, created_at,
               started_at, completed_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(job.id.to_string())
        .bind(job.status.as_str())
        .bind(&options)
        .bind(&job.progress)
        .bind(&result)
        .bind(&job.error)
        .bind(format_datetime(&job.created_at))
        .bind(job.started_at.as_ref().map(format_datetime))
        .bind(job.completed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&job.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AnalysisJob>> {
        let row: Option<JobRow> = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, job: &AnalysisJob) -> DomainResult<()> {
        let result_json = job.result.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE analysis_jobs SET status = ?, progress = ?, result = ?, error = ?,
               started_at = ?, completed_at = ?, updated_at = ?
               WHERE id = ?"#
        )
        .bind(job.status.as_str())
        .bind(&job.progress)
        .bind(&result_json)
        .bind(&job.error)
        .bind(job.started_at.as_ref().map(format_datetime))
        .bind(job.completed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&job.updated_at))
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AnalysisJobNotFound(job.id));
        }

        Ok(())
    }

    async fn list_active(&self) -> DomainResult<Vec<AnalysisJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE status IN ('pending', 'running') ORDER BY created_at, rowid"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<AnalysisJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM analysis_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    status: String,
    options: String,
    progress: String,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
}

impl TryFrom<JobRow> for AnalysisJob {
    type Error = DomainError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid job status: {}", row.status)))?;

        Ok(AnalysisJob {
            id: parse_uuid(&row.id)?,
            status,
            options: parse_json(&row.options)?,
            progress: row.progress,
            result: parse_optional_json(row.result)?,
            error: row.error,
            created_at: parse_datetime(&row.created_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
