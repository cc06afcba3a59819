//! SQLite implementation of the ObservationRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json, parse_optional_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Observation, QualityTier};
use crate::domain::ports::ObservationRepository;

const OBSERVATION_COLUMNS: &str = "id, outcome_id, task_id, on_track, alignment_score, quality, summary, drift, discoveries, quality_issues, ambiguity, created_at";

#[derive(Clone)]
pub struct SqliteObservationRepository {
    pool: SqlitePool,
}

impl SqliteObservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObservationRepository for SqliteObservationRepository {
    async fn create(&self, observation: &Observation) -> DomainResult<()> {
        let drift = serde_json::to_string(&observation.drift)?;
        let discoveries = serde_json::to_string(&observation.discoveries)?;
        let issues = serde_json::to_string(&observation.quality_issues)?;
        let ambiguity = observation
            .ambiguity
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO observations (id, outcome_id, task_id, on_track, alignment_score, quality,
               summary, drift, discoveries, quality_issues, ambiguity, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(observation.id.to_string())
        .bind(observation.outcome_id.to_string())
        .bind(observation.task_id.to_string())
        .bind(observation.on_track)
        .bind(i64::from(observation.alignment_score))
        .bind(observation.quality.as_str())
        .bind(&observation.summary)
        .bind(&drift)
        .bind(&discoveries)
        .bind(&issues)
        .bind(&ambiguity)
        .bind(format_datetime(&observation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Observation>> {
        let row: Option<ObservationRow> =
            sqlx::query_as(&format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_recent(&self, outcome_id: Uuid, limit: usize) -> DomainResult<Vec<Observation>> {
        let rows: Vec<ObservationRow> = sqlx::query_as(&format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE outcome_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(outcome_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Observation>> {
        let rows: Vec<ObservationRow> = sqlx::query_as(&format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE task_id = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: String,
    outcome_id: String,
    task_id: String,
    on_track: bool,
    alignment_score: i64,
    quality: String,
    summary: String,
    drift: String,
    discoveries: String,
    quality_issues: String,
    ambiguity: Option<String>,
    created_at: String,
}

impl TryFrom<ObservationRow> for Observation {
    type Error = DomainError;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        #[allow(clippy::cast_precision_loss)]
        let alignment_score = Observation::clamp_alignment(row.alignment_score as f64);

        Ok(Observation {
            id: parse_uuid(&row.id)?,
            outcome_id: parse_uuid(&row.outcome_id)?,
            task_id: parse_uuid(&row.task_id)?,
            on_track: row.on_track,
            alignment_score,
            quality: QualityTier::parse_lenient(&row.quality),
            summary: row.summary,
            drift: parse_json(&row.drift)?,
            discoveries: parse_json(&row.discoveries)?,
            quality_issues: parse_json(&row.quality_issues)?,
            ambiguity: parse_optional_json(row.ambiguity)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
