//! SQLite implementation of the ActivityRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime, parse_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivityEntry, ActivityKind, ActivityQuery};
use crate::domain::ports::ActivityRepository;

#[derive(Clone)]
pub struct SqliteActivityRepository {
    pool: SqlitePool,
}

impl SqliteActivityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for SqliteActivityRepository {
    async fn append(&self, entry: &ActivityEntry) -> DomainResult<()> {
        let details = serde_json::to_string(&entry.details)?;

        sqlx::query(
            "INSERT INTO activity_log (id, outcome_id, kind, summary, details, created_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(entry.id.to_string())
        .bind(entry.outcome_id.to_string())
        .bind(entry.kind.as_str())
        .bind(&entry.summary)
        .bind(&details)
        .bind(format_datetime(&entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, query: &ActivityQuery) -> DomainResult<Vec<ActivityEntry>> {
        let mut sql = String::from(
            "SELECT id, outcome_id, kind, summary, details, created_at FROM activity_log WHERE 1=1"
        );
        let mut bindings: Vec<String> = Vec::new();

        if let Some(outcome_id) = &query.outcome_id {
            sql.push_str(" AND outcome_id = ?");
            bindings.push(outcome_id.to_string());
        }
        if let Some(kind) = &query.kind {
            sql.push_str(" AND kind = ?");
            bindings.push(kind.as_str().to_string());
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, ActivityRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }
        q = q
            .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows: Vec<ActivityRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    outcome_id: String,
    kind: String,
    summary: String,
    details: String,
    created_at: String,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = DomainError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let kind = ActivityKind::from_str(&row.kind)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid activity kind: {}", row.kind)))?;

        Ok(ActivityEntry {
            id: parse_uuid(&row.id)?,
            outcome_id: parse_uuid(&row.outcome_id)?,
            kind,
            summary: row.summary,
            details: parse_json(&row.details)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
