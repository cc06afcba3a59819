//! SQLite implementation of the EscalationRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json, parse_optional_json, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AmbiguityType, Escalation, EscalationQuestion, EscalationStatus, EscalationTrigger,
};
use crate::domain::ports::{EscalationFilter, EscalationRepository};

const ESCALATION_COLUMNS: &str = "id, outcome_id, status, trigger_type, trigger_task_id, trigger_evidence, question_text, question_context, question_options, affected_tasks, answer, dismiss_reason, incorporated_into, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteEscalationRepository {
    pool: SqlitePool,
}

impl SqliteEscalationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn filter_clause(filter: &EscalationFilter) -> (String, Vec<String>) {
    let mut clause = String::from(" WHERE 1=1");
    let mut bindings = Vec::new();

    if let Some(outcome_id) = &filter.outcome_id {
        clause.push_str(" AND outcome_id = ?");
        bindings.push(outcome_id.to_string());
    }
    if let Some(status) = &filter.status {
        clause.push_str(" AND status = ?");
        bindings.push(status.as_str().to_string());
    }
    if let Some(since) = &filter.since {
        clause.push_str(" AND created_at >= ?");
        bindings.push(format_datetime(since));
    }
    if filter.exclude_incorporated {
        clause.push_str(" AND incorporated_into IS NULL");
    }

    (clause, bindings)
}

#[async_trait]
impl EscalationRepository for SqliteEscalationRepository {
    async fn create(&self, escalation: &Escalation) -> DomainResult<()> {
        let evidence = serde_json::to_string(&escalation.trigger.evidence)?;
        let options = serde_json::to_string(&escalation.question.options)?;
        let affected = serde_json::to_string(&escalation.affected_tasks)?;
        let answer = escalation.answer.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO escalations (id, outcome_id, status, trigger_type, trigger_task_id,
               trigger_evidence, question_text, question_context, question_options, affected_tasks,
               answer, dismiss_reason, incorporated_into, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(escalation.id.to_string())
        .bind(escalation.outcome_id.to_string())
        .bind(escalation.status.as_str())
        .bind(escalation.trigger.trigger_type.as_str())
        .bind(escalation.trigger.task_id.to_string())
        .bind(&evidence)
        .bind(&escalation.question.text)
        .bind(&escalation.question.context)
        .bind(&options)
        .bind(&affected)
        .bind(&answer)
        .bind(&escalation.dismiss_reason)
        .bind(escalation.incorporated_into.map(|id| id.to_string()))
        .bind(format_datetime(&escalation.created_at))
        .bind(format_datetime(&escalation.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Escalation>> {
        let row: Option<EscalationRow> =
            sqlx::query_as(&format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, escalation: &Escalation) -> DomainResult<()> {
        let options = serde_json::to_string(&escalation.question.options)?;
        let affected = serde_json::to_string(&escalation.affected_tasks)?;
        let answer = escalation.answer.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE escalations SET status = ?, question_text = ?, question_context = ?,
               question_options = ?, affected_tasks = ?, answer = ?, dismiss_reason = ?,
               incorporated_into = ?, updated_at = ?
               WHERE id = ?"#
        )
        .bind(escalation.status.as_str())
        .bind(&escalation.question.text)
        .bind(&escalation.question.context)
        .bind(&options)
        .bind(&affected)
        .bind(&answer)
        .bind(&escalation.dismiss_reason)
        .bind(escalation.incorporated_into.map(|id| id.to_string()))
        .bind(format_datetime(&escalation.updated_at))
        .bind(escalation.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EscalationNotFound(escalation.id));
        }

        Ok(())
    }

    async fn list(&self, filter: EscalationFilter) -> DomainResult<Vec<Escalation>> {
        let (clause, bindings) = filter_clause(&filter);
        let query = format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalations{clause} ORDER BY created_at DESC, rowid DESC"
        );

        let mut q = sqlx::query_as::<_, EscalationRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<EscalationRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(&self, filter: EscalationFilter) -> DomainResult<u64> {
        let (clause, bindings) = filter_clause(&filter);
        let query = format!("SELECT COUNT(*) FROM escalations{clause}");

        let mut q = sqlx::query_as::<_, (i64,)>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let (count,) = q.fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn mark_incorporated(&self, ids: &[Uuid], outcome_id: Uuid) -> DomainResult<u64> {
        let now = format_datetime(&Utc::now());
        let mut changed = 0;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            let result = sqlx::query(
                "UPDATE escalations SET incorporated_into = ?, updated_at = ? WHERE id = ?"
            )
            .bind(outcome_id.to_string())
            .bind(&now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }
}

#[derive(sqlx::FromRow)]
struct EscalationRow {
    id: String,
    outcome_id: String,
    status: String,
    trigger_type: String,
    trigger_task_id: String,
    trigger_evidence: String,
    question_text: String,
    question_context: String,
    question_options: String,
    affected_tasks: String,
    answer: Option<String>,
    dismiss_reason: Option<String>,
    incorporated_into: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EscalationRow> for Escalation {
    type Error = DomainError;

    fn try_from(row: EscalationRow) -> Result<Self, Self::Error> {
        let status = EscalationStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid escalation status: {}", row.status)))?;

        Ok(Escalation {
            id: parse_uuid(&row.id)?,
            outcome_id: parse_uuid(&row.outcome_id)?,
            status,
            trigger: EscalationTrigger {
                trigger_type: AmbiguityType::parse_lenient(&row.trigger_type),
                task_id: parse_uuid(&row.trigger_task_id)?,
                evidence: parse_json(&row.trigger_evidence)?,
            },
            question: EscalationQuestion {
                text: row.question_text,
                context: row.question_context,
                options: parse_json(&row.question_options)?,
            },
            affected_tasks: parse_json(&row.affected_tasks)?,
            answer: parse_optional_json(row.answer)?,
            dismiss_reason: row.dismiss_reason,
            incorporated_into: parse_optional_uuid(row.incorporated_into)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteOutcomeRepository};
    use crate::domain::models::{DecisionSource, Outcome, QuestionOption};
    use crate::domain::ports::OutcomeRepository;

    fn escalation(outcome_id: Uuid) -> Escalation {
        let task = Uuid::new_v4();
        Escalation::new(
            outcome_id,
            EscalationTrigger {
                trigger_type: AmbiguityType::UnclearRequirement,
                task_id: task,
                evidence: vec!["unclear".to_string()],
            },
            EscalationQuestion {
                text: "What should the limit be?".to_string(),
                context: "ctx".to_string(),
                options: vec![
                    QuestionOption::new("ten", "Ten"),
                    QuestionOption::new("skip", "Skip"),
                ],
            },
            vec![task],
        )
    }

    async fn setup() -> (SqliteEscalationRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Test", "Test outcome");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        (SqliteEscalationRepository::new(pool), outcome.id)
    }

    #[tokio::test]
    async fn test_roundtrip_with_answer() {
        let (repo, outcome_id) = setup().await;
        let mut e = escalation(outcome_id);
        repo.create(&e).await.unwrap();

        e.answer("ten", Some("keep it small".to_string()), DecisionSource::Human).unwrap();
        repo.update(&e).await.unwrap();

        let loaded = repo.get(e.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, EscalationStatus::Answered);
        assert_eq!(loaded.answer, e.answer);
        assert_eq!(loaded.trigger, e.trigger);
        assert_eq!(loaded.question, e.question);
        assert_eq!(loaded.affected_tasks, e.affected_tasks);
    }

    #[tokio::test]
    async fn test_filters_and_incorporation() {
        let (repo, outcome_id) = setup().await;
        let a = escalation(outcome_id);
        let mut b = escalation(outcome_id);
        b.dismiss(None).unwrap();
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        assert_eq!(repo.count(EscalationFilter::pending(Some(outcome_id))).await.unwrap(), 1);
        assert_eq!(repo.list(EscalationFilter::default()).await.unwrap()[0].id, b.id);

        assert_eq!(repo.mark_incorporated(&[a.id], outcome_id).await.unwrap(), 1);
        let remaining = repo
            .list(EscalationFilter {
                exclude_incorporated: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }
}
