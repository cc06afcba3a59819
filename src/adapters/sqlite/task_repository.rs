//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskPriority, TaskStatus, PAUSED_MARKER};
use crate::domain::ports::{TaskFilter, TaskRepository};

const TASK_COLUMNS: &str = "id, outcome_id, title, description, status, priority, attempts, max_attempts, phase, claimed_by, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO tasks (id, outcome_id, title, description, status, priority, attempts,
               max_attempts, phase, claimed_by, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(task.id.to_string())
        .bind(task.outcome_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority as i64)
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_attempts))
        .bind(&task.phase)
        .bind(&task.claimed_by)
        .bind(format_datetime(&task.created_at))
        .bind(format_datetime(&task.updated_at))
        .execute(&self.pool)
        .await?;

        for dep_id in &task.depends_on {
            self.add_dependency(task.id, *dep_id).await?;
        }

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let mut task: Task = r.try_into()?;
                self.load_dependencies(&mut task).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?, attempts = ?,
               max_attempts = ?, phase = ?, claimed_by = ?, updated_at = ?
               WHERE id = ?"#
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority as i64)
        .bind(i64::from(task.attempts))
        .bind(i64::from(task.max_attempts))
        .bind(&task.phase)
        .bind(&task.claimed_by)
        .bind(format_datetime(&task.updated_at))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? OR depends_on_id = ?")
            .bind(id.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(outcome_id) = &filter.outcome_id {
            query.push_str(" AND outcome_id = ?");
            bindings.push(outcome_id.to_string());
        }

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at, rowid");

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task: Task = row.try_into()?;
            self.load_dependencies(&mut task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn add_dependency(&self, task_id: Uuid, depends_on: Uuid) -> DomainResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id, created_at) VALUES (?, ?, ?)"
        )
        .bind(task_id.to_string())
        .bind(depends_on.to_string())
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_dependency(&self, task_id: Uuid, depends_on: Uuid) -> DomainResult<bool> {
        let result = sqlx::query(
            "DELETE FROM task_dependencies WHERE task_id = ? AND depends_on_id = ?"
        )
        .bind(task_id.to_string())
        .bind(depends_on.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_dependents(&self, task_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT t.id, t.outcome_id, t.title, t.description, t.status, t.priority, t.attempts,
               t.max_attempts, t.phase, t.claimed_by, t.created_at, t.updated_at
               FROM tasks t
               INNER JOIN task_dependencies d ON t.id = d.task_id
               WHERE d.depends_on_id = ?
               ORDER BY t.created_at, t.rowid"#
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task: Task = row.try_into()?;
            self.load_dependencies(&mut task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn claim(&self, task_id: Uuid, worker_id: &str) -> DomainResult<bool> {
        // Single statement so the claimability check and the claim are atomic.
        let result = sqlx::query(
            r#"UPDATE tasks SET status = 'claimed', claimed_by = ?, attempts = attempts + 1, updated_at = ?
               WHERE id = ?
                 AND status = 'pending'
                 AND substr(description, 1, ?) != ?
                 AND NOT EXISTS (
                     SELECT 1 FROM task_dependencies d
                     INNER JOIN tasks dep ON dep.id = d.depends_on_id
                     WHERE d.task_id = tasks.id AND dep.status != 'completed'
                 )"#
        )
        .bind(worker_id)
        .bind(format_datetime(&Utc::now()))
        .bind(task_id.to_string())
        .bind(PAUSED_MARKER.len() as i64)
        .bind(PAUSED_MARKER)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

impl SqliteTaskRepository {
    async fn load_dependencies(&self, task: &mut Task) -> DomainResult<()> {
        let deps: Vec<(String,)> = sqlx::query_as(
            "SELECT depends_on_id FROM task_dependencies WHERE task_id = ? ORDER BY created_at, rowid"
        )
        .bind(task.id.to_string())
        .fetch_all(&self.pool)
        .await?;

        task.depends_on = deps
            .iter()
            .map(|(id,)| parse_uuid(id))
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(())
    }
}

fn priority_from_level(level: i64) -> Option<TaskPriority> {
    match level {
        1 => Some(TaskPriority::Low),
        2 => Some(TaskPriority::Normal),
        3 => Some(TaskPriority::High),
        4 => Some(TaskPriority::Critical),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    outcome_id: String,
    title: String,
    description: String,
    status: String,
    priority: i64,
    attempts: i64,
    max_attempts: i64,
    phase: String,
    claimed_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let priority = priority_from_level(row.priority)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid priority: {}", row.priority)))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let max_attempts = u32::try_from(row.max_attempts)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            outcome_id: parse_uuid(&row.outcome_id)?,
            title: row.title,
            description: row.description,
            status,
            priority,
            attempts,
            max_attempts,
            depends_on: Vec::new(),
            phase: row.phase,
            claimed_by: row.claimed_by,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteOutcomeRepository};
    use crate::domain::models::Outcome;
    use crate::domain::ports::OutcomeRepository;

    async fn setup() -> (SqliteTaskRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Test", "Test outcome");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        (SqliteTaskRepository::new(pool), outcome.id)
    }

    #[tokio::test]
    async fn test_create_and_get_with_dependencies() {
        let (repo, outcome_id) = setup().await;
        let dep = Task::new(outcome_id, "Dep", "first");
        repo.create(&dep).await.unwrap();
        let task = Task::new(outcome_id, "Main", "second")
            .with_priority(TaskPriority::High)
            .with_dependency(dep.id);
        repo.create(&task).await.unwrap();

        let loaded = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.depends_on, vec![dep.id]);
        assert_eq!(loaded.priority, TaskPriority::High);

        let dependents = repo.get_dependents(dep.id).await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, task.id);
    }

    #[tokio::test]
    async fn test_edges_are_idempotent() {
        let (repo, outcome_id) = setup().await;
        let a = Task::new(outcome_id, "A", "");
        let b = Task::new(outcome_id, "B", "");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        assert!(repo.add_dependency(a.id, b.id).await.unwrap());
        assert!(!repo.add_dependency(a.id, b.id).await.unwrap());
        assert_eq!(repo.get(a.id).await.unwrap().unwrap().depends_on.len(), 1);

        assert!(repo.remove_dependency(a.id, b.id).await.unwrap());
        assert!(!repo.remove_dependency(a.id, b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_prunes_edges() {
        let (repo, outcome_id) = setup().await;
        let dep = Task::new(outcome_id, "Dep", "");
        repo.create(&dep).await.unwrap();
        let task = Task::new(outcome_id, "Main", "").with_dependency(dep.id);
        repo.create(&task).await.unwrap();

        repo.delete(dep.id).await.unwrap();
        assert!(repo.get(task.id).await.unwrap().unwrap().depends_on.is_empty());
        assert!(matches!(repo.delete(dep.id).await, Err(DomainError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_claim_respects_dependencies_and_pause() {
        let (repo, outcome_id) = setup().await;
        let dep = Task::new(outcome_id, "Dep", "");
        repo.create(&dep).await.unwrap();
        let task = Task::new(outcome_id, "Main", "").with_dependency(dep.id);
        repo.create(&task).await.unwrap();

        assert!(!repo.claim(task.id, "w1").await.unwrap());

        let mut done = dep.clone();
        done.status = TaskStatus::Completed;
        repo.update(&done).await.unwrap();

        let mut paused = repo.get(task.id).await.unwrap().unwrap();
        paused.pause("waiting for answer");
        repo.update(&paused).await.unwrap();
        assert!(!repo.claim(task.id, "w1").await.unwrap());

        paused.resume();
        repo.update(&paused).await.unwrap();
        assert!(repo.claim(task.id, "w1").await.unwrap());
        assert!(!repo.claim(task.id, "w2").await.unwrap());

        let claimed = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Claimed);
        assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (repo, outcome_id) = setup().await;
        repo.create(&Task::new(outcome_id, "A", "")).await.unwrap();
        repo.create(&Task::new(outcome_id, "B", "").with_status(TaskStatus::Completed)).await.unwrap();

        assert_eq!(repo.list(TaskFilter::outcome(outcome_id)).await.unwrap().len(), 2);
        let pending = repo.list(TaskFilter::pending_in(outcome_id)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "A");
    }
}
