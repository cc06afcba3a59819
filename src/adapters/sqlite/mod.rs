//! SQLite persistence adapters for the supervision engine.

pub mod activity_repository;
pub mod analysis_job_repository;
pub mod connection;
pub mod context_repository;
pub mod escalation_repository;
pub mod migrations;
pub mod observation_repository;
pub mod outcome_repository;
pub mod task_repository;
pub mod worker_control;

pub use activity_repository::SqliteActivityRepository;
pub use analysis_job_repository::SqliteAnalysisJobRepository;
pub use connection::{create_pool, create_test_pool, database_url, verify_connection, ConnectionError, PoolConfig};
pub use context_repository::SqliteContextStoreRepository;
pub use escalation_repository::SqliteEscalationRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use observation_repository::SqliteObservationRepository;
pub use outcome_repository::SqliteOutcomeRepository;
pub use task_repository::SqliteTaskRepository;
pub use worker_control::SqliteWorkerControl;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Fixed-width RFC 3339 (microseconds, `Z`) so text order equals time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an optional UUID string from a SQLite row field.
pub fn parse_optional_uuid(s: Option<String>) -> DomainResult<Option<Uuid>> {
    s.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Parse a JSON column.
pub fn parse_json<T: DeserializeOwned>(s: &str) -> DomainResult<T> {
    serde_json::from_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse a nullable JSON column.
pub fn parse_optional_json<T: DeserializeOwned>(s: Option<String>) -> DomainResult<Option<T>> {
    s.map(|s| parse_json(&s)).transpose()
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open (creating if needed) a database and bring its schema up to date.
pub async fn initialize_database(database_url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_datetime_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let fractional = whole + chrono::Duration::microseconds(120);
        assert_eq!(format_datetime(&whole), "2024-01-02T03:04:05.000000Z");
        assert_eq!(format_datetime(&fractional).len(), format_datetime(&whole).len());
        assert!(format_datetime(&whole) < format_datetime(&fractional));
        assert_eq!(parse_datetime(&format_datetime(&fractional)).unwrap(), fractional);
    }
}
