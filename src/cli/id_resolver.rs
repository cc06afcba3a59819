//! Short ID prefix resolution for CLI arguments.
//!
//! Any unique prefix of a UUID is accepted in place of the full ID,
//! similar to git short hashes.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use std::fmt::Write as _;
use uuid::Uuid;

const OUTCOME_QUERY: &str = "SELECT id FROM outcomes WHERE id LIKE ?";
const TASK_QUERY: &str = "SELECT id FROM tasks WHERE id LIKE ?";
const ESCALATION_QUERY: &str = "SELECT id FROM escalations WHERE id LIKE ?";
const JOB_QUERY: &str = "SELECT id FROM analysis_jobs WHERE id LIKE ?";

pub async fn resolve_outcome_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "outcome", OUTCOME_QUERY).await
}

pub async fn resolve_task_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "task", TASK_QUERY).await
}

pub async fn resolve_escalation_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "escalation", ESCALATION_QUERY).await
}

pub async fn resolve_job_id(pool: &SqlitePool, prefix: &str) -> Result<Uuid> {
    resolve_prefix(pool, prefix, "analysis job", JOB_QUERY).await
}

/// Resolve an optional outcome argument.
pub async fn resolve_optional_outcome(pool: &SqlitePool, prefix: Option<&str>) -> Result<Option<Uuid>> {
    match prefix {
        Some(prefix) => Ok(Some(resolve_outcome_id(pool, prefix).await?)),
        None => Ok(None),
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ID prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        bail!("Invalid ID prefix '{prefix}': must contain only hex characters and dashes");
    }
    Ok(())
}

async fn resolve_prefix(pool: &SqlitePool, prefix: &str, entity: &str, query: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(prefix) {
        return Ok(uuid);
    }

    validate_prefix(prefix)?;

    let pattern = format!("{}%", prefix.to_lowercase());
    let rows: Vec<(String,)> = sqlx::query_as(query).bind(&pattern).fetch_all(pool).await?;

    match rows.as_slice() {
        [] => bail!("No {entity} found matching '{prefix}'"),
        [(id,)] => Ok(Uuid::parse_str(id)?),
        rows => {
            let mut msg = format!("Ambiguous prefix '{prefix}': matches {} {entity}s:", rows.len());
            for (id,) in rows {
                let _ = write!(msg, "\n  {id}");
            }
            bail!("{msg}")
        }
    }
}
