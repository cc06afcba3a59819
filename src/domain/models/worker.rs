//! Worker model used by the worker-control boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Working,
    Paused,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "working" | "running" => Some(Self::Working),
            "paused" => Some(Self::Paused),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Working)
    }
}

/// An autonomous agent executing tasks for an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub outcome_id: Uuid,
    pub status: WorkerStatus,
    pub current_task_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(id: impl Into<String>, outcome_id: Uuid) -> Self {
        Self {
            id: id.into(),
            outcome_id,
            status: WorkerStatus::Idle,
            current_task_id: None,
            updated_at: Utc::now(),
        }
    }
}
