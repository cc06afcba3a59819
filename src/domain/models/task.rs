//! Task domain model.
//!
//! Tasks are atomic units of worker-executable work inside one outcome.
//! They form a DAG through `depends_on`; a task is only claimable once every
//! dependency has completed and it is not paused by an open escalation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Marker prefixed to the description of a task paused by an escalation.
pub const PAUSED_MARKER: &str = "[PAUSED]";
/// Marker prefixed to the description of a task a human chose to skip.
pub const SKIPPED_MARKER: &str = "[SKIPPED BY HUMAN]";
/// Marker prefixed to the description of a task steering marked obsolete.
pub const OBSOLETE_MARKER: &str = "[OBSOLETE]";

/// Phase assigned to tasks when none is given.
pub const DEFAULT_PHASE: &str = "execution";

/// Default retry budget for new tasks.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Status of a task in the worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed (may still be blocked by dependencies or a pause)
    #[default]
    Pending,
    /// Claimed by a worker, not yet started
    Claimed,
    /// Currently being executed
    Running,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully, skipped, or made obsolete
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// One step more urgent, saturating at `Critical`.
    pub fn elevated(&self) -> Self {
        match self {
            Self::Low => Self::Normal,
            Self::Normal => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

/// A unit of work executed by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub outcome_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Attempts made so far.
    pub attempts: u32,
    /// Retry budget.
    pub max_attempts: u32,
    /// Tasks that must complete before this one can be claimed.
    pub depends_on: Vec<Uuid>,
    pub phase: String,
    /// Worker currently holding the claim.
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(outcome_id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            outcome_id,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Normal,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            depends_on: Vec::new(),
            phase: DEFAULT_PHASE.to_string(),
            claimed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    pub fn with_dependency(mut self, dependency: Uuid) -> Self {
        if dependency != self.id && !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_paused(&self) -> bool {
        self.description.starts_with(PAUSED_MARKER)
    }

    /// Pause a pending task by prefixing its description with the pause marker.
    ///
    /// Returns `true` if the task changed. Tasks that are not pending, or are
    /// already paused, are left untouched.
    pub fn pause(&mut self, reason: &str) -> bool {
        if self.status != TaskStatus::Pending || self.is_paused() {
            return false;
        }
        let reason = reason.replace(['\n', '\r'], " ");
        self.description = format!("{PAUSED_MARKER} {}\n\n{}", reason.trim(), self.description);
        self.touch();
        true
    }

    /// Strip the pause marker. Returns `true` if the task changed.
    pub fn resume(&mut self) -> bool {
        if !self.is_paused() {
            return false;
        }
        self.description = match self.description.find("\n\n") {
            Some(idx) => self.description[idx + 2..].to_string(),
            None => String::new(),
        };
        self.touch();
        true
    }

    /// Mark the task failed because a human chose to skip it.
    pub fn skip_by_human(&mut self) {
        self.resume();
        self.status = TaskStatus::Failed;
        self.claimed_by = None;
        self.description = format!("{SKIPPED_MARKER} {}", self.description);
        self.touch();
    }

    /// Mark the task failed because steering made it obsolete.
    pub fn mark_obsolete(&mut self, reason: &str) {
        self.status = TaskStatus::Failed;
        self.claimed_by = None;
        self.description = format!("{OBSOLETE_MARKER} {reason}\n\n{}", self.description);
        self.touch();
    }

    /// Description with any pause marker removed.
    pub fn working_description(&self) -> &str {
        if self.is_paused() {
            self.description
                .find("\n\n")
                .map_or("", |idx| &self.description[idx + 2..])
        } else {
            &self.description
        }
    }

    /// Whether a worker may claim this task, given the completed tasks of its outcome.
    pub fn is_claimable(&self, completed: &HashSet<Uuid>) -> bool {
        self.status == TaskStatus::Pending
            && !self.is_paused()
            && self.depends_on.iter().all(|dep| completed.contains(dep))
    }
}
