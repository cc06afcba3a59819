//! Activity log domain model.
//!
//! The activity log is the domain audit trail of supervision decisions.
//! Each entry carries a typed payload keyed by event kind so consumers never
//! re-parse prose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of activity entry, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Observation,
    Steering,
    Escalation,
    Resolution,
    AutoResolved,
    AutoResolveDeferred,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Steering => "steering",
            Self::Escalation => "escalation",
            Self::Resolution => "resolution",
            Self::AutoResolved => "auto_resolved",
            Self::AutoResolveDeferred => "auto_resolve_deferred",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "observation" => Some(Self::Observation),
            "steering" => Some(Self::Steering),
            "escalation" => Some(Self::Escalation),
            "resolution" => Some(Self::Resolution),
            "auto_resolved" => Some(Self::AutoResolved),
            "auto_resolve_deferred" => Some(Self::AutoResolveDeferred),
            _ => None,
        }
    }
}

/// Structured payload of an activity entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActivityDetails {
    Observed {
        task_id: Uuid,
        alignment_score: u8,
        quality: String,
        on_track: bool,
        drift_count: usize,
        discovery_count: usize,
    },
    Steered {
        task_id: Uuid,
        actions: Vec<String>,
        corrective_tasks: Vec<Uuid>,
        failures: Vec<String>,
    },
    EscalationCreated {
        escalation_id: Uuid,
        trigger_type: String,
        trigger_task_id: Uuid,
        affected_tasks: Vec<Uuid>,
        question: String,
    },
    FailurePatternDetected {
        pattern: String,
        recommendation: String,
        consecutive_failures: usize,
        average_alignment: f64,
        paused_workers: Vec<String>,
    },
    EscalationAnswered {
        escalation_id: Uuid,
        selected_option: String,
        actions: Vec<String>,
        resumed_tasks: Vec<Uuid>,
    },
    EscalationDismissed {
        escalation_id: Uuid,
        reason: Option<String>,
        resumed_tasks: Vec<Uuid>,
    },
    AutoResolved {
        escalation_id: Uuid,
        selected_option: String,
        confidence: f64,
        reasoning: String,
    },
    AutoResolveDeferred {
        escalation_id: Uuid,
        category: String,
        confidence: f64,
        reasoning: String,
    },
}

impl ActivityDetails {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Self::Observed { .. } => ActivityKind::Observation,
            Self::Steered { .. } => ActivityKind::Steering,
            Self::EscalationCreated { .. } | Self::FailurePatternDetected { .. } => ActivityKind::Escalation,
            Self::EscalationAnswered { .. } | Self::EscalationDismissed { .. } => ActivityKind::Resolution,
            Self::AutoResolved { .. } => ActivityKind::AutoResolved,
            Self::AutoResolveDeferred { .. } => ActivityKind::AutoResolveDeferred,
        }
    }
}

/// One entry of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub outcome_id: Uuid,
    pub kind: ActivityKind,
    pub summary: String,
    pub details: ActivityDetails,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(outcome_id: Uuid, summary: impl Into<String>, details: ActivityDetails) -> Self {
        Self {
            id: Uuid::new_v4(),
            outcome_id,
            kind: details.kind(),
            summary: summary.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// Page request for the activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    pub outcome_id: Option<Uuid>,
    pub kind: Option<ActivityKind>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            outcome_id: None,
            kind: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_derived_from_details() {
        let entry = ActivityEntry::new(
            Uuid::new_v4(),
            "deferred",
            ActivityDetails::AutoResolveDeferred {
                escalation_id: Uuid::new_v4(),
                category: "security".to_string(),
                confidence: 1.0,
                reasoning: "never auto-resolve security".to_string(),
            },
        );
        assert_eq!(entry.kind, ActivityKind::AutoResolveDeferred);
    }

    #[test]
    fn test_details_serialize_tagged() {
        let details = ActivityDetails::EscalationDismissed {
            escalation_id: Uuid::nil(),
            reason: None,
            resumed_tasks: vec![],
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["event"], "escalation_dismissed");
        let back: ActivityDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back, details);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(ActivityKind::from_str("auto-resolved"), Some(ActivityKind::AutoResolved));
        assert_eq!(ActivityKind::from_str("nope"), None);
    }
}
