//! Escalation domain model.
//!
//! An escalation is a structured, answerable question that blocks one or
//! more tasks. Its state machine is `pending -> answered | dismissed`; both
//! end states are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::DecisionSource;
use crate::domain::errors::{DomainError, DomainResult};

/// Status of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    #[default]
    Pending,
    Answered,
    Dismissed,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Dismissed => "dismissed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "answered" => Some(Self::Answered),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Kind of ambiguity a worker ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityType {
    MultipleApproaches,
    UnclearRequirement,
    BlockingDecision,
    ConflictingRequirements,
    Other,
}

impl AmbiguityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleApproaches => "multiple_approaches",
            Self::UnclearRequirement => "unclear_requirement",
            Self::BlockingDecision => "blocking_decision",
            Self::ConflictingRequirements => "conflicting_requirements",
            Self::Other => "other",
        }
    }

    /// Lenient parse used for model output and stored rows.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "multiple_approaches" => Self::MultipleApproaches,
            "unclear_requirement" | "unclear_requirements" => Self::UnclearRequirement,
            "blocking_decision" => Self::BlockingDecision,
            "conflicting_requirements" | "conflicting_requirement" => Self::ConflictingRequirements,
            _ => Self::Other,
        }
    }
}

/// Typed effect applied to affected tasks when an option is chosen.
///
/// An option carries zero or more actions; an empty list records the
/// decision and resumes affected tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Extend the retry budget of affected tasks.
    IncreaseTurnLimit,
    /// Decompose affected tasks into subtasks.
    BreakIntoSubtasks,
    /// Mark affected tasks failed.
    SkipFailingTasks,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncreaseTurnLimit => "increase_turn_limit",
            Self::BreakIntoSubtasks => "break_into_subtasks",
            Self::SkipFailingTasks => "skip_failing_tasks",
        }
    }

    /// Parse a single action tag. `None` for unknown tags and for "none".
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "increase_turn_limit" | "increase_turns" | "retry" => Some(Self::IncreaseTurnLimit),
            "break_into_subtasks" | "decompose" => Some(Self::BreakIntoSubtasks),
            "skip_failing_tasks" | "skip" => Some(Self::SkipFailingTasks),
            _ => None,
        }
    }

    /// Infer actions for an option that carries no explicit tags.
    ///
    /// Every keyword family found in the id contributes its action, in
    /// application order: extend, decompose, skip.
    pub fn infer_from_option_id(option_id: &str) -> Vec<Self> {
        let id = option_id.to_lowercase();
        let mut actions = Vec::new();
        if id.contains("increase") || id.contains("turn_limit") || id.contains("retry") {
            actions.push(Self::IncreaseTurnLimit);
        }
        if id.contains("decompose") || id.contains("break") || id.contains("subtask") {
            actions.push(Self::BreakIntoSubtasks);
        }
        if id.contains("skip") {
            actions.push(Self::SkipFailingTasks);
        }
        actions
    }

    /// Parse model-provided action tags, falling back to id inference when
    /// no tag is given. An explicit "none" tag yields no actions.
    pub fn from_tags_or_id<S: AsRef<str>>(tags: &[S], option_id: &str) -> Vec<Self> {
        if tags.is_empty() {
            return Self::infer_from_option_id(option_id);
        }
        let explicit_none = tags.iter().any(|t| t.as_ref().trim().eq_ignore_ascii_case("none"));
        let parsed = normalize_actions(tags.iter().filter_map(|t| Self::parse_tag(t.as_ref())));
        if parsed.is_empty() && !explicit_none {
            return Self::infer_from_option_id(option_id);
        }
        parsed
    }
}

/// Deduplicate actions, keeping first occurrence order.
pub fn normalize_actions(actions: impl IntoIterator<Item = ResolutionAction>) -> Vec<ResolutionAction> {
    let mut out: Vec<ResolutionAction> = Vec::new();
    for action in actions {
        if !out.contains(&action) {
            out.push(action);
        }
    }
    out
}

/// One answer choice offered by an escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    pub description: String,
    pub implications: String,
    #[serde(default)]
    pub actions: Vec<ResolutionAction>,
}

impl QuestionOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = id.into();
        let actions = ResolutionAction::infer_from_option_id(&id);
        Self {
            id,
            label: label.into(),
            description: String::new(),
            implications: String::new(),
            actions,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_implications(mut self, implications: impl Into<String>) -> Self {
        self.implications = implications.into();
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = ResolutionAction>) -> Self {
        self.actions = normalize_actions(actions);
        self
    }

    pub fn has_action(&self, action: ResolutionAction) -> bool {
        self.actions.contains(&action)
    }

    /// Action names joined for display, "none" when empty.
    pub fn actions_label(&self) -> String {
        actions_label(&self.actions)
    }
}

pub fn actions_label(actions: &[ResolutionAction]) -> String {
    if actions.is_empty() {
        "none".to_string()
    } else {
        actions.iter().map(|a| a.as_str()).collect::<Vec<_>>().join("+")
    }
}

/// A detected ambiguity, normalized from model output or regex detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguitySignal {
    pub ambiguity_type: AmbiguityType,
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Options suggested alongside the ambiguity, possibly empty.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl AmbiguitySignal {
    pub fn new(ambiguity_type: AmbiguityType, description: impl Into<String>) -> Self {
        Self {
            ambiguity_type,
            description: description.into(),
            evidence: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }
}

/// What raised the escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTrigger {
    pub trigger_type: AmbiguityType,
    pub task_id: Uuid,
    pub evidence: Vec<String>,
}

/// The question presented to the human (or auto-resolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationQuestion {
    pub text: String,
    pub context: String,
    pub options: Vec<QuestionOption>,
}

/// The recorded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationAnswer {
    pub selected_option: String,
    pub additional_context: Option<String>,
    pub answered_by: DecisionSource,
    pub answered_at: DateTime<Utc>,
}

/// A structured question blocking one or more tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub outcome_id: Uuid,
    pub status: EscalationStatus,
    pub trigger: EscalationTrigger,
    pub question: EscalationQuestion,
    pub affected_tasks: Vec<Uuid>,
    pub answer: Option<EscalationAnswer>,
    pub dismiss_reason: Option<String>,
    /// Outcome this escalation was folded into by an improvement analysis.
    pub incorporated_into: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escalation {
    pub fn new(
        outcome_id: Uuid,
        trigger: EscalationTrigger,
        question: EscalationQuestion,
        affected_tasks: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            outcome_id,
            status: EscalationStatus::Pending,
            trigger,
            question,
            affected_tasks,
            answer: None,
            dismiss_reason: None,
            incorporated_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == EscalationStatus::Pending
    }

    pub fn option(&self, option_id: &str) -> Option<&QuestionOption> {
        self.question.options.iter().find(|o| o.id == option_id)
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(DomainError::EscalationNotPending {
                id: self.id,
                status: self.status.as_str().to_string(),
            })
        }
    }

    /// Check that `option_id` may be selected, without changing anything.
    pub fn validate_answer(&self, option_id: &str) -> DomainResult<&QuestionOption> {
        self.ensure_pending()?;
        self.option(option_id).ok_or_else(|| DomainError::InvalidOption {
            escalation_id: self.id,
            option: option_id.to_string(),
        })
    }

    /// Transition `pending -> answered`.
    pub fn answer(
        &mut self,
        option_id: &str,
        additional_context: Option<String>,
        answered_by: DecisionSource,
    ) -> DomainResult<QuestionOption> {
        let option = self.validate_answer(option_id)?.clone();
        let now = Utc::now();
        self.status = EscalationStatus::Answered;
        self.answer = Some(EscalationAnswer {
            selected_option: option.id.clone(),
            additional_context: additional_context.filter(|c| !c.trim().is_empty()),
            answered_by,
            answered_at: now,
        });
        self.updated_at = now;
        Ok(option)
    }

    /// Transition `pending -> dismissed`.
    pub fn dismiss(&mut self, reason: Option<String>) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = EscalationStatus::Dismissed;
        self.dismiss_reason = reason;
        self.updated_at = Utc::now();
        Ok(())
    }
}
