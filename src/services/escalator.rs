//! Escalator: turns a detected ambiguity into a structured question,
//! pauses the affected tasks, and applies the chosen resolution.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::affinity::TaskAffinity;
use super::context_store::ContextStoreService;
use super::extract_json_from_response;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    truncate_chars, ActivityDetails, ActivityEntry, AmbiguitySignal, AmbiguityType,
    CompletionRequest, ContextInjection, Decision, DecisionSource, Escalation, EscalationQuestion,
    EscalationTrigger, InjectionPriority, InjectionTarget, QuestionOption, ResolutionAction,
    StatCounter, Task, TaskStatus, COMPONENT_KEY, DEFAULT_COMPLETION_TIMEOUT_MS,
};
use crate::domain::ports::{
    ActivityRepository, CompletionService, EscalationFilter, EscalationRepository,
    OutcomeRepository, TaskDecomposer, TaskFilter, TaskRepository,
};

static MULTIPLIER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*x\b").ok());

const MAX_OPTIONS: usize = 4;

/// A question option as produced by a model, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOption {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    implications: String,
    #[serde(default, alias = "actions")]
    action: Option<ActionTags>,
}

/// Action tags as a single string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ActionTags {
    One(String),
    Many(Vec<String>),
}

impl ActionTags {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(tag) => tag.split([',', '+']).map(str::to_string).collect(),
            Self::Many(tags) => tags,
        }
    }
}

impl RawOption {
    pub(crate) fn into_option(self) -> QuestionOption {
        let id = if self.id.trim().is_empty() {
            slug(&self.label)
        } else {
            self.id.trim().to_string()
        };
        let label = if self.label.trim().is_empty() { id.clone() } else { self.label };
        let tags = self.action.map(ActionTags::into_vec).unwrap_or_default();
        let actions = ResolutionAction::from_tags_or_id(tags.as_slice(), &id);
        QuestionOption::new(id, label)
            .with_description(self.description)
            .with_implications(self.implications)
            .with_actions(actions)
    }
}

fn slug(label: &str) -> String {
    label
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    options: Vec<RawOption>,
}

/// Two-option question used when no better one is available.
pub fn default_question(ambiguity: &AmbiguitySignal) -> EscalationQuestion {
    let text = if ambiguity.description.trim().is_empty() {
        "A worker needs guidance before continuing. How should work proceed?".to_string()
    } else {
        format!("{} How should work proceed?", ambiguity.description.trim())
    };
    EscalationQuestion {
        text,
        context: ambiguity.evidence.join("\n"),
        options: vec![
            QuestionOption::new("proceed", "Proceed as-is")
                .with_description("Continue with the worker's current approach")
                .with_implications("Work resumes immediately; the ambiguity may resurface later"),
            QuestionOption::new("stop_and_review", "Stop and review")
                .with_description("Record that a human will review before more work is built on this")
                .with_implications("Affected tasks resume with a note to keep changes minimal"),
        ],
    }
}

/// Retry-budget multiplier from free text like "give it 3x", default 2.
pub fn parse_turn_multiplier(additional_context: Option<&str>) -> u32 {
    additional_context
        .and_then(|ctx| {
            MULTIPLIER_PATTERN
                .as_ref()?
                .captures(ctx)?
                .get(1)?
                .as_str()
                .parse::<u32>()
                .ok()
        })
        .filter(|m| *m >= 1)
        .unwrap_or(2)
}

/// New retry budget: `old * multiplier`, at least `old + 5`.
pub fn extended_budget(old: u32, multiplier: u32) -> u32 {
    old.saturating_mul(multiplier).max(old.saturating_add(5))
}

/// Per-task result of applying a resolution action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub task_id: Uuid,
    pub success: bool,
    pub detail: String,
}

/// What resolving an escalation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub escalation_id: Uuid,
    pub selected_option: String,
    pub actions: Vec<ResolutionAction>,
    pub action_results: Vec<ActionOutcome>,
    pub resumed_tasks: Vec<Uuid>,
    pub skipped_tasks: Vec<Uuid>,
    pub decomposed_tasks: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct EscalatorConfig {
    pub timeout_ms: u64,
}

impl Default for EscalatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
        }
    }
}

pub struct Escalator {
    outcomes: Arc<dyn OutcomeRepository>,
    tasks: Arc<dyn TaskRepository>,
    escalations: Arc<dyn EscalationRepository>,
    activity: Arc<dyn ActivityRepository>,
    context: ContextStoreService,
    completion: Arc<dyn CompletionService>,
    decomposer: Arc<dyn TaskDecomposer>,
    affinity: Arc<dyn TaskAffinity>,
    config: EscalatorConfig,
}

impl Escalator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        outcomes: Arc<dyn OutcomeRepository>,
        tasks: Arc<dyn TaskRepository>,
        escalations: Arc<dyn EscalationRepository>,
        activity: Arc<dyn ActivityRepository>,
        context: ContextStoreService,
        completion: Arc<dyn CompletionService>,
        decomposer: Arc<dyn TaskDecomposer>,
        affinity: Arc<dyn TaskAffinity>,
        config: EscalatorConfig,
    ) -> Self {
        Self {
            outcomes,
            tasks,
            escalations,
            activity,
            context,
            completion,
            decomposer,
            affinity,
            config,
        }
    }

    pub async fn get(&self, escalation_id: Uuid) -> DomainResult<Escalation> {
        self.escalations
            .get(escalation_id)
            .await?
            .ok_or(DomainError::EscalationNotFound(escalation_id))
    }

    pub async fn list_pending(&self, outcome_id: Option<Uuid>) -> DomainResult<Vec<Escalation>> {
        self.escalations.list(EscalationFilter::pending(outcome_id)).await
    }

    /// Trigger task first, then every other task the ambiguity reaches.
    pub async fn affected_tasks(&self, ambiguity_type: AmbiguityType, trigger: &Task) -> DomainResult<Vec<Uuid>> {
        let pending = self.tasks.list(TaskFilter::pending_in(trigger.outcome_id)).await?;
        let mut affected = vec![trigger.id];
        for task in pending.iter().filter(|t| t.id != trigger.id) {
            if ambiguity_type == AmbiguityType::BlockingDecision || self.affinity.is_related(trigger, task) {
                affected.push(task.id);
            }
        }
        Ok(affected)
    }

    async fn generate_question(&self, ambiguity: &AmbiguitySignal, trigger: &Task, intent: &str) -> EscalationQuestion {
        let prompt = format!(
            r#"A worker executing a task hit an ambiguity that needs a human decision.

## Outcome intent
{intent}

## Task
Title: {title}
Description: {description}

## Ambiguity ({kind})
{ambiguity}

## Evidence
{evidence}

Write one clear question for a human with 2 to 4 distinct options.
If an option means retrying with a bigger budget, splitting the task, or
skipping it, tag it with every matching action; otherwise leave
"actions" empty.

Respond with a JSON object:
```json
{{
  "question": "...",
  "context": "what the human needs to know",
  "options": [{{"id": "short_snake_case_id", "label": "...", "description": "...", "implications": "...", "actions": ["increase_turn_limit" | "break_into_subtasks" | "skip_failing_tasks"]}}]
}}
```

IMPORTANT: Output ONLY the JSON object, no other text."#,
            intent = truncate_chars(intent, 2_000),
            title = trigger.title,
            description = truncate_chars(trigger.working_description(), 2_000),
            kind = ambiguity.ambiguity_type.as_str(),
            ambiguity = ambiguity.description,
            evidence = ambiguity.evidence.join("\n"),
        );
        let request = CompletionRequest::new(prompt)
            .with_timeout_ms(self.config.timeout_ms)
            .with_metadata(COMPONENT_KEY, "escalator")
            .with_metadata("task_id", trigger.id.to_string());

        let text = match self.completion.complete(request).await {
            Ok(response) => response.text,
            Err(e) => {
                warn!(task_id = %trigger.id, error = %e, "question generation failed, using default");
                return default_question(ambiguity);
            }
        };

        let raw: RawQuestion = match serde_json::from_str(&extract_json_from_response(&text)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id = %trigger.id, error = %e, "question generation returned malformed JSON");
                return default_question(ambiguity);
            }
        };

        let mut options: Vec<QuestionOption> = Vec::new();
        for option in raw.options.into_iter().map(RawOption::into_option) {
            if !option.id.is_empty() && options.iter().all(|o| o.id != option.id) {
                options.push(option);
            }
        }
        options.truncate(MAX_OPTIONS);
        if options.len() < 2 || raw.question.trim().is_empty() {
            warn!(task_id = %trigger.id, "generated question unusable, using default");
            return default_question(ambiguity);
        }
        EscalationQuestion {
            text: raw.question,
            context: raw.context,
            options,
        }
    }

    /// Pause pending tasks; returns the ids that changed.
    async fn pause_tasks(&self, task_ids: &[Uuid], reason: &str) -> DomainResult<Vec<Uuid>> {
        let mut paused = Vec::new();
        for &id in task_ids {
            let Some(mut task) = self.tasks.get(id).await? else {
                continue;
            };
            if task.pause(reason) {
                self.tasks.update(&task).await?;
                paused.push(id);
            }
        }
        Ok(paused)
    }

    /// Strip pause markers; returns the ids that changed.
    async fn resume_tasks(&self, task_ids: &[Uuid]) -> DomainResult<Vec<Uuid>> {
        let mut resumed = Vec::new();
        for &id in task_ids {
            let Some(mut task) = self.tasks.get(id).await? else {
                continue;
            };
            if task.resume() {
                self.tasks.update(&task).await?;
                resumed.push(id);
            }
        }
        Ok(resumed)
    }

    /// Create an escalation for `ambiguity` raised by `trigger` and pause
    /// every affected pending task before returning.
    #[instrument(skip_all, fields(outcome_id = %outcome_id, task_id = %trigger.id))]
    pub async fn create_escalation(
        &self,
        outcome_id: Uuid,
        ambiguity: &AmbiguitySignal,
        trigger: &Task,
    ) -> DomainResult<Escalation> {
        let outcome = self
            .outcomes
            .get(outcome_id)
            .await?
            .ok_or(DomainError::OutcomeNotFound(outcome_id))?;
        if trigger.outcome_id != outcome_id {
            return Err(DomainError::ValidationFailed(format!(
                "task {} does not belong to outcome {outcome_id}",
                trigger.id
            )));
        }

        let affected = self.affected_tasks(ambiguity.ambiguity_type, trigger).await?;

        let question = if ambiguity.options.len() >= 2 {
            EscalationQuestion {
                text: ambiguity.description.clone(),
                context: ambiguity.evidence.join("\n"),
                options: ambiguity.options.iter().take(MAX_OPTIONS).cloned().collect(),
            }
        } else {
            self.generate_question(ambiguity, trigger, &outcome.intent).await
        };

        let escalation = Escalation::new(
            outcome_id,
            EscalationTrigger {
                trigger_type: ambiguity.ambiguity_type,
                task_id: trigger.id,
                evidence: ambiguity.evidence.clone(),
            },
            question,
            affected,
        );
        self.escalations.create(&escalation).await?;

        let reason = format!(
            "Awaiting decision on escalation {}: {}",
            escalation.id,
            truncate_chars(&escalation.question.text, 120)
        );
        let paused = self.pause_tasks(&escalation.affected_tasks, &reason).await?;

        self.context
            .mutate(outcome_id, |store| store.increment(StatCounter::EscalationsCreated, 1))
            .await?;

        self.activity
            .append(&ActivityEntry::new(
                outcome_id,
                format!(
                    "Escalated {}: {}",
                    escalation.trigger.trigger_type.as_str(),
                    truncate_chars(&escalation.question.text, 120)
                ),
                ActivityDetails::EscalationCreated {
                    escalation_id: escalation.id,
                    trigger_type: escalation.trigger.trigger_type.as_str().to_string(),
                    trigger_task_id: trigger.id,
                    affected_tasks: escalation.affected_tasks.clone(),
                    question: escalation.question.text.clone(),
                },
            ))
            .await?;

        info!(
            escalation_id = %escalation.id,
            affected = escalation.affected_tasks.len(),
            paused = paused.len(),
            "escalation created"
        );
        Ok(escalation)
    }

    /// Answer a pending escalation and apply the selected option's action.
    #[instrument(skip_all, fields(escalation_id = %escalation_id, option = %selected_option))]
    pub async fn resolve_escalation(
        &self,
        escalation_id: Uuid,
        selected_option: &str,
        additional_context: Option<String>,
        answered_by: DecisionSource,
    ) -> DomainResult<Resolution> {
        let mut escalation = self.get(escalation_id).await?;
        let option = escalation.answer(selected_option, additional_context.clone(), answered_by)?;
        self.escalations.update(&escalation).await?;

        let outcome_id = escalation.outcome_id;
        let additional_context = escalation
            .answer
            .as_ref()
            .and_then(|a| a.additional_context.clone());

        let mut action_results = Vec::new();
        let mut skipped: HashSet<Uuid> = HashSet::new();
        let mut decomposed: HashSet<Uuid> = HashSet::new();

        for &action in &option.actions {
            match action {
                ResolutionAction::IncreaseTurnLimit => {
                    let multiplier = parse_turn_multiplier(additional_context.as_deref());
                    for &id in &escalation.affected_tasks {
                        action_results.push(to_outcome(id, self.extend_budget(id, multiplier).await));
                    }
                }
                ResolutionAction::BreakIntoSubtasks => {
                    let outcome = self.outcomes.get(outcome_id).await?;
                    let intent = outcome.as_ref().map_or("", |o| o.intent.as_str());
                    let approach = outcome.as_ref().and_then(|o| o.design_approach.as_deref());
                    for &id in &escalation.affected_tasks {
                        if skipped.contains(&id) {
                            continue;
                        }
                        let result = to_outcome(id, self.decompose_task(id, intent, approach).await);
                        if result.success {
                            decomposed.insert(id);
                        }
                        action_results.push(result);
                    }
                }
                ResolutionAction::SkipFailingTasks => {
                    for &id in &escalation.affected_tasks {
                        if decomposed.contains(&id) {
                            continue;
                        }
                        let result = to_outcome(id, self.skip_task(id).await);
                        if result.success {
                            skipped.insert(id);
                        }
                        action_results.push(result);
                    }
                }
            }
        }

        let to_resume: Vec<Uuid> = escalation
            .affected_tasks
            .iter()
            .copied()
            .filter(|id| !skipped.contains(id) && !decomposed.contains(id))
            .collect();

        let who = match answered_by {
            DecisionSource::AutoResolver => "Auto-resolved",
            _ => "Human decision",
        };
        let mut decision_text = format!(
            "{who} on \"{}\": {}",
            truncate_chars(&escalation.question.text, 200),
            option.label
        );
        if let Some(ctx) = &additional_context {
            decision_text.push_str(&format!(". {ctx}"));
        }

        let trigger_type = escalation.trigger.trigger_type.as_str().to_string();
        let option_id = option.id.clone();
        self.context
            .mutate(outcome_id, |store| {
                let mut decision = Decision::new(decision_text.clone(), answered_by).for_escalation(escalation_id);
                if let Some(ctx) = &additional_context {
                    decision = decision.with_rationale(ctx.clone());
                }
                store.add_decision(decision);
                store.record_answer_pattern(&trigger_type, &option_id);
                for &task_id in &to_resume {
                    store.add_injection(ContextInjection::new(
                        InjectionTarget::Task(task_id),
                        decision_text.clone(),
                        InjectionPriority::MustKnow,
                        format!("escalation:{escalation_id}"),
                    ));
                }
            })
            .await?;

        let resumed = self.resume_tasks(&to_resume).await?;

        self.activity
            .append(&ActivityEntry::new(
                outcome_id,
                format!("Escalation answered: {}", option.label),
                ActivityDetails::EscalationAnswered {
                    escalation_id,
                    selected_option: option.id.clone(),
                    actions: option.actions.iter().map(|a| a.as_str().to_string()).collect(),
                    resumed_tasks: resumed.clone(),
                },
            ))
            .await?;

        info!(
            actions = %option.actions_label(),
            resumed = resumed.len(),
            skipped = skipped.len(),
            decomposed = decomposed.len(),
            "escalation resolved"
        );

        let keep_order = |set: &HashSet<Uuid>| -> Vec<Uuid> {
            escalation.affected_tasks.iter().copied().filter(|id| set.contains(id)).collect()
        };
        Ok(Resolution {
            escalation_id,
            selected_option: option.id,
            actions: option.actions,
            action_results,
            resumed_tasks: resumed,
            skipped_tasks: keep_order(&skipped),
            decomposed_tasks: keep_order(&decomposed),
        })
    }

    async fn extend_budget(&self, task_id: Uuid, multiplier: u32) -> DomainResult<String> {
        let mut task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        let old = task.max_attempts;
        task.max_attempts = extended_budget(old, multiplier);
        task.touch();
        self.tasks.update(&task).await?;
        Ok(format!("max_attempts {old} -> {}", task.max_attempts))
    }

    async fn skip_task(&self, task_id: Uuid) -> DomainResult<String> {
        let mut task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        if task.status == TaskStatus::Completed {
            return Err(DomainError::ValidationFailed("already completed".to_string()));
        }
        task.skip_by_human();
        self.tasks.update(&task).await?;
        Ok("skipped".to_string())
    }

    async fn decompose_task(&self, task_id: Uuid, intent: &str, approach: Option<&str>) -> DomainResult<String> {
        let task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        if task.status.is_terminal() {
            return Err(DomainError::ValidationFailed(format!("already {}", task.status.as_str())));
        }
        let decomposition = self.decomposer.decompose(&task, intent, approach).await?;
        Ok(format!("decomposed into {} subtasks", decomposition.created_task_ids.len()))
    }

    /// Dismiss a pending escalation and resume its tasks without new context.
    #[instrument(skip_all, fields(escalation_id = %escalation_id))]
    pub async fn dismiss_escalation(&self, escalation_id: Uuid, reason: Option<String>) -> DomainResult<Vec<Uuid>> {
        let mut escalation = self.get(escalation_id).await?;
        escalation.dismiss(reason.clone())?;
        self.escalations.update(&escalation).await?;

        let resumed = self.resume_tasks(&escalation.affected_tasks).await?;

        self.activity
            .append(&ActivityEntry::new(
                escalation.outcome_id,
                "Escalation dismissed",
                ActivityDetails::EscalationDismissed {
                    escalation_id,
                    reason,
                    resumed_tasks: resumed.clone(),
                },
            ))
            .await?;
        info!(resumed = resumed.len(), "escalation dismissed");
        Ok(resumed)
    }
}

fn to_outcome(task_id: Uuid, result: DomainResult<String>) -> ActionOutcome {
    match result {
        Ok(detail) => ActionOutcome {
            task_id,
            success: true,
            detail,
        },
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "resolution action failed for task");
            ActionOutcome {
                task_id,
                success: false,
                detail: e.to_string(),
            }
        }
    }
}
