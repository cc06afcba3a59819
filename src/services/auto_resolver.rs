//! Auto-resolver: confidence-gated closure of escalations without a human.
//!
//! Heuristics run first and never call the model. Only escalations no
//! heuristic covers get a model judgment. A resolution is committed only when
//! the judgment says so *and* its confidence clears the outcome threshold.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::context_store::ContextStoreService;
use super::escalator::{Escalator, Resolution};
use super::extract_json_from_response;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    truncate_chars, ActivityDetails, ActivityEntry, AutoResolveConfig, AutoResolveMode,
    CompletionRequest, DecisionSource, Escalation, QuestionOption, ResolutionAction,
    COMPONENT_KEY, DEFAULT_COMPLETION_TIMEOUT_MS,
};
use crate::domain::ports::{ActivityRepository, CompletionService, TaskRepository};

/// Security vocabulary matched on word boundaries, so "author" or
/// "tokenizer" do not count.
static SECURITY_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:secur\w*|credentials?|secrets?|passwords?|api[ _-]?keys?|tokens?|(?:o|un)?auth(?:n|z|enticat\w*|ori[sz]\w*)?|vulnerab\w*|permissions?|encrypt\w*|decrypt\w*)\b",
    )
    .ok()
});
const COMPLEXITY_KEYWORDS: &[&str] = &[
    "too complex", "complexity", "too large", "too big", "break down", "decompose", "split",
    "subtask",
];
const FAILURE_KEYWORDS: &[&str] = &[
    "fail", "error", "retry", "timed out", "timeout", "crash", "turn limit", "max turns",
];
const AMBIGUITY_KEYWORDS: &[&str] = &[
    "unclear", "ambiguous", "ambiguity", "clarif", "which approach", "not sure", "conflicting",
    "requirement",
];

/// Keyword class of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCategory {
    Complexity,
    Failure,
    Ambiguity,
    Security,
    Unknown,
}

impl EscalationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::Failure => "failure",
            Self::Ambiguity => "ambiguity",
            Self::Security => "security",
            Self::Unknown => "unknown",
        }
    }

    /// Classify by inspecting question, context, evidence and option text.
    ///
    /// Security wins over everything else.
    pub fn classify(escalation: &Escalation) -> Self {
        let mut text = format!(
            "{} {} {}",
            escalation.question.text,
            escalation.question.context,
            escalation.trigger.evidence.join(" ")
        );
        for option in &escalation.question.options {
            text.push(' ');
            text.push_str(&option.label);
            text.push(' ');
            text.push_str(&option.description);
        }
        let text = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

        if SECURITY_PATTERN.as_ref().is_some_and(|re| re.is_match(&text)) {
            Self::Security
        } else if has(COMPLEXITY_KEYWORDS) {
            Self::Complexity
        } else if has(FAILURE_KEYWORDS) {
            Self::Failure
        } else if has(AMBIGUITY_KEYWORDS) {
            Self::Ambiguity
        } else {
            Self::Unknown
        }
    }
}

/// A proposed decision, heuristic or model-made.
#[derive(Debug, Clone, PartialEq)]
struct Judgment {
    should_auto_resolve: bool,
    selected_option: Option<String>,
    reasoning: String,
    confidence: f64,
}

impl Judgment {
    fn defer(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            should_auto_resolve: false,
            selected_option: None,
            reasoning: reasoning.into(),
            confidence,
        }
    }

    fn pick(option: &QuestionOption, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            should_auto_resolve: true,
            selected_option: Some(option.id.clone()),
            reasoning: reasoning.into(),
            confidence,
        }
    }
}

fn find_option<'a>(
    escalation: &'a Escalation,
    action: ResolutionAction,
    words: &[&str],
) -> Option<&'a QuestionOption> {
    escalation.question.options.iter().find(|o| o.has_action(action)).or_else(|| {
        escalation.question.options.iter().find(|o| {
            let text = format!("{} {}", o.id, o.label).to_lowercase();
            words.iter().any(|w| text.contains(w))
        })
    })
}

/// Fast-path decision. `None` means the model must judge.
fn heuristic(escalation: &Escalation, category: EscalationCategory, trigger_attempts: u32) -> Option<Judgment> {
    match category {
        EscalationCategory::Security => Some(Judgment::defer(
            1.0,
            "Security-sensitive escalations always need a human",
        )),
        EscalationCategory::Complexity => {
            find_option(escalation, ResolutionAction::BreakIntoSubtasks, &["decompose", "break", "split"])
                .map(|o| Judgment::pick(o, 0.9, "Task is too complex; decomposing it is the standard remedy"))
        }
        EscalationCategory::Failure => {
            if trigger_attempts > 1 {
                Some(Judgment::defer(
                    0.85,
                    format!("Task already retried ({trigger_attempts} attempts); a human should look"),
                ))
            } else {
                find_option(escalation, ResolutionAction::IncreaseTurnLimit, &["retry", "increase"])
                    .map(|o| Judgment::pick(o, 0.75, "First failure; one more attempt with a larger budget"))
            }
        }
        EscalationCategory::Ambiguity => Some(Judgment::defer(
            0.95,
            "Requirement ambiguity needs domain knowledge only a human has",
        )),
        EscalationCategory::Unknown => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    #[serde(default, alias = "shouldAutoResolve")]
    should_auto_resolve: bool,
    #[serde(default, alias = "selectedOption")]
    selected_option: Option<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f64,
}

/// Result of one auto-resolve attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoResolveAttempt {
    pub escalation_id: Uuid,
    pub resolved: bool,
    pub category: EscalationCategory,
    pub selected_option: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub resolution: Option<Resolution>,
}

/// Aggregate of [`AutoResolver::auto_resolve_all_pending`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoResolveSummary {
    pub resolved: usize,
    pub deferred: usize,
    pub failed: usize,
    pub attempts: Vec<AutoResolveAttempt>,
    /// Escalations whose evaluation errored, with the error.
    pub errors: Vec<(Uuid, String)>,
}

#[derive(Debug, Clone)]
pub struct AutoResolverConfig {
    pub timeout_ms: u64,
    /// Recent decisions shown to the model.
    pub decision_history: usize,
}

impl Default for AutoResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
            decision_history: 5,
        }
    }
}

pub struct AutoResolver {
    escalator: Arc<Escalator>,
    tasks: Arc<dyn TaskRepository>,
    activity: Arc<dyn ActivityRepository>,
    context: ContextStoreService,
    completion: Arc<dyn CompletionService>,
    config: AutoResolverConfig,
}

impl AutoResolver {
    pub fn new(
        escalator: Arc<Escalator>,
        tasks: Arc<dyn TaskRepository>,
        activity: Arc<dyn ActivityRepository>,
        context: ContextStoreService,
        completion: Arc<dyn CompletionService>,
        config: AutoResolverConfig,
    ) -> Self {
        Self {
            escalator,
            tasks,
            activity,
            context,
            completion,
            config,
        }
    }

    async fn model_judgment(&self, escalation: &Escalation) -> Judgment {
        let store = match self.context.load_or_create(escalation.outcome_id).await {
            Ok(store) => store,
            Err(e) => return Judgment::defer(0.0, format!("Context unavailable: {e}")),
        };
        let trigger = self.tasks.get(escalation.trigger.task_id).await.ok().flatten();

        let options = escalation
            .question
            .options
            .iter()
            .map(|o| format!("- {}: {} ({}) implications: {}", o.id, o.label, o.description, o.implications))
            .collect::<Vec<_>>()
            .join("\n");
        let decisions = store
            .recent_decisions(self.config.decision_history)
            .iter()
            .map(|d| format!("- ({}) {}", d.made_by.as_str(), truncate_chars(&d.content, 300)))
            .collect::<Vec<_>>();
        let patterns = store
            .answer_patterns()
            .into_iter()
            .filter(|p| p.trigger_type == escalation.trigger.trigger_type.as_str())
            .map(|p| format!("- chose '{}' {} time(s)", p.option_id, p.count))
            .collect::<Vec<_>>();
        let task_context = trigger.as_ref().map_or_else(
            || "Unknown task".to_string(),
            |t| format!("{}\n{}", t.title, truncate_chars(t.working_description(), 1_500)),
        );

        let prompt = format!(
            r#"Decide whether this escalation can be resolved without a human.

## Question
{question}

## Context
{context}

## Options
{options}

## Task
{task_context}

## Recent decisions
{decisions}

## Past answers to similar escalations
{patterns}

Only auto-resolve when the right answer is clear from the information above.

Respond with a JSON object:
```json
{{"should_auto_resolve": true, "selected_option": "option id", "reasoning": "...", "confidence": 0.0}}
```

IMPORTANT: Output ONLY the JSON object, no other text."#,
            question = escalation.question.text,
            context = escalation.question.context,
            decisions = if decisions.is_empty() { "None".to_string() } else { decisions.join("\n") },
            patterns = if patterns.is_empty() { "None".to_string() } else { patterns.join("\n") },
        );

        let request = CompletionRequest::new(prompt)
            .with_timeout_ms(self.config.timeout_ms)
            .with_metadata(COMPONENT_KEY, "auto_resolver")
            .with_metadata("escalation_id", escalation.id.to_string());

        let text = match self.completion.complete(request).await {
            Ok(response) => response.text,
            Err(e) => return Judgment::defer(0.0, format!("Model judgment unavailable: {e}")),
        };
        let raw: RawJudgment = match serde_json::from_str(&extract_json_from_response(&text)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(escalation_id = %escalation.id, error = %e, "auto-resolve judgment was malformed");
                return Judgment::defer(0.0, "Model judgment was malformed");
            }
        };

        let selected = raw.selected_option.filter(|id| escalation.option(id).is_some());
        Judgment {
            should_auto_resolve: raw.should_auto_resolve && selected.is_some(),
            selected_option: selected,
            reasoning: raw.reasoning,
            confidence: raw.confidence.clamp(0.0, 1.0),
        }
    }

    /// Evaluate one pending escalation and resolve it if confident enough.
    #[instrument(skip_all, fields(escalation_id = %escalation_id, mode = config.mode.as_str()))]
    pub async fn try_auto_resolve(
        &self,
        escalation_id: Uuid,
        config: AutoResolveConfig,
    ) -> DomainResult<AutoResolveAttempt> {
        let escalation = self.escalator.get(escalation_id).await?;
        if !escalation.is_pending() {
            return Err(DomainError::EscalationNotPending {
                id: escalation_id,
                status: escalation.status.as_str().to_string(),
            });
        }
        let category = EscalationCategory::classify(&escalation);

        if config.mode == AutoResolveMode::Manual {
            return Ok(AutoResolveAttempt {
                escalation_id,
                resolved: false,
                category,
                selected_option: None,
                confidence: 0.0,
                reasoning: "Auto-resolve is disabled (manual mode)".to_string(),
                resolution: None,
            });
        }

        let attempts = self
            .tasks
            .get(escalation.trigger.task_id)
            .await?
            .map_or(0, |t| t.attempts);
        let judgment = match heuristic(&escalation, category, attempts) {
            Some(judgment) => judgment,
            None => self.model_judgment(&escalation).await,
        };

        let commit = judgment.should_auto_resolve && judgment.confidence >= config.confidence_threshold;
        let selected = judgment.selected_option.clone().filter(|_| commit);

        if let Some(option_id) = selected {
            let resolution = self
                .escalator
                .resolve_escalation(
                    escalation_id,
                    &option_id,
                    Some(format!("[AUTO-RESOLVED] {}", judgment.reasoning)),
                    DecisionSource::AutoResolver,
                )
                .await?;
            self.activity
                .append(&ActivityEntry::new(
                    escalation.outcome_id,
                    format!("Auto-resolved with '{option_id}' ({:.0}% confident)", judgment.confidence * 100.0),
                    ActivityDetails::AutoResolved {
                        escalation_id,
                        selected_option: option_id.clone(),
                        confidence: judgment.confidence,
                        reasoning: judgment.reasoning.clone(),
                    },
                ))
                .await?;
            info!(option = %option_id, confidence = judgment.confidence, "escalation auto-resolved");
            return Ok(AutoResolveAttempt {
                escalation_id,
                resolved: true,
                category,
                selected_option: Some(option_id),
                confidence: judgment.confidence,
                reasoning: judgment.reasoning,
                resolution: Some(resolution),
            });
        }

        self.activity
            .append(&ActivityEntry::new(
                escalation.outcome_id,
                format!("Auto-resolve deferred ({})", category.as_str()),
                ActivityDetails::AutoResolveDeferred {
                    escalation_id,
                    category: category.as_str().to_string(),
                    confidence: judgment.confidence,
                    reasoning: judgment.reasoning.clone(),
                },
            ))
            .await?;
        info!(category = category.as_str(), confidence = judgment.confidence, "auto-resolve deferred");
        Ok(AutoResolveAttempt {
            escalation_id,
            resolved: false,
            category,
            selected_option: judgment.selected_option,
            confidence: judgment.confidence,
            reasoning: judgment.reasoning,
            resolution: None,
        })
    }

    /// Try every pending escalation of an outcome; one failure never stops the rest.
    #[instrument(skip_all, fields(outcome_id = %outcome_id))]
    pub async fn auto_resolve_all_pending(
        &self,
        outcome_id: Uuid,
        config: AutoResolveConfig,
    ) -> DomainResult<AutoResolveSummary> {
        let pending = self.escalator.list_pending(Some(outcome_id)).await?;
        let mut summary = AutoResolveSummary::default();
        for escalation in pending {
            match self.try_auto_resolve(escalation.id, config).await {
                Ok(attempt) => {
                    if attempt.resolved {
                        summary.resolved += 1;
                    } else {
                        summary.deferred += 1;
                    }
                    summary.attempts.push(attempt);
                }
                Err(e) => {
                    warn!(escalation_id = %escalation.id, error = %e, "auto-resolve attempt failed");
                    summary.failed += 1;
                    summary.errors.push((escalation.id, e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AmbiguityType, EscalationQuestion, EscalationTrigger};

    fn escalation(text: &str, options: Vec<QuestionOption>) -> Escalation {
        Escalation::new(
            Uuid::new_v4(),
            EscalationTrigger {
                trigger_type: AmbiguityType::Other,
                task_id: Uuid::new_v4(),
                evidence: vec![],
            },
            EscalationQuestion {
                text: text.to_string(),
                context: String::new(),
                options,
            },
            vec![],
        )
    }

    fn opts() -> Vec<QuestionOption> {
        vec![
            QuestionOption::new("decompose", "Break it down"),
            QuestionOption::new("retry_with_more_turns", "Retry"),
            QuestionOption::new("proceed", "Proceed"),
        ]
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(
            EscalationCategory::classify(&escalation("Task too complex and needs the API key", vec![])),
            EscalationCategory::Security
        );
        assert_eq!(
            EscalationCategory::classify(&escalation("Task is too complex after it failed", vec![])),
            EscalationCategory::Complexity
        );
        assert_eq!(
            EscalationCategory::classify(&escalation("Build failed twice", vec![])),
            EscalationCategory::Failure
        );
        assert_eq!(
            EscalationCategory::classify(&escalation("The requirement is unclear", vec![])),
            EscalationCategory::Ambiguity
        );
        assert_eq!(
            EscalationCategory::classify(&escalation("Pick a color", vec![])),
            EscalationCategory::Unknown
        );
    }

    #[test]
    fn test_security_words_match_on_boundaries() {
        for text in [
            "Store the auth header?",
            "Which authentication flow?",
            "Is the user authorized?",
            "Refresh tokens on expiry?",
            "Where does the token live?",
            "Use OAuth or API keys?",
            "Should passwords be hashed?",
            "Is the bucket encrypted?",
        ] {
            assert_eq!(EscalationCategory::classify(&escalation(text, vec![])), EscalationCategory::Security, "{text}");
        }
        for text in [
            "Who is the author of the changelog entry?",
            "Which tokenizer should the parser use?",
            "Ask the authority on naming",
        ] {
            assert_ne!(EscalationCategory::classify(&escalation(text, vec![])), EscalationCategory::Security, "{text}");
        }
    }

    #[test]
    fn test_security_heuristic_never_resolves() {
        let e = escalation("Rotate the password?", opts());
        let j = heuristic(&e, EscalationCategory::Security, 0).unwrap();
        assert!(!j.should_auto_resolve);
        assert!((j.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_complexity_prefers_decompose() {
        let e = escalation("Too complex", opts());
        let j = heuristic(&e, EscalationCategory::Complexity, 0).unwrap();
        assert_eq!(j.selected_option.as_deref(), Some("decompose"));
        assert!((j.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_defers_after_retry() {
        let e = escalation("It failed", opts());
        let first = heuristic(&e, EscalationCategory::Failure, 1).unwrap();
        assert_eq!(first.selected_option.as_deref(), Some("retry_with_more_turns"));
        assert!((first.confidence - 0.75).abs() < f64::EPSILON);

        let again = heuristic(&e, EscalationCategory::Failure, 2).unwrap();
        assert!(!again.should_auto_resolve);
        assert!((again.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_goes_to_model() {
        let e = escalation("Pick a color", opts());
        assert!(heuristic(&e, EscalationCategory::Unknown, 0).is_none());
        let no_decompose = escalation("Too complex", vec![QuestionOption::new("proceed", "Proceed")]);
        assert!(heuristic(&no_decompose, EscalationCategory::Complexity, 0).is_none());
    }
}
