//! Observer: turns a completed task's output into a structured observation.
//!
//! The model call is single-turn and JSON-only. Any failure (transport,
//! timeout, malformed JSON) yields `None`; callers must not persist anything
//! in that case. Explicit uncertainty phrases in the output are also caught
//! by a deterministic regex pass.

use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use regex::Regex;

use super::escalator::RawOption;
use super::extract_json_from_response;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    truncate_chars, AmbiguitySignal, AmbiguityType, CompletionRequest, Discovery, DiscoveryType,
    DriftItem, DriftType, FailurePatternReport, Observation, Outcome, PatternThresholds,
    QualityIssue, QualityTier, Relevance, Severity, Task, COMPONENT_KEY,
    DEFAULT_COMPLETION_TIMEOUT_MS,
};
use crate::domain::ports::{CompletionService, ObservationRepository};

const TRUNCATION_MARKER: &str = "\n\n[... output truncated ...]";

/// Ordered detectors; the first match wins.
static AMBIGUITY_PATTERNS: LazyLock<Vec<(AmbiguityType, Regex)>> = LazyLock::new(|| {
    [
        (
            AmbiguityType::BlockingDecision,
            r"(?i)(needs? (a )?human (decision|input)|cannot proceed (until|without)|can't proceed (until|without)|blocked (on|until) (a )?decision|waiting (for|on) (a )?decision)",
        ),
        (
            AmbiguityType::MultipleApproaches,
            r"(?i)(not sure which (approach|option|way|method|library|pattern)|(multiple|several|two|different) (possible |valid )?approaches|could go either way)",
        ),
        (
            AmbiguityType::UnclearRequirement,
            r"(?i)(requirements? (is|are) (unclear|ambiguous|underspecified)|unclear (what|whether|if|how)|not (clear|specified) (what|whether|how|if))",
        ),
        (
            AmbiguityType::ConflictingRequirements,
            r"(?i)(conflicting requirements|requirements? conflict|contradict(s|ory|ion)|mutually exclusive)",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

/// Observer tuning.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub max_output_chars: usize,
    pub context_summary_items: usize,
    pub timeout_ms: u64,
    /// Persisted observations considered by failure-pattern detection.
    pub failure_window: usize,
    pub thresholds: PatternThresholds,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            max_output_chars: 50_000,
            context_summary_items: 5,
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
            failure_window: 5,
            thresholds: PatternThresholds::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    #[serde(default = "default_true")]
    on_track: bool,
    #[serde(default)]
    alignment_score: f64,
    #[serde(default)]
    quality: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    drift: Vec<RawDrift>,
    #[serde(default)]
    discoveries: Vec<RawDiscovery>,
    #[serde(default)]
    quality_issues: Vec<RawQualityIssue>,
    #[serde(default)]
    ambiguity: Option<RawAmbiguity>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawDrift {
    #[serde(default, alias = "drift_type")]
    r#type: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    evidence: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawDiscovery {
    #[serde(default, alias = "discovery_type")]
    r#type: String,
    content: String,
    #[serde(default)]
    relevant_to: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawQualityIssue {
    description: String,
    #[serde(default)]
    severity: String,
}

#[derive(Debug, Deserialize)]
struct RawAmbiguity {
    #[serde(default = "default_true")]
    detected: bool,
    #[serde(default, alias = "ambiguity_type")]
    r#type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    options: Vec<RawOption>,
}

impl RawAmbiguity {
    fn into_signal(self) -> Option<AmbiguitySignal> {
        if !self.detected {
            return None;
        }
        Some(AmbiguitySignal {
            ambiguity_type: AmbiguityType::parse_lenient(&self.r#type),
            description: self.description,
            evidence: self.evidence,
            options: self.options.into_iter().map(RawOption::into_option).collect(),
        })
    }
}

/// Scan output for explicit uncertainty phrases.
pub fn detect_ambiguity(output: &str) -> Option<AmbiguitySignal> {
    for (kind, regex) in AMBIGUITY_PATTERNS.iter() {
        if let Some(m) = regex.find(output) {
            let line = output[..m.start()]
                .rfind('\n')
                .map_or(0, |i| i + 1);
            let line_end = output[m.end()..]
                .find('\n')
                .map_or(output.len(), |i| m.end() + i);
            let evidence = truncate_chars(output[line..line_end].trim(), 200);
            return Some(
                AmbiguitySignal::new(*kind, format!("Worker output signals {}", kind.as_str().replace('_', " ")))
                    .with_evidence(evidence),
            );
        }
    }
    None
}

pub struct Observer {
    completion: Arc<dyn CompletionService>,
    observations: Arc<dyn ObservationRepository>,
    config: ObserverConfig,
}

impl Observer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        observations: Arc<dyn ObservationRepository>,
        config: ObserverConfig,
    ) -> Self {
        Self {
            completion,
            observations,
            config,
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    fn truncate_output(&self, output: &str) -> String {
        match output.char_indices().nth(self.config.max_output_chars) {
            Some((idx, _)) => format!("{}{TRUNCATION_MARKER}", &output[..idx]),
            None => output.to_string(),
        }
    }

    fn build_prompt(&self, task: &Task, output: &str, outcome: &Outcome, context_summary: &str) -> String {
        format!(
            r#"You are reviewing the output of an autonomous coding worker.

## Outcome intent
{intent}

## Design approach
{approach}

## Accumulated context
{context}

## Task
ID: {task_id}
Title: {title}
Description: {description}

## Task output
{output}

## Instructions
Assess whether the work is aligned with the outcome intent and approach.
Report drift, learnings other tasks need (discoveries), quality issues, and
whether the worker ran into an ambiguity a human must resolve.

Respond with a JSON object:
```json
{{
  "on_track": true,
  "alignment_score": 0,
  "quality": "good|needs_work|off_rails",
  "summary": "one or two sentences",
  "drift": [{{"type": "scope_creep|approach_deviation|intent_mismatch|quality_shortfall|other", "severity": "low|medium|high", "description": "...", "evidence": ["..."]}}],
  "discoveries": [{{"type": "blocker|constraint|dependency|decision|pattern|insight", "content": "...", "relevant_to": ["all" or task ids]}}],
  "quality_issues": [{{"description": "...", "severity": "low|medium|high"}}],
  "ambiguity": {{"detected": false, "type": "multiple_approaches|unclear_requirement|blocking_decision|conflicting_requirements", "description": "...", "evidence": ["..."], "options": [{{"id": "...", "label": "...", "description": "...", "implications": "..."}}]}}
}}
```

IMPORTANT: Output ONLY the JSON object, no other text."#,
            intent = truncate_chars(&outcome.intent, 2_000),
            approach = outcome
                .design_approach
                .as_deref()
                .map_or_else(|| "Not specified".to_string(), |a| truncate_chars(a, 2_000)),
            context = context_summary,
            task_id = task.id,
            title = task.title,
            description = task.working_description(),
            output = self.truncate_output(output),
        )
    }

    fn parse(&self, task: &Task, response: &str) -> Option<Observation> {
        let json = extract_json_from_response(response);
        let raw: RawObservation = match serde_json::from_str(&json) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "observer returned malformed JSON");
                return None;
            }
        };

        let mut observation = Observation::new(task.outcome_id, task.id);
        observation.on_track = raw.on_track;
        observation.alignment_score = Observation::clamp_alignment(raw.alignment_score);
        observation.quality = QualityTier::parse_lenient(&raw.quality);
        observation.summary = raw.summary;
        observation.drift = raw
            .drift
            .into_iter()
            .map(|d| DriftItem {
                drift_type: DriftType::parse_lenient(&d.r#type),
                severity: Severity::parse_lenient(&d.severity),
                description: d.description,
                evidence: d.evidence,
            })
            .collect();
        observation.discoveries = raw
            .discoveries
            .into_iter()
            .filter(|d| !d.content.trim().is_empty())
            .map(|d| {
                Discovery::new(
                    DiscoveryType::parse_lenient(&d.r#type),
                    d.content,
                    Relevance::from_labels(&d.relevant_to),
                )
                .with_source_task(task.id)
            })
            .collect();
        observation.quality_issues = raw
            .quality_issues
            .into_iter()
            .map(|q| QualityIssue {
                description: q.description,
                severity: Severity::parse_lenient(&q.severity),
            })
            .collect();
        observation.ambiguity = raw.ambiguity.and_then(RawAmbiguity::into_signal);
        Some(observation)
    }

    /// Assess one completed task. `None` means "do not persist".
    #[instrument(skip_all, fields(task_id = %task.id, outcome_id = %task.outcome_id))]
    pub async fn observe(
        &self,
        task: &Task,
        full_output: &str,
        outcome: &Outcome,
        context_summary: &str,
    ) -> Option<Observation> {
        let request = CompletionRequest::new(self.build_prompt(task, full_output, outcome, context_summary))
            .with_system_prompt("You are a meticulous reviewer. Respond with JSON only.")
            .with_timeout_ms(self.config.timeout_ms)
            .with_metadata(COMPONENT_KEY, "observer")
            .with_metadata("task_id", task.id.to_string());

        let response = match self.completion.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "observation skipped, completion failed");
                return None;
            }
        };

        let mut observation = self.parse(task, &response.text)?;
        if observation.ambiguity.is_none() {
            observation.ambiguity = detect_ambiguity(full_output);
        }
        debug!(
            alignment = observation.alignment_score,
            quality = observation.quality.as_str(),
            drift = observation.drift.len(),
            "task observed"
        );
        Some(observation)
    }

    /// Canned observation from the worker's success flag; no model call.
    pub fn quick_observe(&self, task: &Task, success: bool) -> Observation {
        let mut observation = Observation::new(task.outcome_id, task.id);
        if success {
            observation.alignment_score = 80;
            observation.quality = QualityTier::Good;
            observation.on_track = true;
            observation.summary = format!("Task '{}' completed successfully", task.title);
        } else {
            observation.alignment_score = 30;
            observation.quality = QualityTier::NeedsWork;
            observation.on_track = false;
            observation.summary = format!("Task '{}' did not complete successfully", task.title);
        }
        observation
    }

    /// Classify the recent observation window, `current` included.
    pub async fn detect_failure_patterns(
        &self,
        outcome_id: Uuid,
        current: &Observation,
    ) -> DomainResult<FailurePatternReport> {
        let mut window = vec![current.clone()];
        window.extend(
            self.observations
                .list_recent(outcome_id, self.config.failure_window)
                .await?
                .into_iter()
                .filter(|o| o.id != current.id),
        );
        window.truncate(self.config.failure_window + 1);
        Ok(FailurePatternReport::classify(&window, self.config.thresholds))
    }
}
