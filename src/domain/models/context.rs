//! Per-outcome context store.
//!
//! The context store is the outcome's accumulated knowledge: discoveries
//! extracted from task output, decisions, constraints and targeted context
//! injections, plus a few monotonic counters. Collections are append-only
//! logs; the only destructive operation is [`ContextStore::compact`], which
//! folds low-relevance discoveries into a single summary entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::truncate_chars;

/// Default bound on the discoveries collection.
pub const DEFAULT_MAX_DISCOVERIES: usize = 50;

const ANSWER_PATTERN_PREFIX: &str = "[answer-pattern]";

/// Kind of learning a discovery represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryType {
    Blocker,
    Constraint,
    Dependency,
    Decision,
    Pattern,
    Insight,
}

impl DiscoveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocker => "blocker",
            Self::Constraint => "constraint",
            Self::Dependency => "dependency",
            Self::Decision => "decision",
            Self::Pattern => "pattern",
            Self::Insight => "insight",
        }
    }

    /// Lenient parse used for model output: unknown labels become `Insight`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "blocker" => Self::Blocker,
            "constraint" => Self::Constraint,
            "dependency" => Self::Dependency,
            "decision" => Self::Decision,
            "pattern" => Self::Pattern,
            _ => Self::Insight,
        }
    }

    /// Base score used when ranking discoveries for compaction.
    pub fn compaction_priority(&self) -> f64 {
        match self {
            Self::Blocker => 100.0,
            Self::Constraint => 80.0,
            Self::Dependency => 70.0,
            Self::Decision => 60.0,
            Self::Pattern => 40.0,
            Self::Insight => 30.0,
        }
    }

    /// Injection priority used when a discovery is pushed to other tasks.
    pub fn injection_priority(&self) -> InjectionPriority {
        match self {
            Self::Blocker => InjectionPriority::MustKnow,
            Self::Constraint | Self::Dependency => InjectionPriority::ShouldKnow,
            _ => InjectionPriority::NiceToKnow,
        }
    }
}

/// Which tasks a discovery is relevant to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "task_ids", rename_all = "snake_case")]
pub enum Relevance {
    /// Every task in the outcome.
    All,
    /// A specific set of tasks (possibly empty).
    Tasks(Vec<Uuid>),
}

impl Default for Relevance {
    fn default() -> Self {
        Self::Tasks(Vec::new())
    }
}

impl Relevance {
    /// Build from model-provided labels: `"*"` or `"all"` means every task,
    /// anything else must parse as a task id.
    pub fn from_labels(labels: &[String]) -> Self {
        if labels
            .iter()
            .any(|l| matches!(l.trim().to_lowercase().as_str(), "*" | "all" | "all_tasks"))
        {
            return Self::All;
        }
        Self::Tasks(
            labels
                .iter()
                .filter_map(|l| Uuid::parse_str(l.trim()).ok())
                .collect(),
        )
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Tasks(ids) if ids.is_empty())
    }
}

/// A learning extracted from one task's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub id: Uuid,
    pub discovery_type: DiscoveryType,
    pub content: String,
    pub source_task_id: Option<Uuid>,
    pub relevant_to: Relevance,
    pub created_at: DateTime<Utc>,
}

impl Discovery {
    pub fn new(discovery_type: DiscoveryType, content: impl Into<String>, relevant_to: Relevance) -> Self {
        Self {
            id: Uuid::new_v4(),
            discovery_type,
            content: content.into(),
            source_task_id: None,
            relevant_to,
            created_at: Utc::now(),
        }
    }

    pub fn with_source_task(mut self, task_id: Uuid) -> Self {
        self.source_task_id = Some(task_id);
        self
    }
}

/// Who made a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Human,
    Worker,
    System,
    AutoResolver,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Worker => "worker",
            Self::System => "system",
            Self::AutoResolver => "auto_resolver",
        }
    }
}

/// A decision recorded against the outcome, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub content: String,
    pub made_by: DecisionSource,
    pub rationale: Option<String>,
    /// Escalation this decision answered, if any.
    pub escalation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(content: impl Into<String>, made_by: DecisionSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            made_by,
            rationale: None,
            escalation_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn for_escalation(mut self, escalation_id: Uuid) -> Self {
        self.escalation_id = Some(escalation_id);
        self
    }
}

/// Category of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Technical,
    Design,
    Scope,
    Business,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Design => "design",
            Self::Scope => "scope",
            Self::Business => "business",
        }
    }
}

/// A rule work in the outcome must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: Uuid,
    pub kind: ConstraintKind,
    pub content: String,
    pub source: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content: content.into(),
            source: source.into(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Urgency tier of a context injection. Orders most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPriority {
    MustKnow,
    ShouldKnow,
    NiceToKnow,
}

impl InjectionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MustKnow => "must_know",
            Self::ShouldKnow => "should_know",
            Self::NiceToKnow => "nice_to_know",
        }
    }
}

/// Who a context injection is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "task_id", rename_all = "snake_case")]
pub enum InjectionTarget {
    All,
    Task(Uuid),
}

impl InjectionTarget {
    pub fn applies_to(&self, task_id: Uuid) -> bool {
        match self {
            Self::All => true,
            Self::Task(id) => *id == task_id,
        }
    }
}

/// Content pushed into a task's execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInjection {
    pub id: Uuid,
    pub target: InjectionTarget,
    pub content: String,
    pub priority: InjectionPriority,
    /// What produced the injection (`steering`, `escalation:<id>`, ...).
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl ContextInjection {
    pub fn new(
        target: InjectionTarget,
        content: impl Into<String>,
        priority: InjectionPriority,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            content: content.into(),
            priority,
            source: source.into(),
            created_at: Utc::now(),
        }
    }
}

/// Monotonic counters kept per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    pub tasks_observed: u64,
    pub discoveries_extracted: u64,
    pub escalations_created: u64,
    pub steering_actions: u64,
}

/// Selects one of the [`ContextStats`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCounter {
    TasksObserved,
    DiscoveriesExtracted,
    EscalationsCreated,
    SteeringActions,
}

/// Outcome of a compaction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub before: usize,
    pub kept: usize,
    pub merged: usize,
}

/// Historical human/auto answer frequency for one trigger type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPattern {
    pub trigger_type: String,
    pub option_id: String,
    pub count: u32,
}

/// Knowledge base of one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStore {
    pub outcome_id: Uuid,
    pub discoveries: Vec<Discovery>,
    pub decisions: Vec<Decision>,
    pub constraints: Vec<Constraint>,
    pub injections: Vec<ContextInjection>,
    pub stats: ContextStats,
    /// Bumped by the repository on every successful save.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ContextStore {
    pub fn new(outcome_id: Uuid) -> Self {
        Self {
            outcome_id,
            discoveries: Vec::new(),
            decisions: Vec::new(),
            constraints: Vec::new(),
            injections: Vec::new(),
            stats: ContextStats::default(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn add_discovery(&mut self, discovery: Discovery) {
        self.discoveries.push(discovery);
        self.updated_at = Utc::now();
    }

    pub fn add_decision(&mut self, decision: Decision) {
        self.decisions.push(decision);
        self.updated_at = Utc::now();
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
        self.updated_at = Utc::now();
    }

    pub fn add_injection(&mut self, injection: ContextInjection) {
        self.injections.push(injection);
        self.updated_at = Utc::now();
    }

    pub fn increment(&mut self, counter: StatCounter, by: u64) {
        let slot = match counter {
            StatCounter::TasksObserved => &mut self.stats.tasks_observed,
            StatCounter::DiscoveriesExtracted => &mut self.stats.discoveries_extracted,
            StatCounter::EscalationsCreated => &mut self.stats.escalations_created,
            StatCounter::SteeringActions => &mut self.stats.steering_actions,
        };
        *slot = slot.saturating_add(by);
        self.updated_at = Utc::now();
    }

    pub fn active_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.active)
    }

    /// Injections visible to a task, most urgent first, oldest first within a tier.
    pub fn injections_for_task(&self, task_id: Uuid) -> Vec<&ContextInjection> {
        let mut matching: Vec<&ContextInjection> = self
            .injections
            .iter()
            .filter(|i| i.target.applies_to(task_id))
            .collect();
        matching.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        matching
    }

    /// The most recent `n` decisions, oldest first.
    pub fn recent_decisions(&self, n: usize) -> &[Decision] {
        let start = self.decisions.len().saturating_sub(n);
        &self.decisions[start..]
    }

    /// Render a trimmed summary suitable for embedding in prompts.
    pub fn prompt_summary(&self, max_items: usize) -> String {
        let mut sections = Vec::new();

        let start = self.discoveries.len().saturating_sub(max_items);
        let discoveries: Vec<String> = self.discoveries[start..]
            .iter()
            .map(|d| format!("- [{}] {}", d.discovery_type.as_str(), truncate_chars(&d.content, 300)))
            .collect();
        if !discoveries.is_empty() {
            sections.push(format!("### Recent discoveries\n{}", discoveries.join("\n")));
        }

        let decisions: Vec<String> = self
            .recent_decisions(max_items)
            .iter()
            .map(|d| format!("- ({}) {}", d.made_by.as_str(), truncate_chars(&d.content, 300)))
            .collect();
        if !decisions.is_empty() {
            sections.push(format!("### Recent decisions\n{}", decisions.join("\n")));
        }

        let constraints: Vec<String> = self
            .active_constraints()
            .take(max_items)
            .map(|c| format!("- [{}] {}", c.kind.as_str(), truncate_chars(&c.content, 300)))
            .collect();
        if !constraints.is_empty() {
            sections.push(format!("### Active constraints\n{}", constraints.join("\n")));
        }

        if sections.is_empty() {
            "No accumulated context yet.".to_string()
        } else {
            sections.join("\n\n")
        }
    }

    /// Bound the discoveries collection to `max_discoveries` plus one summary entry.
    ///
    /// Each discovery is scored as `type priority + recency bonus (0-50) +
    /// 20 for outcome-wide relevance`. The top `max_discoveries` keep their
    /// original order; the rest are merged into one `pattern` discovery.
    pub fn compact(&mut self, max_discoveries: usize) -> Option<CompactionReport> {
        let total = self.discoveries.len();
        if total <= max_discoveries {
            return None;
        }

        let mut ranked: Vec<(usize, f64)> = self
            .discoveries
            .iter()
            .enumerate()
            .map(|(idx, d)| (idx, compaction_score(d, idx, total)))
            .collect();
        // Highest score first; newer entries win ties.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));

        let mut keep = vec![false; total];
        for (idx, _) in ranked.iter().take(max_discoveries) {
            keep[*idx] = true;
        }

        let mut kept = Vec::with_capacity(max_discoveries + 1);
        let mut dropped = Vec::with_capacity(total - max_discoveries);
        for (idx, discovery) in std::mem::take(&mut self.discoveries).into_iter().enumerate() {
            if keep[idx] {
                kept.push(discovery);
            } else {
                dropped.push(discovery);
            }
        }

        let previews: Vec<String> = dropped
            .iter()
            .take(3)
            .map(|d| truncate_chars(&d.content, 60))
            .collect();
        let more = dropped.len().saturating_sub(previews.len());
        let mut summary = format!(
            "Compacted {} older discoveries: {}",
            dropped.len(),
            previews.join("; ")
        );
        if more > 0 {
            summary.push_str(&format!(" (and {more} more)"));
        }

        kept.push(Discovery::new(DiscoveryType::Pattern, summary, Relevance::All));
        let report = CompactionReport {
            before: total,
            kept: max_discoveries,
            merged: dropped.len(),
        };
        self.discoveries = kept;
        self.updated_at = Utc::now();
        Some(report)
    }

    /// Increment the answer-pattern counter for `trigger_type` x `option_id`.
    ///
    /// The counter lives in the discoveries log as a single `pattern`
    /// discovery per pair; returns the new count.
    pub fn record_answer_pattern(&mut self, trigger_type: &str, option_id: &str) -> u32 {
        let key = answer_pattern_key(trigger_type, option_id);
        let existing = self
            .discoveries
            .iter_mut()
            .find(|d| d.discovery_type == DiscoveryType::Pattern && d.content.starts_with(&key));

        let count = match existing {
            Some(discovery) => {
                let count = parse_answer_pattern(&discovery.content).map_or(1, |p| p.count + 1);
                discovery.content = format!("{key}{count})");
                count
            }
            None => {
                self.discoveries.push(Discovery::new(
                    DiscoveryType::Pattern,
                    format!("{key}1)"),
                    Relevance::All,
                ));
                1
            }
        };
        self.updated_at = Utc::now();
        count
    }

    /// All recorded answer patterns.
    pub fn answer_patterns(&self) -> Vec<AnswerPattern> {
        self.discoveries
            .iter()
            .filter(|d| d.discovery_type == DiscoveryType::Pattern)
            .filter_map(|d| parse_answer_pattern(&d.content))
            .collect()
    }
}

fn compaction_score(discovery: &Discovery, index: usize, total: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let recency = (index as f64 / total as f64) * 50.0;
    let wildcard = if discovery.relevant_to.is_all() { 20.0 } else { 0.0 };
    discovery.discovery_type.compaction_priority() + recency + wildcard
}

fn answer_pattern_key(trigger_type: &str, option_id: &str) -> String {
    format!("{ANSWER_PATTERN_PREFIX} {trigger_type} -> {option_id} (x")
}

fn parse_answer_pattern(content: &str) -> Option<AnswerPattern> {
    let rest = content.strip_prefix(ANSWER_PATTERN_PREFIX)?.trim_start();
    let (trigger_type, rest) = rest.split_once(" -> ")?;
    let (option_id, count) = rest.rsplit_once(" (x")?;
    let count = count.strip_suffix(')')?.parse().ok()?;
    Some(AnswerPattern {
        trigger_type: trigger_type.to_string(),
        option_id: option_id.to_string(),
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(t: DiscoveryType, content: &str) -> Discovery {
        Discovery::new(t, content, Relevance::Tasks(vec![Uuid::new_v4()]))
    }

    #[test]
    fn test_relevance_from_labels() {
        assert_eq!(Relevance::from_labels(&["*".to_string()]), Relevance::All);
        assert_eq!(Relevance::from_labels(&["ALL".to_string()]), Relevance::All);
        let id = Uuid::new_v4();
        assert_eq!(
            Relevance::from_labels(&[id.to_string(), "not-an-id".to_string()]),
            Relevance::Tasks(vec![id])
        );
        assert!(Relevance::from_labels(&[]).is_empty());
    }

    #[test]
    fn test_injection_priority_from_type() {
        assert_eq!(DiscoveryType::Blocker.injection_priority(), InjectionPriority::MustKnow);
        assert_eq!(DiscoveryType::Constraint.injection_priority(), InjectionPriority::ShouldKnow);
        assert_eq!(DiscoveryType::Dependency.injection_priority(), InjectionPriority::ShouldKnow);
        assert_eq!(DiscoveryType::Pattern.injection_priority(), InjectionPriority::NiceToKnow);
        assert_eq!(DiscoveryType::parse_lenient("weird"), DiscoveryType::Insight);
    }

    #[test]
    fn test_compact_noop_under_limit() {
        let mut store = ContextStore::new(Uuid::new_v4());
        for i in 0..5 {
            store.add_discovery(discovery(DiscoveryType::Insight, &format!("d{i}")));
        }
        assert!(store.compact(5).is_none());
        assert_eq!(store.discoveries.len(), 5);
    }

    #[test]
    fn test_compact_bounds_and_keeps_blockers() {
        let mut store = ContextStore::new(Uuid::new_v4());
        store.add_discovery(discovery(DiscoveryType::Blocker, "old blocker"));
        for i in 0..120 {
            store.add_discovery(discovery(DiscoveryType::Insight, &format!("insight {i}")));
        }

        let report = store.compact(50).unwrap();
        assert_eq!(report.before, 121);
        assert_eq!(report.merged, 71);
        assert_eq!(store.discoveries.len(), 51);
        assert!(store.discoveries.iter().any(|d| d.content == "old blocker"));

        let summary = store.discoveries.last().unwrap();
        assert_eq!(summary.discovery_type, DiscoveryType::Pattern);
        assert!(summary.relevant_to.is_all());
        assert!(summary.content.starts_with("Compacted 71 older discoveries"));
        assert!(summary.content.contains("insight 0"));
        assert!(summary.content.contains("(and 68 more)"));
    }

    #[test]
    fn test_compact_prefers_recent_within_type() {
        let mut store = ContextStore::new(Uuid::new_v4());
        for i in 0..10 {
            store.add_discovery(discovery(DiscoveryType::Insight, &format!("n{i}")));
        }
        store.compact(3);
        let kept: Vec<&str> = store.discoveries[..3].iter().map(|d| d.content.as_str()).collect();
        assert_eq!(kept, vec!["n7", "n8", "n9"]);
    }

    #[test]
    fn test_wildcard_bonus_outranks_recency() {
        let mut store = ContextStore::new(Uuid::new_v4());
        store.add_discovery(Discovery::new(DiscoveryType::Insight, "global", Relevance::All));
        for i in 0..4 {
            store.add_discovery(discovery(DiscoveryType::Insight, &format!("local {i}")));
        }
        store.compact(1);
        assert_eq!(store.discoveries[0].content, "global");
    }

    #[test]
    fn test_answer_pattern_counter() {
        let mut store = ContextStore::new(Uuid::new_v4());
        assert_eq!(store.record_answer_pattern("multiple_approaches", "skip_task"), 1);
        assert_eq!(store.record_answer_pattern("multiple_approaches", "skip_task"), 2);
        assert_eq!(store.record_answer_pattern("blocking_decision", "proceed"), 1);

        let patterns = store.answer_patterns();
        assert_eq!(patterns.len(), 2);
        assert!(patterns.contains(&AnswerPattern {
            trigger_type: "multiple_approaches".to_string(),
            option_id: "skip_task".to_string(),
            count: 2,
        }));
        assert_eq!(store.discoveries.len(), 2);
    }

    #[test]
    fn test_injections_for_task_ordering() {
        let mut store = ContextStore::new(Uuid::new_v4());
        let task = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.add_injection(ContextInjection::new(InjectionTarget::All, "fyi", InjectionPriority::NiceToKnow, "steering"));
        store.add_injection(ContextInjection::new(InjectionTarget::Task(task), "critical", InjectionPriority::MustKnow, "steering"));
        store.add_injection(ContextInjection::new(InjectionTarget::Task(other), "not mine", InjectionPriority::MustKnow, "steering"));

        let visible = store.injections_for_task(task);
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].content, "critical");
        assert_eq!(visible[1].content, "fyi");
    }

    #[test]
    fn test_prompt_summary() {
        let mut store = ContextStore::new(Uuid::new_v4());
        assert_eq!(store.prompt_summary(5), "No accumulated context yet.");

        store.add_discovery(discovery(DiscoveryType::Blocker, "API is rate limited"));
        store.add_decision(Decision::new("Use SQLite", DecisionSource::Human));
        let mut inactive = Constraint::new(ConstraintKind::Technical, "old rule", "human");
        inactive.active = false;
        store.add_constraint(inactive);
        store.add_constraint(Constraint::new(ConstraintKind::Design, "No global state", "human"));

        let summary = store.prompt_summary(5);
        assert!(summary.contains("[blocker] API is rate limited"));
        assert!(summary.contains("(human) Use SQLite"));
        assert!(summary.contains("No global state"));
        assert!(!summary.contains("old rule"));
    }
}
