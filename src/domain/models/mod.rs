//! Domain models for the supervision engine.

pub mod activity;
pub mod analysis;
pub mod completion;
pub mod config;
pub mod context;
pub mod escalation;
pub mod observation;
pub mod outcome;
pub mod task;
pub mod worker;

pub use activity::{ActivityDetails, ActivityEntry, ActivityKind, ActivityQuery};
pub use analysis::{
    AnalysisJob, AnalysisOptions, AnalysisResult, EscalationCluster, ImprovementProposal,
    JobStatus, ProposalKind,
};
pub use completion::{
    CompletionRequest, CompletionResponse, DecompositionResult, COMPONENT_KEY,
    DEFAULT_COMPLETION_TIMEOUT_MS,
};
pub use config::{
    AnalysisSettings, AutoResolveSettings, CompletionBackend, CompletionConfig, DatabaseConfig,
    EscalatorSettings, HomrConfig, LoggingConfig, ObserverSettings, SteeringSettings,
};
pub use context::{
    AnswerPattern, CompactionReport, Constraint, ConstraintKind, ContextInjection, ContextStats,
    ContextStore, Decision, DecisionSource, Discovery, DiscoveryType, InjectionPriority,
    InjectionTarget, Relevance, StatCounter, DEFAULT_MAX_DISCOVERIES,
};
pub use escalation::{
    actions_label, normalize_actions, AmbiguitySignal, AmbiguityType, Escalation, EscalationAnswer, EscalationQuestion,
    EscalationStatus, EscalationTrigger, QuestionOption, ResolutionAction,
};
pub use observation::{
    DriftItem, DriftType, FailurePattern, FailurePatternReport, Observation,
    PatternRecommendation, PatternThresholds, QualityIssue, QualityTier, Severity,
};
pub use outcome::{AutoResolveConfig, AutoResolveMode, Outcome, OutcomeStatus};
pub use task::{
    Task, TaskPriority, TaskStatus, DEFAULT_MAX_ATTEMPTS, DEFAULT_PHASE, OBSOLETE_MARKER,
    PAUSED_MARKER, SKIPPED_MARKER,
};
pub use worker::{Worker, WorkerStatus};

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into",
    "through", "during", "before", "after", "above", "below", "between", "under", "and", "but",
    "or", "nor", "not", "so", "yet", "both", "either", "neither", "all", "each", "every", "some",
    "any", "no", "more", "most", "other", "such", "only", "own", "same", "than", "too", "very",
    "just", "also", "now", "that", "this", "these", "those", "it", "its", "what", "which", "when",
    "how", "why", "who", "use", "using", "we", "you", "they",
];

/// Lower-cased alphanumeric tokens longer than two characters, minus stopwords.
///
/// Order is preserved and duplicates are kept.
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{extract_keywords, truncate_chars};

    #[test]
    fn test_extract_keywords() {
        assert_eq!(
            extract_keywords("Build the JSON parser, and the API!"),
            vec!["build", "json", "parser", "api"]
        );
        assert!(extract_keywords("it is to be").is_empty());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }
}
