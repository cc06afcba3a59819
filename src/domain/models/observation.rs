//! Observation domain model and failure-pattern classification.
//!
//! An observation is the immutable assessment of one completed task. A
//! window of recent observations is classified into a [`FailurePattern`]
//! that decides whether work continues, pauses for review or escalates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::context::Discovery;
use super::escalation::AmbiguitySignal;

/// Coarse quality assessment of a task's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Good,
    NeedsWork,
    OffRails,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::NeedsWork => "needs_work",
            Self::OffRails => "off_rails",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "good" => Self::Good,
            "off_rails" | "offrails" => Self::OffRails,
            _ => Self::NeedsWork,
        }
    }

    /// Higher is better.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Good => 2,
            Self::NeedsWork => 1,
            Self::OffRails => 0,
        }
    }
}

/// Severity of a drift item or quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "critical" => Self::High,
            "low" | "minor" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// Kind of deviation from the outcome's intent or design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    ScopeCreep,
    ApproachDeviation,
    IntentMismatch,
    QualityShortfall,
    Other,
}

impl DriftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScopeCreep => "scope_creep",
            Self::ApproachDeviation => "approach_deviation",
            Self::IntentMismatch => "intent_mismatch",
            Self::QualityShortfall => "quality_shortfall",
            Self::Other => "other",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "scope_creep" | "scope" => Self::ScopeCreep,
            "approach_deviation" | "approach" | "design_deviation" => Self::ApproachDeviation,
            "intent_mismatch" | "intent" | "misalignment" => Self::IntentMismatch,
            "quality_shortfall" | "quality" => Self::QualityShortfall,
            _ => Self::Other,
        }
    }
}

/// One detected deviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftItem {
    pub drift_type: DriftType,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// A concrete problem with the produced work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub description: String,
    pub severity: Severity,
}

/// Assessment of one completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub outcome_id: Uuid,
    pub task_id: Uuid,
    pub on_track: bool,
    /// 0-100.
    pub alignment_score: u8,
    pub quality: QualityTier,
    pub summary: String,
    pub drift: Vec<DriftItem>,
    pub discoveries: Vec<Discovery>,
    pub quality_issues: Vec<QualityIssue>,
    pub ambiguity: Option<AmbiguitySignal>,
    pub created_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(outcome_id: Uuid, task_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            outcome_id,
            task_id,
            on_track: true,
            alignment_score: 100,
            quality: QualityTier::Good,
            summary: String::new(),
            drift: Vec::new(),
            discoveries: Vec::new(),
            quality_issues: Vec::new(),
            ambiguity: None,
            created_at: Utc::now(),
        }
    }

    /// Clamp an arbitrary model-provided score into 0-100.
    pub fn clamp_alignment(raw: f64) -> u8 {
        if raw.is_nan() {
            return 0;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let clamped = raw.round().clamp(0.0, 100.0) as u8;
        clamped
    }

    /// On track, aligned at least `threshold`, and not off the rails.
    pub fn is_healthy(&self, threshold: u8) -> bool {
        self.on_track && self.alignment_score >= threshold && self.quality != QualityTier::OffRails
    }
}

/// Pattern detected across recent observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePattern {
    ConsecutiveFailures,
    DecliningQuality,
    RepeatedDrift,
}

impl FailurePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsecutiveFailures => "consecutive_failures",
            Self::DecliningQuality => "declining_quality",
            Self::RepeatedDrift => "repeated_drift",
        }
    }
}

/// What the control loop should do about a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternRecommendation {
    Continue,
    PauseForReview,
    Escalate,
}

impl PatternRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::PauseForReview => "pause_for_review",
            Self::Escalate => "escalate",
        }
    }
}

/// Thresholds for failure-pattern classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternThresholds {
    /// Streak length that triggers `consecutive_failures`.
    pub consecutive_failures: usize,
    /// Alignment at or above which an observation counts as healthy.
    pub healthy_alignment: u8,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            consecutive_failures: 3,
            healthy_alignment: 50,
        }
    }
}

/// Result of failure-pattern detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePatternReport {
    pub pattern: Option<FailurePattern>,
    pub recommendation: PatternRecommendation,
    pub consecutive_failures: usize,
    pub average_alignment: f64,
    pub declining_quality: bool,
    pub repeated_drift: Vec<DriftType>,
    pub observations_considered: usize,
    /// Workers paused as a consequence, filled in by the caller.
    #[serde(default)]
    pub paused_workers: Vec<String>,
}

impl FailurePatternReport {
    /// Classify a window of observations ordered newest first.
    pub fn classify(newest_first: &[Observation], thresholds: PatternThresholds) -> Self {
        let consecutive_failures = newest_first
            .iter()
            .take_while(|o| !o.is_healthy(thresholds.healthy_alignment))
            .count();

        #[allow(clippy::cast_precision_loss)]
        let average_alignment = if newest_first.is_empty() {
            0.0
        } else {
            newest_first
                .iter()
                .map(|o| f64::from(o.alignment_score))
                .sum::<f64>()
                / newest_first.len() as f64
        };

        let declining_quality = is_declining(newest_first);
        let repeated_drift = repeated_drift_types(newest_first);

        let (pattern, recommendation) = if consecutive_failures >= thresholds.consecutive_failures {
            (Some(FailurePattern::ConsecutiveFailures), PatternRecommendation::Escalate)
        } else if declining_quality {
            (Some(FailurePattern::DecliningQuality), PatternRecommendation::PauseForReview)
        } else if !repeated_drift.is_empty() {
            (Some(FailurePattern::RepeatedDrift), PatternRecommendation::PauseForReview)
        } else {
            (None, PatternRecommendation::Continue)
        };

        Self {
            pattern,
            recommendation,
            consecutive_failures,
            average_alignment,
            declining_quality,
            repeated_drift,
            observations_considered: newest_first.len(),
            paused_workers: Vec::new(),
        }
    }
}

/// Quality over the latest three observations never improves and ends worse than it started.
fn is_declining(newest_first: &[Observation]) -> bool {
    if newest_first.len() < 3 {
        return false;
    }
    let ranks: Vec<u8> = newest_first[..3].iter().rev().map(|o| o.quality.rank()).collect();
    ranks.windows(2).all(|w| w[0] >= w[1]) && ranks[0] > ranks[2]
}

/// Drift types seen in two or more observations of the window.
fn repeated_drift_types(observations: &[Observation]) -> Vec<DriftType> {
    let mut seen: HashMap<DriftType, usize> = HashMap::new();
    let mut order = Vec::new();
    for obs in observations {
        let mut local: Vec<DriftType> = Vec::new();
        for item in &obs.drift {
            if !local.contains(&item.drift_type) {
                local.push(item.drift_type);
            }
        }
        for drift_type in local {
            let count = seen.entry(drift_type).or_insert(0);
            if *count == 0 {
                order.push(drift_type);
            }
            *count += 1;
        }
    }
    order.into_iter().filter(|t| seen[t] >= 2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(on_track: bool, score: u8, quality: QualityTier) -> Observation {
        let mut o = Observation::new(Uuid::nil(), Uuid::new_v4());
        o.on_track = on_track;
        o.alignment_score = score;
        o.quality = quality;
        o
    }

    fn drift(t: DriftType) -> DriftItem {
        DriftItem {
            drift_type: t,
            severity: Severity::Medium,
            description: "drift".to_string(),
            evidence: Vec::new(),
        }
    }

    #[test]
    fn test_clamp_alignment() {
        assert_eq!(Observation::clamp_alignment(150.0), 100);
        assert_eq!(Observation::clamp_alignment(-20.0), 0);
        assert_eq!(Observation::clamp_alignment(72.4), 72);
        assert_eq!(Observation::clamp_alignment(f64::NAN), 0);
    }

    #[test]
    fn test_consecutive_failures_escalate() {
        let window = vec![
            obs(false, 20, QualityTier::NeedsWork),
            obs(false, 30, QualityTier::NeedsWork),
            obs(false, 40, QualityTier::NeedsWork),
            obs(true, 90, QualityTier::Good),
        ];
        let report = FailurePatternReport::classify(&window, PatternThresholds::default());
        assert_eq!(report.consecutive_failures, 3);
        assert_eq!(report.pattern, Some(FailurePattern::ConsecutiveFailures));
        assert_eq!(report.recommendation, PatternRecommendation::Escalate);
        assert!((report.average_alignment - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_streak_stops_at_healthy() {
        let window = vec![
            obs(false, 20, QualityTier::NeedsWork),
            obs(true, 80, QualityTier::Good),
            obs(false, 20, QualityTier::NeedsWork),
            obs(false, 20, QualityTier::NeedsWork),
        ];
        let report = FailurePatternReport::classify(&window, PatternThresholds::default());
        assert_eq!(report.consecutive_failures, 1);
        assert_ne!(report.pattern, Some(FailurePattern::ConsecutiveFailures));
    }

    #[test]
    fn test_off_rails_is_never_healthy() {
        assert!(!obs(true, 95, QualityTier::OffRails).is_healthy(50));
        assert!(obs(true, 50, QualityTier::NeedsWork).is_healthy(50));
    }

    #[test]
    fn test_declining_quality() {
        // newest first: off_rails <- needs_work <- good
        let window = vec![
            obs(true, 60, QualityTier::OffRails),
            obs(true, 70, QualityTier::NeedsWork),
            obs(true, 90, QualityTier::Good),
        ];
        let report = FailurePatternReport::classify(&window, PatternThresholds::default());
        assert!(report.declining_quality);
        assert_eq!(report.pattern, Some(FailurePattern::DecliningQuality));
        assert_eq!(report.recommendation, PatternRecommendation::PauseForReview);
    }

    #[test]
    fn test_flat_quality_is_not_declining() {
        let window = vec![
            obs(true, 60, QualityTier::NeedsWork),
            obs(true, 70, QualityTier::NeedsWork),
            obs(true, 90, QualityTier::NeedsWork),
        ];
        assert!(!FailurePatternReport::classify(&window, PatternThresholds::default()).declining_quality);
    }

    #[test]
    fn test_repeated_drift() {
        let mut a = obs(true, 80, QualityTier::Good);
        a.drift = vec![drift(DriftType::ScopeCreep), drift(DriftType::ScopeCreep)];
        let mut b = obs(true, 80, QualityTier::Good);
        b.drift = vec![drift(DriftType::ScopeCreep), drift(DriftType::IntentMismatch)];
        let report = FailurePatternReport::classify(&[a, b], PatternThresholds::default());
        assert_eq!(report.repeated_drift, vec![DriftType::ScopeCreep]);
        assert_eq!(report.pattern, Some(FailurePattern::RepeatedDrift));
    }

    #[test]
    fn test_no_pattern() {
        let window = vec![obs(true, 90, QualityTier::Good), obs(true, 85, QualityTier::Good)];
        let report = FailurePatternReport::classify(&window, PatternThresholds::default());
        assert_eq!(report.pattern, None);
        assert_eq!(report.recommendation, PatternRecommendation::Continue);
    }
}
