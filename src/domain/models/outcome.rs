//! Outcome domain model.
//!
//! An outcome is the enclosing unit of work: it owns one context store,
//! a set of tasks and any escalations raised while working toward it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle status of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    #[default]
    Active,
    Paused,
    Achieved,
    Archived,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Achieved => "achieved",
            Self::Archived => "archived",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "achieved" => Some(Self::Achieved),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// How escalations of an outcome may be closed without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AutoResolveMode {
    /// Every escalation waits for a human.
    #[default]
    Manual,
    /// Auto-resolution runs only when explicitly requested.
    SemiAuto,
    /// Auto-resolution is attempted as soon as an escalation is created.
    FullAuto,
}

impl AutoResolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::SemiAuto => "semi-auto",
            Self::FullAuto => "full-auto",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "manual" => Some(Self::Manual),
            "semi-auto" | "semiauto" => Some(Self::SemiAuto),
            "full-auto" | "fullauto" => Some(Self::FullAuto),
            _ => None,
        }
    }
}

/// Per-outcome auto-resolve configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoResolveConfig {
    pub mode: AutoResolveMode,
    /// Minimum confidence (0.0-1.0) a resolution needs to be committed.
    pub confidence_threshold: f64,
}

impl Default for AutoResolveConfig {
    fn default() -> Self {
        Self {
            mode: AutoResolveMode::Manual,
            confidence_threshold: 0.8,
        }
    }
}

impl AutoResolveConfig {
    pub fn new(mode: AutoResolveMode, confidence_threshold: f64) -> DomainResult<Self> {
        let config = Self {
            mode,
            confidence_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) || self.confidence_threshold.is_nan() {
            return Err(DomainError::ValidationFailed(format!(
                "confidence threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// The enclosing unit of work supervised by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: Uuid,
    pub name: String,
    /// Summary of what the outcome is meant to achieve.
    pub intent: String,
    /// Agreed design approach, if one exists.
    pub design_approach: Option<String>,
    pub status: OutcomeStatus,
    /// Whether supervision runs for this outcome at all.
    pub homr_enabled: bool,
    pub auto_resolve: AutoResolveConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outcome {
    pub fn new(name: impl Into<String>, intent: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            intent: intent.into(),
            design_approach: None,
            status: OutcomeStatus::Active,
            homr_enabled: true,
            auto_resolve: AutoResolveConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_design_approach(mut self, approach: impl Into<String>) -> Self {
        self.design_approach = Some(approach.into());
        self
    }

    pub fn with_auto_resolve(mut self, config: AutoResolveConfig) -> Self {
        self.auto_resolve = config;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == OutcomeStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(AutoResolveMode::from_str("semi-auto"), Some(AutoResolveMode::SemiAuto));
        assert_eq!(AutoResolveMode::from_str("FULL_AUTO"), Some(AutoResolveMode::FullAuto));
        assert_eq!(AutoResolveMode::from_str("sometimes"), None);
        assert_eq!(AutoResolveMode::FullAuto.as_str(), "full-auto");
    }

    #[test]
    fn test_threshold_validation() {
        assert!(AutoResolveConfig::new(AutoResolveMode::FullAuto, 0.7).is_ok());
        assert!(AutoResolveConfig::new(AutoResolveMode::FullAuto, 1.2).is_err());
        assert!(AutoResolveConfig::new(AutoResolveMode::FullAuto, -0.1).is_err());
        assert!(AutoResolveConfig::new(AutoResolveMode::FullAuto, f64::NAN).is_err());
    }

    #[test]
    fn test_new_outcome_defaults() {
        let outcome = Outcome::new("Ship v1", "Deliver the first release");
        assert!(outcome.is_active());
        assert!(outcome.homr_enabled);
        assert_eq!(outcome.auto_resolve.mode, AutoResolveMode::Manual);
    }
}
