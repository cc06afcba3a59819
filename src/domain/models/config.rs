use serde::{Deserialize, Serialize};

use super::outcome::AutoResolveMode;

/// Main configuration structure for the supervision engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HomrConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Completion backend configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Observer tuning
    #[serde(default)]
    pub observer: ObserverSettings,

    /// Steering tuning
    #[serde(default)]
    pub steering: SteeringSettings,

    /// Escalator tuning
    #[serde(default)]
    pub escalator: EscalatorSettings,

    /// Defaults applied to new outcomes and the auto-resolver
    #[serde(default)]
    pub auto_resolve: AutoResolveSettings,

    /// Improvement analysis defaults
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".homr/homr.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: default_rotation(),
        }
    }
}

/// Which completion backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionBackend {
    #[default]
    ClaudeCode,
    AnthropicApi,
}

/// Completion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompletionConfig {
    #[serde(default)]
    pub backend: CompletionBackend,

    /// Model override; backend default when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Timeout for one completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Path to the Claude Code CLI binary
    #[serde(default = "default_claude_path")]
    pub claude_path: String,

    /// API key; falls back to `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

const fn default_timeout_secs() -> u64 {
    45
}

const fn default_max_turns() -> u32 {
    1
}

fn default_claude_path() -> String {
    "claude".to_string()
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            backend: CompletionBackend::default(),
            model: None,
            timeout_secs: default_timeout_secs(),
            max_turns: default_max_turns(),
            claude_path: default_claude_path(),
            api_key: None,
            api_base_url: default_api_base_url(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Observer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ObserverSettings {
    /// Task output beyond this many characters is truncated in prompts
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Recent observations considered by failure-pattern detection
    #[serde(default = "default_failure_window")]
    pub failure_window: usize,

    #[serde(default = "default_consecutive_failure_threshold")]
    pub consecutive_failure_threshold: usize,

    /// Alignment at or above which an observation counts as healthy
    #[serde(default = "default_healthy_alignment_threshold")]
    pub healthy_alignment_threshold: u8,

    #[serde(default = "default_context_summary_items")]
    pub context_summary_items: usize,
}

const fn default_max_output_chars() -> usize {
    50_000
}

const fn default_failure_window() -> usize {
    5
}

const fn default_consecutive_failure_threshold() -> usize {
    3
}

const fn default_healthy_alignment_threshold() -> u8 {
    50
}

const fn default_context_summary_items() -> usize {
    5
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            max_output_chars: default_max_output_chars(),
            failure_window: default_failure_window(),
            consecutive_failure_threshold: default_consecutive_failure_threshold(),
            healthy_alignment_threshold: default_healthy_alignment_threshold(),
            context_summary_items: default_context_summary_items(),
        }
    }
}

/// Steering tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SteeringSettings {
    /// Discoveries kept per outcome before compaction
    #[serde(default = "default_max_discoveries")]
    pub max_discoveries: usize,
}

const fn default_max_discoveries() -> usize {
    super::context::DEFAULT_MAX_DISCOVERIES
}

impl Default for SteeringSettings {
    fn default() -> Self {
        Self {
            max_discoveries: default_max_discoveries(),
        }
    }
}

/// Escalator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalatorSettings {
    /// Shared keywords that make a pending task related to the trigger
    #[serde(default = "default_min_shared_keywords")]
    pub min_shared_keywords: usize,
}

const fn default_min_shared_keywords() -> usize {
    2
}

impl Default for EscalatorSettings {
    fn default() -> Self {
        Self {
            min_shared_keywords: default_min_shared_keywords(),
        }
    }
}

/// Auto-resolve defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AutoResolveSettings {
    /// Mode given to newly created outcomes
    #[serde(default)]
    pub default_mode: AutoResolveMode,

    #[serde(default = "default_confidence_threshold")]
    pub default_confidence_threshold: f64,

    /// Recent decisions shown to the model when judging
    #[serde(default = "default_decision_history")]
    pub decision_history: usize,
}

const fn default_confidence_threshold() -> f64 {
    0.8
}

const fn default_decision_history() -> usize {
    5
}

impl Default for AutoResolveSettings {
    fn default() -> Self {
        Self {
            default_mode: AutoResolveMode::default(),
            default_confidence_threshold: default_confidence_threshold(),
            decision_history: default_decision_history(),
        }
    }
}

/// Improvement analysis defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisSettings {
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: u32,

    #[serde(default = "default_max_proposals")]
    pub default_max_proposals: usize,
}

const fn default_lookback_days() -> u32 {
    7
}

const fn default_max_proposals() -> usize {
    5
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            default_lookback_days: default_lookback_days(),
            default_max_proposals: default_max_proposals(),
        }
    }
}
