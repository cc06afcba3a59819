//! Wiring shared by every command: configuration, database and services.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::completion::{AnthropicApiCompletion, AnthropicApiConfig, ClaudeCodeCompletion, ClaudeCodeConfig};
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteWorkerControl};
use crate::adapters::TriggerClusterAnalyzer;
use crate::domain::models::{CompletionBackend, CompletionConfig, HomrConfig, PatternThresholds};
use crate::domain::ports::CompletionService;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    AutoResolverConfig, CompletionTaskDecomposer, DecomposerConfig, EscalatorConfig, ObserverConfig,
    Repositories, Supervisor, SupervisorConfig, TaskService,
};

/// Load configuration from an explicit file or the default hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<HomrConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open database and services for one CLI invocation.
pub struct CliContext {
    pub config: HomrConfig,
    pub pool: SqlitePool,
    pub repos: Repositories,
    pub supervisor: Arc<Supervisor>,
    pub tasks: TaskService,
}

impl CliContext {
    pub async fn open(config: HomrConfig) -> Result<Self> {
        let pool = initialize_database(
            &database_url(&config.database.path),
            Some(PoolConfig {
                max_connections: config.database.max_connections,
                ..PoolConfig::default()
            }),
        )
        .await
        .with_context(|| format!("Failed to open database at {}. Run 'homr init' first.", config.database.path))?;

        let repos = Repositories::sqlite(&pool);
        let completion = build_completion(&config.completion)?;
        let decomposer = Arc::new(CompletionTaskDecomposer::new(
            completion.clone(),
            repos.tasks.clone(),
            DecomposerConfig {
                timeout_ms: config.completion.timeout_secs.saturating_mul(1000),
            },
        ));
        let supervisor = Supervisor::new(
            repos.clone(),
            completion,
            decomposer,
            Arc::new(SqliteWorkerControl::new(pool.clone())),
            Arc::new(TriggerClusterAnalyzer::new()),
            supervisor_config(&config),
        );
        let tasks = TaskService::new(repos.outcomes.clone(), repos.tasks.clone());

        Ok(Self {
            config,
            pool,
            repos,
            supervisor: Arc::new(supervisor),
            tasks,
        })
    }
}

/// Completion backend selected by configuration.
pub fn build_completion(config: &CompletionConfig) -> Result<Arc<dyn CompletionService>> {
    match config.backend {
        CompletionBackend::ClaudeCode => Ok(Arc::new(ClaudeCodeCompletion::new(ClaudeCodeConfig {
            binary_path: config.claude_path.clone(),
            model: config.model.clone(),
            ..ClaudeCodeConfig::default()
        }))),
        CompletionBackend::AnthropicApi => {
            let defaults = AnthropicApiConfig::default();
            let api = AnthropicApiCompletion::new(AnthropicApiConfig {
                api_key: config.api_key.clone(),
                base_url: config.api_base_url.clone(),
                model: config.model.clone().unwrap_or(defaults.model),
                max_tokens: config.max_tokens,
                ..AnthropicApiConfig::default()
            })
            .context("Failed to create Anthropic API client")?;
            Ok(Arc::new(api))
        }
    }
}

/// Component tuning derived from the loaded configuration.
pub fn supervisor_config(config: &HomrConfig) -> SupervisorConfig {
    let timeout_ms = config.completion.timeout_secs.saturating_mul(1000);
    SupervisorConfig {
        observer: ObserverConfig {
            max_output_chars: config.observer.max_output_chars,
            context_summary_items: config.observer.context_summary_items,
            timeout_ms,
            failure_window: config.observer.failure_window,
            thresholds: PatternThresholds {
                consecutive_failures: config.observer.consecutive_failure_threshold,
                healthy_alignment: config.observer.healthy_alignment_threshold,
            },
        },
        escalator: EscalatorConfig {
            timeout_ms,
            ..EscalatorConfig::default()
        },
        auto_resolver: AutoResolverConfig {
            timeout_ms,
            decision_history: config.auto_resolve.decision_history,
        },
        max_discoveries: config.steering.max_discoveries,
        min_shared_keywords: config.escalator.min_shared_keywords,
        ..SupervisorConfig::default()
    }
}
