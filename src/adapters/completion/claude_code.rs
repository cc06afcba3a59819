//! Claude Code CLI completion backend.
//!
//! Runs `claude --print` for single, non-interactive completions.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompletionRequest, CompletionResponse};
use crate::domain::ports::CompletionService;

/// Claude Code CLI backend configuration.
#[derive(Debug, Clone)]
pub struct ClaudeCodeConfig {
    /// Path to claude CLI binary
    pub binary_path: String,
    /// Model override passed as `--model`
    pub model: Option<String>,
    /// Output format for print mode
    pub output_format: String,
}

impl Default for ClaudeCodeConfig {
    fn default() -> Self {
        Self {
            binary_path: "claude".to_string(),
            model: None,
            output_format: "text".to_string(),
        }
    }
}

/// Completion backend that shells out to the Claude Code CLI.
pub struct ClaudeCodeCompletion {
    config: ClaudeCodeConfig,
}

impl ClaudeCodeCompletion {
    pub fn new(config: ClaudeCodeConfig) -> Self {
        Self { config }
    }

    /// Build CLI arguments for a request.
    fn build_args(&self, request: &CompletionRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            self.config.output_format.clone(),
            "--max-turns".to_string(),
            request.max_turns.max(1).to_string(),
        ];

        if let Some(ref model) = self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(system_prompt) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.to_string());
        }

        args.push(request.prompt.clone());
        args
    }
}

#[async_trait]
impl CompletionService for ClaudeCodeCompletion {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    #[instrument(skip_all, fields(binary = %self.config.binary_path))]
    async fn complete(&self, request: CompletionRequest) -> DomainResult<CompletionResponse> {
        let started = Instant::now();
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.args(self.build_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_millis(request.timeout_ms), cmd.output())
            .await
            .map_err(|_| {
                warn!(timeout_ms = request.timeout_ms, "Claude Code completion timed out");
                DomainError::CompletionTimeout(request.timeout_ms)
            })?
            .map_err(|e| DomainError::CompletionFailed(format!("Failed to execute Claude Code: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::CompletionFailed(format!("Claude Code failed: {}", stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(DomainError::CompletionFailed("Claude Code returned no output".to_string()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(duration_ms, chars = text.len(), "Claude Code completion finished");
        Ok(CompletionResponse { text, duration_ms })
    }
}
