//! Completion request/response models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key completion callers use to identify themselves.
pub const COMPONENT_KEY: &str = "component";

/// Default timeout for completion calls.
pub const DEFAULT_COMPLETION_TIMEOUT_MS: u64 = 45_000;

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_turns: u32,
    pub timeout_ms: u64,
    /// Free-form labels for tracing (`component`, `task_id`, ...).
    pub metadata: HashMap<String, String>,
}

impl CompletionRequest {
    /// Single-turn request with the default timeout.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            max_turns: 1,
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
            metadata: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Successful completion output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub duration_ms: u64,
}

/// Output of a task decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DecompositionResult {
    pub created_task_ids: Vec<uuid::Uuid>,
    pub reasoning: String,
}
