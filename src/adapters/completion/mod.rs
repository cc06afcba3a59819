//! Completion service backends.

pub mod anthropic_api;
pub mod claude_code;

pub use anthropic_api::{AnthropicApiCompletion, AnthropicApiConfig};
pub use claude_code::{ClaudeCodeCompletion, ClaudeCodeConfig};
