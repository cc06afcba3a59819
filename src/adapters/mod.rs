//! Adapters for the external boundaries: persistence, completion backends,
//! improvement analysis, and test doubles.

pub mod analysis;
pub mod completion;
pub mod mock;
pub mod sqlite;

pub use analysis::TriggerClusterAnalyzer;
pub use completion::{AnthropicApiCompletion, AnthropicApiConfig, ClaudeCodeCompletion, ClaudeCodeConfig};
pub use mock::{MockCompletion, MockResponse, MockTaskDecomposer, MockWorkerControl};
