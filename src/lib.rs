//! HOMR - supervisory orchestration for autonomous task runs
//!
//! HOMR watches the tasks an outcome's workers complete, judges each output
//! against the outcome's intent, steers the remaining work, and escalates
//! genuine ambiguity to a human (or, when configured, resolves it itself).
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, errors and the ports services depend on
//! - **Service Layer** (`services`): observer, steering, escalator, auto-resolver,
//!   analysis jobs and the [`services::Supervisor`] facade
//! - **Adapters** (`adapters`): SQLite repositories, completion backends, test doubles
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): the `homr` operator binary
//!
//! # Example
//!
//! ```ignore
//! use homr::services::{Repositories, Supervisor, SupervisorConfig};
//!
//! let supervisor = Supervisor::new(repos, completion, decomposer, workers, analyzer, SupervisorConfig::default());
//! let report = supervisor.on_task_completed(task_id, &output, true).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::HomrConfig;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ControlLoopReport, HomrStatus, Repositories, Supervisor, SupervisorConfig};
