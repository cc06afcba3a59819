//! Port definitions (hexagonal architecture).
//!
//! Async traits for every boundary the supervision engine depends on:
//! persistence per entity, the completion service, task decomposition,
//! worker control and improvement analysis.

pub mod activity_repository;
pub mod analysis_job_repository;
pub mod completion;
pub mod context_repository;
pub mod escalation_repository;
pub mod improvement_analyzer;
pub mod observation_repository;
pub mod outcome_repository;
pub mod task_decomposer;
pub mod task_repository;
pub mod worker_control;

pub use activity_repository::ActivityRepository;
pub use analysis_job_repository::AnalysisJobRepository;
pub use completion::CompletionService;
pub use context_repository::ContextStoreRepository;
pub use escalation_repository::{EscalationFilter, EscalationRepository};
pub use improvement_analyzer::ImprovementAnalyzer;
pub use observation_repository::ObservationRepository;
pub use outcome_repository::OutcomeRepository;
pub use task_decomposer::TaskDecomposer;
pub use task_repository::{TaskFilter, TaskRepository};
pub use worker_control::WorkerControl;
