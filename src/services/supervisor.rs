//! Supervisor facade.
//!
//! Wires the control-loop components together and exposes the operator
//! surface: escalation lifecycle, status, auto-resolve configuration,
//! activity feed and analysis jobs.
//!
//! Every call that mutates an outcome takes that outcome's lock from
//! [`OutcomeLocks`], so two tasks completing in one outcome never race on
//! context compaction, dependency edges or escalation state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::affinity::KeywordAffinity;
use super::analysis_jobs::AnalysisJobRunner;
use super::auto_resolver::{AutoResolveAttempt, AutoResolveSummary, AutoResolver, AutoResolverConfig};
use super::context_store::ContextStoreService;
use super::dependency_graph::DependencyGraph;
use super::escalator::{Escalator, EscalatorConfig, Resolution};
use super::observer::{detect_ambiguity, Observer, ObserverConfig};
use super::outcome_locks::OutcomeLocks;
use super::steering::{SteeringEngine, SteeringResult};
use super::Repositories;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActivityDetails, ActivityEntry, ActivityQuery, AmbiguitySignal, AnalysisJob, AnalysisOptions,
    AutoResolveConfig, AutoResolveMode, ContextStats, DecisionSource, Escalation, FailurePatternReport,
    Observation, Outcome, OutcomeStatus, PatternRecommendation, StatCounter, Task, TaskStatus,
    DEFAULT_MAX_DISCOVERIES,
};
use crate::domain::ports::{
    CompletionService, EscalationFilter, ImprovementAnalyzer, TaskDecomposer, WorkerControl,
};

/// Tuning for every supervised component.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub observer: ObserverConfig,
    pub escalator: EscalatorConfig,
    pub auto_resolver: AutoResolverConfig,
    pub max_discoveries: usize,
    pub min_shared_keywords: usize,
    /// Activity entries included in [`HomrStatus`].
    pub status_activity_items: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            observer: ObserverConfig::default(),
            escalator: EscalatorConfig::default(),
            auto_resolver: AutoResolverConfig::default(),
            max_discoveries: DEFAULT_MAX_DISCOVERIES,
            min_shared_keywords: 2,
            status_activity_items: 10,
        }
    }
}

/// What one control-loop pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlLoopReport {
    pub task_id: Uuid,
    pub outcome_id: Uuid,
    /// Supervision is disabled for the outcome; nothing ran.
    pub skipped: bool,
    pub observation: Option<Observation>,
    pub failure_pattern: Option<FailurePatternReport>,
    pub steering: Option<SteeringResult>,
    pub escalation: Option<Escalation>,
    pub auto_resolve: Option<AutoResolveAttempt>,
    /// Non-fatal stage failures, in order.
    pub errors: Vec<String>,
}

/// Supervision summary of one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomrStatus {
    pub outcome_id: Uuid,
    pub outcome_name: String,
    pub enabled: bool,
    pub discoveries: usize,
    pub decisions: usize,
    pub constraints: usize,
    pub stats: ContextStats,
    pub pending_escalations: u64,
    pub auto_resolve: AutoResolveConfig,
    pub recent_activity: Vec<ActivityEntry>,
}

pub struct Supervisor {
    repos: Repositories,
    workers: Arc<dyn WorkerControl>,
    context: ContextStoreService,
    observer: Observer,
    steering: SteeringEngine,
    escalator: Arc<Escalator>,
    auto_resolver: AutoResolver,
    analysis: AnalysisJobRunner,
    locks: OutcomeLocks,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        repos: Repositories,
        completion: Arc<dyn CompletionService>,
        decomposer: Arc<dyn TaskDecomposer>,
        workers: Arc<dyn WorkerControl>,
        analyzer: Arc<dyn ImprovementAnalyzer>,
        config: SupervisorConfig,
    ) -> Self {
        let context = ContextStoreService::new(repos.contexts.clone());
        let graph = DependencyGraph::new(repos.tasks.clone());
        let observer = Observer::new(completion.clone(), repos.observations.clone(), config.observer.clone());
        let steering = SteeringEngine::new(repos.tasks.clone(), graph, context.clone(), repos.activity.clone())
            .with_max_discoveries(config.max_discoveries);
        let escalator = Arc::new(Escalator::new(
            repos.outcomes.clone(),
            repos.tasks.clone(),
            repos.escalations.clone(),
            repos.activity.clone(),
            context.clone(),
            completion.clone(),
            decomposer,
            Arc::new(KeywordAffinity::new(config.min_shared_keywords)),
            config.escalator.clone(),
        ));
        let auto_resolver = AutoResolver::new(
            escalator.clone(),
            repos.tasks.clone(),
            repos.activity.clone(),
            context.clone(),
            completion,
            config.auto_resolver.clone(),
        );
        let analysis = AnalysisJobRunner::new(repos.escalations.clone(), repos.jobs.clone(), analyzer);

        Self {
            repos,
            workers,
            context,
            observer,
            steering,
            escalator,
            auto_resolver,
            analysis,
            locks: OutcomeLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn context(&self) -> &ContextStoreService {
        &self.context
    }

    async fn outcome(&self, outcome_id: Uuid) -> DomainResult<Outcome> {
        self.repos
            .outcomes
            .get(outcome_id)
            .await?
            .ok_or(DomainError::OutcomeNotFound(outcome_id))
    }

    async fn task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.repos
            .tasks
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    /// Run the control loop for a task a worker just finished.
    ///
    /// Stage failures after the observation is persisted are recorded in
    /// the report and do not stop later stages.
    #[instrument(skip_all, fields(task_id = %task_id, success))]
    pub async fn on_task_completed(
        &self,
        task_id: Uuid,
        full_output: &str,
        success: bool,
    ) -> DomainResult<ControlLoopReport> {
        let task = self.task(task_id).await?;
        let outcome_id = task.outcome_id;
        let _guard = self.locks.lock(outcome_id).await;
        let outcome = self.outcome(outcome_id).await?;

        let mut report = ControlLoopReport {
            task_id,
            outcome_id,
            ..Default::default()
        };
        if !outcome.homr_enabled {
            report.skipped = true;
            return Ok(report);
        }

        let observation = if full_output.trim().is_empty() {
            Some(self.observer.quick_observe(&task, success))
        } else {
            let summary = self
                .context
                .prompt_summary(outcome_id, self.config.observer.context_summary_items)
                .await?;
            self.observer.observe(&task, full_output, &outcome, &summary).await
        };

        let ambiguity = match &observation {
            Some(observation) => {
                self.record_observation(&task, observation).await?;

                match self.check_failure_patterns(outcome_id, observation).await {
                    Ok(pattern) => report.failure_pattern = Some(pattern),
                    Err(e) => report.errors.push(format!("failure patterns: {e}")),
                }
                match self.steering.steer(observation).await {
                    Ok(result) => report.steering = Some(result),
                    Err(e) => report.errors.push(format!("steering: {e}")),
                }
                observation.ambiguity.clone()
            }
            // No model verdict; the output can still carry an ambiguity.
            None => detect_ambiguity(full_output),
        };
        report.observation = observation;

        if let Some(signal) = ambiguity {
            match self.escalate(&outcome, &task, &signal).await {
                Ok((escalation, attempt)) => {
                    report.escalation = Some(escalation);
                    report.auto_resolve = attempt;
                }
                Err(e) => report.errors.push(format!("escalation: {e}")),
            }
        }

        info!(
            outcome_id = %outcome_id,
            observed = report.observation.is_some(),
            escalated = report.escalation.is_some(),
            errors = report.errors.len(),
            "control loop finished"
        );
        Ok(report)
    }

    async fn record_observation(&self, task: &Task, observation: &Observation) -> DomainResult<()> {
        self.repos.observations.create(observation).await?;

        let discoveries: Vec<_> = observation
            .discoveries
            .iter()
            .cloned()
            .map(|d| d.with_source_task(task.id))
            .collect();
        let discovery_count = discoveries.len() as u64;
        self.context
            .mutate(task.outcome_id, |store| {
                for discovery in &discoveries {
                    store.add_discovery(discovery.clone());
                }
                store.increment(StatCounter::TasksObserved, 1);
                store.increment(StatCounter::DiscoveriesExtracted, discovery_count);
            })
            .await?;

        self.repos
            .activity
            .append(&ActivityEntry::new(
                task.outcome_id,
                format!(
                    "Observed '{}': alignment {} ({})",
                    task.title,
                    observation.alignment_score,
                    observation.quality.as_str()
                ),
                ActivityDetails::Observed {
                    task_id: task.id,
                    alignment_score: observation.alignment_score,
                    quality: observation.quality.as_str().to_string(),
                    on_track: observation.on_track,
                    drift_count: observation.drift.len(),
                    discovery_count: observation.discoveries.len(),
                },
            ))
            .await
    }

    /// Classify recent observations. Any detected pattern is logged to the
    /// activity feed; `escalate` also pauses the outcome's workers.
    async fn check_failure_patterns(
        &self,
        outcome_id: Uuid,
        observation: &Observation,
    ) -> DomainResult<FailurePatternReport> {
        let mut report = self.observer.detect_failure_patterns(outcome_id, observation).await?;
        match report.recommendation {
            PatternRecommendation::Continue => return Ok(report),
            PatternRecommendation::PauseForReview => {
                let pattern = report.pattern.map_or("unknown", |p| p.as_str());
                warn!(outcome_id = %outcome_id, pattern, "failure pattern detected, review recommended");
                self.log_failure_pattern(
                    outcome_id,
                    format!("Failure pattern '{pattern}': review recommended"),
                    &report,
                )
                .await?;
                return Ok(report);
            }
            PatternRecommendation::Escalate => {}
        }

        for worker in self.workers.active_workers_by_outcome(outcome_id).await? {
            match self.workers.pause_worker(&worker.id).await {
                Ok(()) => report.paused_workers.push(worker.id),
                Err(e) => warn!(worker_id = %worker.id, error = %e, "could not pause worker"),
            }
        }

        let pattern = report.pattern.map_or("unknown", |p| p.as_str());
        warn!(
            outcome_id = %outcome_id,
            pattern,
            paused = report.paused_workers.len(),
            "failure pattern detected, workers paused"
        );
        self.log_failure_pattern(
            outcome_id,
            format!("Failure pattern '{pattern}': paused {} worker(s)", report.paused_workers.len()),
            &report,
        )
        .await?;
        Ok(report)
    }

    async fn log_failure_pattern(
        &self,
        outcome_id: Uuid,
        summary: String,
        report: &FailurePatternReport,
    ) -> DomainResult<()> {
        self.repos
            .activity
            .append(&ActivityEntry::new(
                outcome_id,
                summary,
                ActivityDetails::FailurePatternDetected {
                    pattern: report.pattern.map_or("unknown", |p| p.as_str()).to_string(),
                    recommendation: report.recommendation.as_str().to_string(),
                    consecutive_failures: report.consecutive_failures,
                    average_alignment: report.average_alignment,
                    paused_workers: report.paused_workers.clone(),
                },
            ))
            .await
    }

    async fn escalate(
        &self,
        outcome: &Outcome,
        trigger: &Task,
        signal: &AmbiguitySignal,
    ) -> DomainResult<(Escalation, Option<AutoResolveAttempt>)> {
        // The trigger usually just finished; reopen it so it can be paused.
        let mut trigger = self.task(trigger.id).await?;
        if trigger.status != TaskStatus::Pending {
            trigger.status = TaskStatus::Pending;
            trigger.claimed_by = None;
            trigger.touch();
            self.repos.tasks.update(&trigger).await?;
        }

        let escalation = self.escalator.create_escalation(outcome.id, signal, &trigger).await?;
        if outcome.auto_resolve.mode != AutoResolveMode::FullAuto {
            return Ok((escalation, None));
        }

        match self.auto_resolver.try_auto_resolve(escalation.id, outcome.auto_resolve).await {
            Ok(attempt) => {
                let escalation = if attempt.resolved {
                    self.escalator.get(escalation.id).await?
                } else {
                    escalation
                };
                Ok((escalation, Some(attempt)))
            }
            Err(e) => {
                warn!(escalation_id = %escalation.id, error = %e, "auto-resolve failed");
                Ok((escalation, None))
            }
        }
    }

    /// Supervision summary of one outcome.
    pub async fn status(&self, outcome_id: Uuid) -> DomainResult<HomrStatus> {
        let outcome = self.outcome(outcome_id).await?;
        let store = self.context.load_or_create(outcome_id).await?;
        let pending_escalations = self
            .repos
            .escalations
            .count(EscalationFilter::pending(Some(outcome_id)))
            .await?;
        let recent_activity = self
            .activity(&ActivityQuery {
                outcome_id: Some(outcome_id),
                limit: self.config.status_activity_items,
                ..Default::default()
            })
            .await?;

        Ok(HomrStatus {
            outcome_id,
            outcome_name: outcome.name,
            enabled: outcome.homr_enabled,
            discoveries: store.discoveries.len(),
            decisions: store.decisions.len(),
            constraints: store.active_constraints().count(),
            stats: store.stats,
            pending_escalations,
            auto_resolve: outcome.auto_resolve,
            recent_activity,
        })
    }

    pub async fn set_enabled(&self, outcome_id: Uuid, enabled: bool) -> DomainResult<()> {
        let _guard = self.locks.lock(outcome_id).await;
        let mut outcome = self.outcome(outcome_id).await?;
        outcome.homr_enabled = enabled;
        outcome.updated_at = chrono::Utc::now();
        self.repos.outcomes.update(&outcome).await
    }

    pub async fn auto_resolve_config(&self, outcome_id: Uuid) -> DomainResult<AutoResolveConfig> {
        Ok(self.outcome(outcome_id).await?.auto_resolve)
    }

    #[instrument(skip_all, fields(outcome_id = %outcome_id, mode = config.mode.as_str()))]
    pub async fn set_auto_resolve_config(&self, outcome_id: Uuid, config: AutoResolveConfig) -> DomainResult<()> {
        config.validate()?;
        let _guard = self.locks.lock(outcome_id).await;
        let mut outcome = self.outcome(outcome_id).await?;
        outcome.auto_resolve = config;
        outcome.updated_at = chrono::Utc::now();
        self.repos.outcomes.update(&outcome).await?;
        info!(threshold = config.confidence_threshold, "auto-resolve configuration updated");
        Ok(())
    }

    /// Pending escalations of one outcome, or of every active outcome.
    pub async fn list_pending_escalations(&self, outcome_id: Option<Uuid>) -> DomainResult<Vec<Escalation>> {
        if let Some(outcome_id) = outcome_id {
            return self.escalator.list_pending(Some(outcome_id)).await;
        }
        let active: Vec<Uuid> = self
            .repos
            .outcomes
            .list(Some(OutcomeStatus::Active))
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();
        Ok(self
            .escalator
            .list_pending(None)
            .await?
            .into_iter()
            .filter(|e| active.contains(&e.outcome_id))
            .collect())
    }

    pub async fn get_escalation(&self, escalation_id: Uuid) -> DomainResult<Escalation> {
        self.escalator.get(escalation_id).await
    }

    /// Apply a human answer to a pending escalation.
    pub async fn answer_escalation(
        &self,
        escalation_id: Uuid,
        selected_option: &str,
        additional_context: Option<String>,
    ) -> DomainResult<Resolution> {
        let escalation = self.escalator.get(escalation_id).await?;
        let _guard = self.locks.lock(escalation.outcome_id).await;
        self.escalator
            .resolve_escalation(escalation_id, selected_option, additional_context, DecisionSource::Human)
            .await
    }

    pub async fn dismiss_escalation(&self, escalation_id: Uuid, reason: Option<String>) -> DomainResult<Vec<Uuid>> {
        let escalation = self.escalator.get(escalation_id).await?;
        let _guard = self.locks.lock(escalation.outcome_id).await;
        self.escalator.dismiss_escalation(escalation_id, reason).await
    }

    /// Auto-resolve one escalation with its outcome's configuration.
    pub async fn try_auto_resolve(&self, escalation_id: Uuid) -> DomainResult<AutoResolveAttempt> {
        let escalation = self.escalator.get(escalation_id).await?;
        let config = self.auto_resolve_config(escalation.outcome_id).await?;
        let _guard = self.locks.lock(escalation.outcome_id).await;
        self.auto_resolver.try_auto_resolve(escalation_id, config).await
    }

    /// Auto-resolve every pending escalation of an outcome with its configuration.
    pub async fn auto_resolve_all_pending(&self, outcome_id: Uuid) -> DomainResult<AutoResolveSummary> {
        let config = self.auto_resolve_config(outcome_id).await?;
        let _guard = self.locks.lock(outcome_id).await;
        self.auto_resolver.auto_resolve_all_pending(outcome_id, config).await
    }

    pub async fn activity(&self, query: &ActivityQuery) -> DomainResult<Vec<ActivityEntry>> {
        self.repos.activity.list(query).await
    }

    pub async fn start_analysis(&self, options: AnalysisOptions) -> DomainResult<Uuid> {
        if let Some(outcome_id) = options.outcome_id {
            self.outcome(outcome_id).await?;
        }
        self.analysis.start_background_analysis(options).await
    }

    pub async fn analysis_job(&self, job_id: Uuid) -> DomainResult<AnalysisJob> {
        self.analysis.get_job_status(job_id).await
    }

    pub async fn active_analysis_jobs(&self) -> DomainResult<Vec<AnalysisJob>> {
        self.analysis.active_jobs().await
    }

    pub async fn recent_analysis_jobs(&self, limit: usize) -> DomainResult<Vec<AnalysisJob>> {
        self.analysis.recent_jobs(limit).await
    }

    pub async fn mark_incorporated(&self, escalation_ids: &[Uuid], outcome_id: Uuid) -> DomainResult<u64> {
        self.outcome(outcome_id).await?;
        self.analysis.mark_incorporated(escalation_ids, outcome_id).await
    }
}
