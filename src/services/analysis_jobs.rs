//! Background improvement-analysis jobs.
//!
//! `start_background_analysis` persists a pending job and returns at once;
//! execution happens on a spawned task and every transition is written back
//! so pollers always read the latest state.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AnalysisJob, AnalysisOptions, AnalysisResult};
use crate::domain::ports::{AnalysisJobRepository, EscalationFilter, EscalationRepository, ImprovementAnalyzer};

#[derive(Clone)]
pub struct AnalysisJobRunner {
    escalations: Arc<dyn EscalationRepository>,
    jobs: Arc<dyn AnalysisJobRepository>,
    analyzer: Arc<dyn ImprovementAnalyzer>,
}

impl AnalysisJobRunner {
    pub fn new(
        escalations: Arc<dyn EscalationRepository>,
        jobs: Arc<dyn AnalysisJobRepository>,
        analyzer: Arc<dyn ImprovementAnalyzer>,
    ) -> Self {
        Self {
            escalations,
            jobs,
            analyzer,
        }
    }

    /// Persist a pending job and run it in the background.
    #[instrument(skip_all, fields(outcome_id = ?options.outcome_id))]
    pub async fn start_background_analysis(&self, options: AnalysisOptions) -> DomainResult<Uuid> {
        if options.lookback_days == 0 || options.max_proposals == 0 {
            return Err(DomainError::ValidationFailed(
                "lookback_days and max_proposals must be positive".to_string(),
            ));
        }
        let job = AnalysisJob::new(options);
        self.jobs.create(&job).await?;

        let runner = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            if let Err(e) = runner.run_job(job_id).await {
                error!(job_id = %job_id, error = %e, "analysis job could not record its outcome");
            }
        });

        info!(job_id = %job_id, "analysis job started");
        Ok(job_id)
    }

    /// Execute a pending job to completion or failure.
    ///
    /// Analysis errors end in a `failed` job, not an `Err`; `Err` means the
    /// job state itself could not be read or written.
    pub async fn run_job(&self, job_id: Uuid) -> DomainResult<AnalysisJob> {
        let mut job = self.get_job_status(job_id).await?;
        job.start()?;
        if let Err(e) = self.jobs.update(&job).await {
            error!(job_id = %job_id, error = %e, "could not record analysis job start");
            // Best-effort terminal write; the start write already failed.
            if job.fail(format!("could not record job start: {e}")).is_ok() {
                if let Err(write_err) = self.jobs.update(&job).await {
                    warn!(job_id = %job_id, error = %write_err, "could not record analysis job failure");
                }
            }
            return Err(e);
        }

        match self.analyze(&mut job).await {
            Ok(result) => {
                info!(job_id = %job_id, clusters = result.clusters.len(), proposals = result.proposals.len(), "analysis job completed");
                job.complete(result)?;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "analysis job failed");
                job.fail(e.to_string())?;
            }
        }
        self.jobs.update(&job).await?;
        Ok(job)
    }

    async fn progress(&self, job: &mut AnalysisJob, message: String) -> DomainResult<()> {
        job.set_progress(message);
        self.jobs.update(job).await
    }

    async fn analyze(&self, job: &mut AnalysisJob) -> DomainResult<AnalysisResult> {
        let options = job.options;
        self.progress(job, "Fetching escalations".to_string()).await?;
        let escalations = self
            .escalations
            .list(EscalationFilter {
                outcome_id: options.outcome_id,
                status: None,
                since: Some(Utc::now() - Duration::days(i64::from(options.lookback_days))),
                exclude_incorporated: true,
            })
            .await?;

        if escalations.is_empty() {
            return Ok(AnalysisResult {
                summary: format!("No escalations to analyze in the last {} day(s)", options.lookback_days),
                ..Default::default()
            });
        }

        self.progress(job, format!("Clustering {} escalation(s)", escalations.len()))
            .await?;
        let clusters = self.analyzer.cluster(&escalations).await?;

        self.progress(job, format!("Generating proposals for {} cluster(s)", clusters.len()))
            .await?;
        let proposals = self.analyzer.propose(&clusters, options.max_proposals).await?;

        let summary = format!(
            "Analyzed {} escalation(s): {} cluster(s), {} proposal(s)",
            escalations.len(),
            clusters.len(),
            proposals.len()
        );
        Ok(AnalysisResult {
            escalations_analyzed: escalations.len(),
            clusters,
            proposals,
            summary,
        })
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> DomainResult<AnalysisJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or(DomainError::AnalysisJobNotFound(job_id))
    }

    pub async fn active_jobs(&self) -> DomainResult<Vec<AnalysisJob>> {
        self.jobs.list_active().await
    }

    pub async fn recent_jobs(&self, limit: usize) -> DomainResult<Vec<AnalysisJob>> {
        self.jobs.list_recent(limit).await
    }

    /// Stamp escalations as folded into `outcome_id` so later runs skip them.
    pub async fn mark_incorporated(&self, escalation_ids: &[Uuid], outcome_id: Uuid) -> DomainResult<u64> {
        let changed = self.escalations.mark_incorporated(escalation_ids, outcome_id).await?;
        info!(outcome_id = %outcome_id, changed, "escalations marked incorporated");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteAnalysisJobRepository, SqliteEscalationRepository,
        SqliteOutcomeRepository,
    };
    use crate::adapters::TriggerClusterAnalyzer;
    use crate::domain::models::{
        AmbiguityType, Escalation, EscalationQuestion, EscalationTrigger, JobStatus, Outcome,
        QuestionOption,
    };
    use crate::domain::ports::OutcomeRepository;

    fn escalation(outcome_id: Uuid, trigger_type: AmbiguityType, text: &str) -> Escalation {
        let task = Uuid::new_v4();
        Escalation::new(
            outcome_id,
            EscalationTrigger {
                trigger_type,
                task_id: task,
                evidence: vec![],
            },
            EscalationQuestion {
                text: text.to_string(),
                context: String::new(),
                options: vec![QuestionOption::new("a", "A"), QuestionOption::new("b", "B")],
            },
            vec![task],
        )
    }

    async fn setup() -> (AnalysisJobRunner, Arc<SqliteEscalationRepository>, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let outcome = Outcome::new("Analyzed", "An outcome with escalations");
        SqliteOutcomeRepository::new(pool.clone()).create(&outcome).await.unwrap();
        let escalations = Arc::new(SqliteEscalationRepository::new(pool.clone()));
        let runner = AnalysisJobRunner::new(
            escalations.clone(),
            Arc::new(SqliteAnalysisJobRepository::new(pool)),
            Arc::new(TriggerClusterAnalyzer::new()),
        );
        (runner, escalations, outcome.id)
    }

    async fn wait_for_terminal(runner: &AnalysisJobRunner, job_id: Uuid) -> AnalysisJob {
        for _ in 0..200 {
            let job = runner.get_job_status(job_id).await.unwrap();
            if !job.status.is_active() {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("analysis job {job_id} did not finish");
    }

    #[tokio::test]
    async fn test_background_job_clusters_escalations() {
        let (runner, escalations, outcome_id) = setup().await;
        for text in ["Which cache backend?", "Which cache eviction policy?"] {
            escalations
                .create(&escalation(outcome_id, AmbiguityType::MultipleApproaches, text))
                .await
                .unwrap();
        }
        escalations
            .create(&escalation(outcome_id, AmbiguityType::BlockingDecision, "Ship without auth?"))
            .await
            .unwrap();

        let job_id = runner
            .start_background_analysis(AnalysisOptions {
                outcome_id: Some(outcome_id),
                ..Default::default()
            })
            .await
            .unwrap();

        let job = wait_for_terminal(&runner, job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.unwrap();
        assert_eq!(result.escalations_analyzed, 3);
        assert_eq!(result.clusters[0].escalation_ids.len(), 2);
        assert!(!result.proposals.is_empty());
        assert!(runner.active_jobs().await.unwrap().is_empty());
    }

    /// Job store whose first `update` fails.
    struct FirstUpdateFails {
        inner: SqliteAnalysisJobRepository,
        failed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl AnalysisJobRepository for FirstUpdateFails {
        async fn create(&self, job: &AnalysisJob) -> DomainResult<()> {
            self.inner.create(job).await
        }

        async fn get(&self, id: Uuid) -> DomainResult<Option<AnalysisJob>> {
            self.inner.get(id).await
        }

        async fn update(&self, job: &AnalysisJob) -> DomainResult<()> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(DomainError::DatabaseError("database is locked".to_string()));
            }
            self.inner.update(job).await
        }

        async fn list_active(&self) -> DomainResult<Vec<AnalysisJob>> {
            self.inner.list_active().await
        }

        async fn list_recent(&self, limit: usize) -> DomainResult<Vec<AnalysisJob>> {
            self.inner.list_recent(limit).await
        }
    }

    #[tokio::test]
    async fn test_unrecorded_start_leaves_job_failed() {
        let pool = create_migrated_test_pool().await.unwrap();
        let jobs = Arc::new(FirstUpdateFails {
            inner: SqliteAnalysisJobRepository::new(pool.clone()),
            failed: std::sync::atomic::AtomicBool::new(false),
        });
        let runner = AnalysisJobRunner::new(
            Arc::new(SqliteEscalationRepository::new(pool)),
            jobs.clone(),
            Arc::new(TriggerClusterAnalyzer::new()),
        );
        let job = AnalysisJob::new(AnalysisOptions::default());
        jobs.create(&job).await.unwrap();

        assert!(matches!(runner.run_job(job.id).await, Err(DomainError::DatabaseError(_))));

        let stored = runner.get_job_status(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error.unwrap().contains("could not record job start"));
        assert!(runner.active_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incorporated_escalations_are_skipped() {
        let (runner, escalations, outcome_id) = setup().await;
        let e = escalation(outcome_id, AmbiguityType::UnclearRequirement, "What limit?");
        escalations.create(&e).await.unwrap();

        assert_eq!(runner.mark_incorporated(&[e.id], outcome_id).await.unwrap(), 1);

        let job = AnalysisJob::new(AnalysisOptions::default());
        runner.jobs.create(&job).await.unwrap();
        let job = runner.run_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.unwrap();
        assert_eq!(result.escalations_analyzed, 0);
        assert!(result.summary.starts_with("No escalations"));
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let (runner, _, _) = setup().await;
        let err = runner
            .start_background_analysis(AnalysisOptions {
                max_proposals: 0,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (runner, _, _) = setup().await;
        assert!(matches!(
            runner.get_job_status(Uuid::new_v4()).await,
            Err(DomainError::AnalysisJobNotFound(_))
        ));
    }
}
