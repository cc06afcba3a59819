//! Implementation of the `homr analyze` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::cli::id_resolver::{resolve_escalation_id, resolve_job_id, resolve_optional_outcome, resolve_outcome_id};
use crate::cli::output::progress::create_spinner;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, short_id, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{AnalysisJob, AnalysisOptions, JobStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(subcommand)]
    pub command: AnalyzeCommands,
}

#[derive(Subcommand, Debug)]
pub enum AnalyzeCommands {
    /// Cluster recent escalations and propose improvements
    Start {
        /// Restrict to one outcome (ID or unique prefix)
        #[arg(short, long)]
        outcome: Option<String>,

        /// Days of escalations to consider
        #[arg(short, long)]
        lookback_days: Option<u32>,

        /// Maximum number of proposals
        #[arg(short, long)]
        max_proposals: Option<usize>,
    },
    /// Show an analysis job
    Status {
        /// Job ID or unique prefix
        job: String,
    },
    /// List analysis jobs
    List {
        /// Only pending or running jobs
        #[arg(long)]
        active: bool,

        /// Maximum number of jobs to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Record that escalations were folded into an improvement outcome
    Incorporate {
        /// Improvement outcome (ID or unique prefix)
        outcome: String,

        /// Escalation IDs or prefixes
        #[arg(required = true)]
        escalations: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct JobOutput {
    pub job: AnalysisJob,
}

impl CommandOutput for JobOutput {
    fn to_human(&self) -> String {
        let job = &self.job;
        let mut lines = vec![
            format!("Job:      {}", job.id),
            format!("Status:   {}", job.status.as_str()),
            format!("Progress: {}", job.progress),
        ];
        if let Some(error) = &job.error {
            lines.push(format!("Error:    {error}"));
        }
        if let Some(result) = &job.result {
            lines.push(String::new());
            lines.push(result.summary.clone());
            for cluster in &result.clusters {
                lines.push(format!(
                    "  cluster {} ({} escalation(s)): {}",
                    cluster.key,
                    cluster.escalation_ids.len(),
                    cluster.root_cause
                ));
            }
            if !result.proposals.is_empty() {
                lines.push(String::new());
                lines.push("Proposals:".to_string());
                for (i, proposal) in result.proposals.iter().enumerate() {
                    lines.push(format!("  {}. [{}] {}", i + 1, proposal.kind.as_str(), proposal.title));
                    lines.push(format!("     {}", proposal.description));
                }
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct JobListOutput {
    pub total: usize,
    pub jobs: Vec<AnalysisJob>,
}

impl CommandOutput for JobListOutput {
    fn to_human(&self) -> String {
        if self.jobs.is_empty() {
            return "No analysis jobs found.".to_string();
        }
        format!("{}\nShowing {} job(s)", TableFormatter::new().format_jobs(&self.jobs), self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct IncorporateOutput {
    pub success: bool,
    pub outcome_id: Uuid,
    pub updated: u64,
}

impl CommandOutput for IncorporateOutput {
    fn to_human(&self) -> String {
        format!(
            "Marked {} escalation(s) as incorporated into {}",
            self.updated,
            short_id(&self.outcome_id)
        )
    }
}

pub async fn execute(args: AnalyzeArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match args.command {
        AnalyzeCommands::Start {
            outcome,
            lookback_days,
            max_proposals,
        } => {
            let options = AnalysisOptions {
                outcome_id: resolve_optional_outcome(&ctx.pool, outcome.as_deref()).await?,
                lookback_days: lookback_days.unwrap_or(ctx.config.analysis.default_lookback_days),
                max_proposals: max_proposals.unwrap_or(ctx.config.analysis.default_max_proposals),
            };
            let job_id = ctx.supervisor.start_analysis(options).await?;
            let job = wait_for_job(ctx, job_id, json_mode).await?;
            output(&JobOutput { job }, json_mode);
        }

        AnalyzeCommands::Status { job } => {
            let job_id = resolve_job_id(&ctx.pool, &job).await?;
            let job = ctx.supervisor.analysis_job(job_id).await?;
            output(&JobOutput { job }, json_mode);
        }

        AnalyzeCommands::List { active, limit } => {
            let jobs = if active {
                ctx.supervisor.active_analysis_jobs().await?
            } else {
                ctx.supervisor.recent_analysis_jobs(limit).await?
            };
            let out = JobListOutput { total: jobs.len(), jobs };
            output(&out, json_mode);
        }

        AnalyzeCommands::Incorporate { outcome, escalations } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &outcome).await?;
            let mut ids = Vec::with_capacity(escalations.len());
            for prefix in &escalations {
                ids.push(resolve_escalation_id(&ctx.pool, prefix).await?);
            }
            let updated = ctx.supervisor.mark_incorporated(&ids, outcome_id).await?;
            output(
                &IncorporateOutput {
                    success: true,
                    outcome_id,
                    updated,
                },
                json_mode,
            );
        }
    }

    Ok(())
}

/// Poll a background job until it finishes, mirroring its progress on a spinner.
async fn wait_for_job(ctx: &CliContext, job_id: Uuid, json_mode: bool) -> Result<AnalysisJob> {
    let spinner = create_spinner("Starting analysis", json_mode);
    loop {
        let job = ctx.supervisor.analysis_job(job_id).await?;
        spinner.set_message(job.progress.clone());
        if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
            spinner.finish_and_clear();
            return Ok(job);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
