//! Implementation of the `homr observe` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::progress::create_spinner;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::TaskStatus;
use crate::services::ControlLoopReport;

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("source").args(["output", "output_file"])))]
pub struct ObserveArgs {
    /// Task ID or unique prefix
    pub task: String,

    /// Task output text
    #[arg(short, long)]
    pub output: Option<String>,

    /// Read the task output from a file
    #[arg(short = 'f', long)]
    pub output_file: Option<PathBuf>,

    /// The task attempt failed
    #[arg(long)]
    pub failed: bool,

    /// Record the attempt as finished before observing
    #[arg(long)]
    pub finish: bool,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ObserveOutput(pub ControlLoopReport);

impl CommandOutput for ObserveOutput {
    fn to_human(&self) -> String {
        let r = &self.0;
        if r.skipped {
            return format!("Supervision is disabled for outcome {}; nothing observed.", r.outcome_id);
        }

        let mut lines = vec![format!("Task {}", r.task_id)];
        match &r.observation {
            Some(o) => {
                lines.push(format!(
                    "Observation: alignment {} ({}), {}",
                    o.alignment_score,
                    o.quality.as_str(),
                    if o.on_track { "on track" } else { "off track" }
                ));
                lines.push(format!(
                    "  {} drift item(s), {} discovery(ies), {} issue(s)",
                    o.drift.len(),
                    o.discoveries.len(),
                    o.quality_issues.len()
                ));
            }
            None => lines.push("Observation: none (model unavailable)".to_string()),
        }
        if let Some(pattern) = &r.failure_pattern {
            if let Some(kind) = pattern.pattern {
                lines.push(format!(
                    "Failure pattern: {} -> {}, paused {} worker(s)",
                    kind.as_str(),
                    pattern.recommendation.as_str(),
                    pattern.paused_workers.len()
                ));
            }
        }
        if let Some(steering) = &r.steering {
            lines.push(format!("Steering: {} action(s)", steering.actions.len()));
        }
        if let Some(escalation) = &r.escalation {
            lines.push(format!(
                "Escalation {} ({}): {}",
                escalation.id,
                escalation.status.as_str(),
                escalation.question.text
            ));
        }
        if let Some(attempt) = &r.auto_resolve {
            lines.push(format!(
                "Auto-resolve: {} (confidence {:.2})",
                if attempt.resolved { "resolved" } else { "deferred" },
                attempt.confidence
            ));
        }
        for error in &r.errors {
            lines.push(format!("Warning: {error}"));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: ObserveArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let task_id = resolve_task_id(&ctx.pool, &args.task).await?;
    let full_output = match (&args.output, &args.output_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => String::new(),
    };

    if args.finish {
        let task = ctx.tasks.get_task(task_id).await?;
        if !task.status.is_terminal() && task.status != TaskStatus::Pending {
            ctx.tasks.finish_task(task_id, !args.failed).await?;
        }
    }

    let spinner = create_spinner("Observing task output", json_mode);
    let report = ctx.supervisor.on_task_completed(task_id, &full_output, !args.failed).await;
    spinner.finish_and_clear();
    output(&ObserveOutput(report?), json_mode);
    Ok(())
}
