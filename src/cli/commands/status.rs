//! Implementation of the `homr status` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::id_resolver::resolve_outcome_id;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::services::HomrStatus;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Outcome ID or unique prefix
    pub outcome: String,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct StatusOutput(pub HomrStatus);

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let s = &self.0;
        let mut lines = vec![
            format!("Outcome: {} ({})", s.outcome_name, s.outcome_id),
            format!("Supervision: {}", if s.enabled { "enabled" } else { "disabled" }),
            format!(
                "Auto-resolve: {} (threshold {:.2})",
                s.auto_resolve.mode.as_str(),
                s.auto_resolve.confidence_threshold
            ),
            format!("Pending escalations: {}", s.pending_escalations),
            String::new(),
            format!(
                "Context: {} discoveries, {} decisions, {} active constraints",
                s.discoveries, s.decisions, s.constraints
            ),
            format!(
                "Stats:   {} tasks observed, {} discoveries extracted, {} escalations, {} steering actions",
                s.stats.tasks_observed,
                s.stats.discoveries_extracted,
                s.stats.escalations_created,
                s.stats.steering_actions
            ),
        ];
        if !s.recent_activity.is_empty() {
            lines.push(String::new());
            lines.push("Recent activity:".to_string());
            lines.push(TableFormatter::new().format_activity(&s.recent_activity));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: StatusArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let outcome_id = resolve_outcome_id(&ctx.pool, &args.outcome).await?;
    let status = ctx.supervisor.status(outcome_id).await?;
    output(&StatusOutput(status), json_mode);
    Ok(())
}
