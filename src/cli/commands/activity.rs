//! Implementation of the `homr activity` command.

use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::id_resolver::resolve_optional_outcome;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{ActivityEntry, ActivityKind, ActivityQuery};

#[derive(Args, Debug)]
pub struct ActivityArgs {
    /// Outcome ID or unique prefix
    #[arg(short, long)]
    pub outcome: Option<String>,

    /// Filter by kind (observation, steering, escalation, resolution, auto_resolved, auto_resolve_deferred)
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Maximum number of entries
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Entries to skip, newest first
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct ActivityOutput {
    pub total: usize,
    pub entries: Vec<ActivityEntry>,
}

impl CommandOutput for ActivityOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No activity recorded.".to_string();
        }
        format!(
            "{}\nShowing {} entr{}",
            TableFormatter::new().format_activity(&self.entries),
            self.total,
            if self.total == 1 { "y" } else { "ies" }
        )
    }
}

pub async fn execute(args: ActivityArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    let query = ActivityQuery {
        outcome_id: resolve_optional_outcome(&ctx.pool, args.outcome.as_deref()).await?,
        kind: args
            .kind
            .map(|k| ActivityKind::from_str(&k).ok_or_else(|| anyhow!("Invalid activity kind: {k}")))
            .transpose()?,
        limit: args.limit,
        offset: args.offset,
    };
    let entries = ctx.supervisor.activity(&query).await?;
    output(
        &ActivityOutput {
            total: entries.len(),
            entries,
        },
        json_mode,
    );
    Ok(())
}
