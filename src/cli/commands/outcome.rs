//! Implementation of the `homr outcome` commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::id_resolver::resolve_outcome_id;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{AutoResolveConfig, Outcome, OutcomeStatus};

#[derive(Args, Debug)]
pub struct OutcomeArgs {
    #[command(subcommand)]
    pub command: OutcomeCommands,
}

#[derive(Subcommand, Debug)]
pub enum OutcomeCommands {
    /// Create a new outcome
    Create {
        /// Short name
        name: String,

        /// What the outcome should achieve
        #[arg(short, long)]
        intent: String,

        /// Chosen design approach, if already decided
        #[arg(short, long)]
        design_approach: Option<String>,
    },
    /// List outcomes
    List {
        /// Filter by status (active, paused, achieved, archived)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show an outcome
    Show {
        /// Outcome ID or unique prefix
        id: String,
    },
    /// Turn supervision on for an outcome
    Enable {
        /// Outcome ID or unique prefix
        id: String,
    },
    /// Turn supervision off for an outcome
    Disable {
        /// Outcome ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct OutcomeListOutput {
    pub total: usize,
    pub outcomes: Vec<Outcome>,
}

impl CommandOutput for OutcomeListOutput {
    fn to_human(&self) -> String {
        if self.outcomes.is_empty() {
            return "No outcomes found.".to_string();
        }
        format!(
            "{}\nShowing {} outcome(s)",
            TableFormatter::new().format_outcomes(&self.outcomes),
            self.total
        )
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeDetailOutput {
    pub outcome: Outcome,
}

impl CommandOutput for OutcomeDetailOutput {
    fn to_human(&self) -> String {
        let o = &self.outcome;
        let mut lines = vec![
            format!("Outcome: {}", o.id),
            format!("Name:    {}", o.name),
            format!("Status:  {}", o.status.as_str()),
            format!("HOMR:    {}", if o.homr_enabled { "enabled" } else { "disabled" }),
            format!(
                "Auto-resolve: {} (threshold {:.2})",
                o.auto_resolve.mode.as_str(),
                o.auto_resolve.confidence_threshold
            ),
            format!("Intent:  {}", o.intent),
        ];
        if let Some(approach) = &o.design_approach {
            lines.push(format!("Design:  {approach}"));
        }
        lines.push(format!("Created: {}", o.created_at.format("%Y-%m-%d %H:%M:%S")));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeActionOutput {
    pub success: bool,
    pub message: String,
    pub outcome_id: uuid::Uuid,
}

impl CommandOutput for OutcomeActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: OutcomeArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match args.command {
        OutcomeCommands::Create {
            name,
            intent,
            design_approach,
        } => {
            let defaults = &ctx.config.auto_resolve;
            let auto_resolve = AutoResolveConfig::new(defaults.default_mode, defaults.default_confidence_threshold)?;
            let mut outcome = Outcome::new(name, intent).with_auto_resolve(auto_resolve);
            if let Some(approach) = design_approach {
                outcome = outcome.with_design_approach(approach);
            }
            ctx.repos.outcomes.create(&outcome).await?;

            let out = OutcomeActionOutput {
                success: true,
                message: format!("Outcome created: {}", outcome.id),
                outcome_id: outcome.id,
            };
            output(&out, json_mode);
        }

        OutcomeCommands::List { status } => {
            let status = status
                .map(|s| OutcomeStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid status: {s}")))
                .transpose()?;
            let outcomes = ctx.repos.outcomes.list(status).await?;
            let out = OutcomeListOutput {
                total: outcomes.len(),
                outcomes,
            };
            output(&out, json_mode);
        }

        OutcomeCommands::Show { id } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &id).await?;
            let outcome = ctx
                .repos
                .outcomes
                .get(outcome_id)
                .await?
                .ok_or_else(|| anyhow!("Outcome not found: {id}"))?;
            output(&OutcomeDetailOutput { outcome }, json_mode);
        }

        OutcomeCommands::Enable { id } => set_enabled(ctx, &id, true, json_mode).await?,
        OutcomeCommands::Disable { id } => set_enabled(ctx, &id, false, json_mode).await?,
    }

    Ok(())
}

async fn set_enabled(ctx: &CliContext, id: &str, enabled: bool, json_mode: bool) -> Result<()> {
    let outcome_id = resolve_outcome_id(&ctx.pool, id).await?;
    ctx.supervisor.set_enabled(outcome_id, enabled).await?;
    let out = OutcomeActionOutput {
        success: true,
        message: format!(
            "Supervision {} for outcome {outcome_id}",
            if enabled { "enabled" } else { "disabled" }
        ),
        outcome_id,
    };
    output(&out, json_mode);
    Ok(())
}
