//! Implementation of the `homr auto-resolve` commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::id_resolver::{resolve_escalation_id, resolve_outcome_id};
use crate::cli::output::progress::create_spinner;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{AutoResolveConfig, AutoResolveMode};
use crate::services::{AutoResolveAttempt, AutoResolveSummary};

#[derive(Args, Debug)]
pub struct AutoResolveArgs {
    #[command(subcommand)]
    pub command: AutoResolveCommands,
}

#[derive(Subcommand, Debug)]
pub enum AutoResolveCommands {
    /// Show an outcome's auto-resolve configuration
    Show {
        /// Outcome ID or unique prefix
        outcome: String,
    },
    /// Change an outcome's auto-resolve configuration
    Set {
        /// Outcome ID or unique prefix
        outcome: String,

        /// manual, semi-auto or full-auto
        #[arg(short, long)]
        mode: Option<String>,

        /// Minimum confidence (0.0-1.0) to commit a resolution
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Try to resolve pending escalations without a human
    Run {
        /// Outcome ID or unique prefix
        outcome: String,

        /// Only this escalation (ID or unique prefix)
        #[arg(short, long)]
        escalation: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct AutoResolveConfigOutput {
    pub outcome_id: Uuid,
    pub config: AutoResolveConfig,
}

impl CommandOutput for AutoResolveConfigOutput {
    fn to_human(&self) -> String {
        format!(
            "Outcome {}\nMode:      {}\nThreshold: {:.2}",
            self.outcome_id,
            self.config.mode.as_str(),
            self.config.confidence_threshold
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct AttemptOutput(pub AutoResolveAttempt);

impl CommandOutput for AttemptOutput {
    fn to_human(&self) -> String {
        describe_attempt(&self.0)
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct SummaryOutput(pub AutoResolveSummary);

impl CommandOutput for SummaryOutput {
    fn to_human(&self) -> String {
        let s = &self.0;
        let mut lines = vec![format!(
            "Resolved {}, deferred {}, failed {}",
            s.resolved, s.deferred, s.failed
        )];
        lines.extend(s.attempts.iter().map(describe_attempt));
        lines.extend(s.errors.iter().map(|(id, err)| format!("  {id}: error: {err}")));
        lines.join("\n")
    }
}

fn describe_attempt(attempt: &AutoResolveAttempt) -> String {
    let verdict = if attempt.resolved {
        format!("resolved with '{}'", attempt.selected_option.as_deref().unwrap_or("?"))
    } else {
        "deferred to a human".to_string()
    };
    format!(
        "  {} [{}] {verdict} (confidence {:.2}): {}",
        attempt.escalation_id,
        attempt.category.as_str(),
        attempt.confidence,
        truncate(&attempt.reasoning, 100)
    )
}

pub async fn execute(args: AutoResolveArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match args.command {
        AutoResolveCommands::Show { outcome } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &outcome).await?;
            let config = ctx.supervisor.auto_resolve_config(outcome_id).await?;
            output(&AutoResolveConfigOutput { outcome_id, config }, json_mode);
        }

        AutoResolveCommands::Set {
            outcome,
            mode,
            threshold,
        } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &outcome).await?;
            let mut config = ctx.supervisor.auto_resolve_config(outcome_id).await?;
            if let Some(mode) = mode {
                config.mode = AutoResolveMode::from_str(&mode).ok_or_else(|| anyhow!("Invalid mode: {mode}"))?;
            }
            if let Some(threshold) = threshold {
                config.confidence_threshold = threshold;
            }
            ctx.supervisor.set_auto_resolve_config(outcome_id, config).await?;
            output(&AutoResolveConfigOutput { outcome_id, config }, json_mode);
        }

        AutoResolveCommands::Run { outcome, escalation } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &outcome).await?;
            let spinner = create_spinner("Evaluating escalations", json_mode);
            match escalation {
                Some(id) => {
                    let escalation_id = resolve_escalation_id(&ctx.pool, &id).await?;
                    let escalation = ctx.supervisor.get_escalation(escalation_id).await?;
                    if escalation.outcome_id != outcome_id {
                        spinner.finish_and_clear();
                        return Err(anyhow!("Escalation {escalation_id} belongs to another outcome"));
                    }
                    let attempt = ctx.supervisor.try_auto_resolve(escalation_id).await;
                    spinner.finish_and_clear();
                    output(&AttemptOutput(attempt?), json_mode);
                }
                None => {
                    let summary = ctx.supervisor.auto_resolve_all_pending(outcome_id).await;
                    spinner.finish_and_clear();
                    output(&SummaryOutput(summary?), json_mode);
                }
            }
        }
    }

    Ok(())
}
