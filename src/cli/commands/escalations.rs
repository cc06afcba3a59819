//! Implementation of the `homr escalations` commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::id_resolver::{resolve_escalation_id, resolve_optional_outcome};
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{actions_label, Escalation, EscalationStatus};
use crate::domain::ports::EscalationFilter;
use crate::services::Resolution;

#[derive(Args, Debug)]
pub struct EscalationArgs {
    #[command(subcommand)]
    pub command: EscalationCommands,
}

#[derive(Subcommand, Debug)]
pub enum EscalationCommands {
    /// List escalations (pending ones of active outcomes by default)
    List {
        /// Outcome ID or unique prefix
        #[arg(short, long)]
        outcome: Option<String>,

        /// Filter by status (pending, answered, dismissed); overrides the pending default
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show an escalation with its options
    Show {
        /// Escalation ID or unique prefix
        id: String,
    },
    /// Answer a pending escalation
    Answer {
        /// Escalation ID or unique prefix
        id: String,

        /// ID of the chosen option
        option: String,

        /// Extra guidance stored with the decision
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Dismiss a pending escalation and resume its tasks
    Dismiss {
        /// Escalation ID or unique prefix
        id: String,

        /// Why it no longer needs an answer
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct EscalationListOutput {
    pub total: usize,
    pub escalations: Vec<Escalation>,
}

impl CommandOutput for EscalationListOutput {
    fn to_human(&self) -> String {
        if self.escalations.is_empty() {
            return "No escalations found.".to_string();
        }
        format!(
            "{}\nShowing {} escalation(s)",
            TableFormatter::new().format_escalations(&self.escalations),
            self.total
        )
    }
}

#[derive(Debug, Serialize)]
pub struct EscalationDetailOutput {
    pub escalation: Escalation,
}

impl CommandOutput for EscalationDetailOutput {
    fn to_human(&self) -> String {
        let e = &self.escalation;
        let mut lines = vec![
            format!("Escalation: {}", e.id),
            format!("Outcome:    {}", e.outcome_id),
            format!("Status:     {}", e.status.as_str()),
            format!("Type:       {}", e.trigger.trigger_type.as_str()),
            format!("Trigger:    task {}", e.trigger.task_id),
            String::new(),
            e.question.text.clone(),
        ];
        if !e.question.context.is_empty() {
            lines.push(String::new());
            lines.push(e.question.context.clone());
        }
        if !e.trigger.evidence.is_empty() {
            lines.push(String::new());
            lines.push("Evidence:".to_string());
            lines.extend(e.trigger.evidence.iter().map(|line| format!("  > {line}")));
        }
        lines.push(String::new());
        lines.push("Options:".to_string());
        for option in &e.question.options {
            lines.push(format!("  [{}] {} ({})", option.id, option.label, option.actions_label()));
            if !option.description.is_empty() {
                lines.push(format!("      {}", option.description));
            }
            if !option.implications.is_empty() {
                lines.push(format!("      Implications: {}", option.implications));
            }
        }
        lines.push(String::new());
        lines.push(format!("Affected tasks: {}", e.affected_tasks.len()));
        if let Some(answer) = &e.answer {
            lines.push(format!(
                "Answered: {} by {} at {}",
                answer.selected_option,
                answer.answered_by.as_str(),
                answer.answered_at.format("%Y-%m-%d %H:%M:%S")
            ));
            if let Some(context) = &answer.additional_context {
                lines.push(format!("Context: {context}"));
            }
        }
        if let Some(reason) = &e.dismiss_reason {
            lines.push(format!("Dismissed: {reason}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct AnswerOutput {
    pub success: bool,
    pub resolution: Resolution,
}

impl CommandOutput for AnswerOutput {
    fn to_human(&self) -> String {
        let r = &self.resolution;
        let mut lines = vec![format!(
            "Escalation {} answered with '{}' ({})",
            r.escalation_id,
            r.selected_option,
            actions_label(&r.actions)
        )];
        for result in &r.action_results {
            let mark = if result.success { "ok" } else { "failed" };
            lines.push(format!("  [{mark}] {}: {}", result.task_id, result.detail));
        }
        if !r.resumed_tasks.is_empty() {
            lines.push(format!("Resumed {} task(s)", r.resumed_tasks.len()));
        }
        if !r.skipped_tasks.is_empty() {
            lines.push(format!("Skipped {} task(s)", r.skipped_tasks.len()));
        }
        if !r.decomposed_tasks.is_empty() {
            lines.push(format!("Created {} subtask(s)", r.decomposed_tasks.len()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct DismissOutput {
    pub success: bool,
    pub escalation_id: Uuid,
    pub resumed_tasks: Vec<Uuid>,
}

impl CommandOutput for DismissOutput {
    fn to_human(&self) -> String {
        format!(
            "Escalation {} dismissed; resumed {} task(s)",
            self.escalation_id,
            self.resumed_tasks.len()
        )
    }
}

pub async fn execute(args: EscalationArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match args.command {
        EscalationCommands::List { outcome, status } => {
            let outcome_id = resolve_optional_outcome(&ctx.pool, outcome.as_deref()).await?;
            let escalations = match status {
                None => ctx.supervisor.list_pending_escalations(outcome_id).await?,
                Some(status) => {
                    let status =
                        EscalationStatus::from_str(&status).ok_or_else(|| anyhow!("Invalid status: {status}"))?;
                    ctx.repos
                        .escalations
                        .list(EscalationFilter {
                            outcome_id,
                            status: Some(status),
                            ..Default::default()
                        })
                        .await?
                }
            };
            let out = EscalationListOutput {
                total: escalations.len(),
                escalations,
            };
            output(&out, json_mode);
        }

        EscalationCommands::Show { id } => {
            let escalation_id = resolve_escalation_id(&ctx.pool, &id).await?;
            let escalation = ctx.supervisor.get_escalation(escalation_id).await?;
            output(&EscalationDetailOutput { escalation }, json_mode);
        }

        EscalationCommands::Answer { id, option, context } => {
            let escalation_id = resolve_escalation_id(&ctx.pool, &id).await?;
            let resolution = ctx.supervisor.answer_escalation(escalation_id, &option, context).await?;
            output(
                &AnswerOutput {
                    success: true,
                    resolution,
                },
                json_mode,
            );
        }

        EscalationCommands::Dismiss { id, reason } => {
            let escalation_id = resolve_escalation_id(&ctx.pool, &id).await?;
            let resumed_tasks = ctx.supervisor.dismiss_escalation(escalation_id, reason).await?;
            output(
                &DismissOutput {
                    success: true,
                    escalation_id,
                    resumed_tasks,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
