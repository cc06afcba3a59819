//! Implementation of the `homr task` commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::id_resolver::{resolve_optional_outcome, resolve_outcome_id, resolve_task_id};
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::cli::CliContext;
use crate::domain::models::{Task, TaskPriority, TaskStatus, DEFAULT_MAX_ATTEMPTS, DEFAULT_PHASE};
use crate::domain::ports::TaskFilter;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task to an outcome
    Add {
        /// Outcome ID or unique prefix
        outcome: String,

        /// Task title
        title: String,

        /// Task description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Priority (low, normal, high, critical)
        #[arg(short, long, default_value = "normal")]
        priority: String,

        /// Execution phase
        #[arg(long, default_value = DEFAULT_PHASE)]
        phase: String,

        /// Tasks that must complete first (IDs or prefixes, comma-separated)
        #[arg(short = 'D', long, value_delimiter = ',')]
        depends_on: Vec<String>,

        /// Attempts before the task fails permanently
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
    },
    /// List tasks
    List {
        /// Outcome ID or unique prefix
        #[arg(short, long)]
        outcome: Option<String>,

        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show a task
    Show {
        /// Task ID or unique prefix
        id: String,
    },
    /// Claim the next runnable task of an outcome
    Claim {
        /// Outcome ID or unique prefix
        outcome: String,

        /// Worker identifier recorded on the task
        #[arg(short, long)]
        worker: String,
    },
    /// Record that a claimed task finished
    Finish {
        /// Task ID or unique prefix
        id: String,

        /// The attempt failed
        #[arg(long)]
        failed: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub total: usize,
    pub tasks: Vec<Task>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        format!(
            "{}\nShowing {} task(s)",
            TableFormatter::new().format_tasks(&self.tasks),
            self.total
        )
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDetailOutput {
    pub task: Task,
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let t = &self.task;
        let mut lines = vec![
            format!("Task:     {}", t.id),
            format!("Title:    {}", t.title),
            format!("Outcome:  {}", t.outcome_id),
            format!(
                "Status:   {}{}",
                t.status.as_str(),
                if t.is_paused() { " (paused)" } else { "" }
            ),
            format!("Priority: {}", t.priority.as_str()),
            format!("Phase:    {}", t.phase),
            format!("Attempts: {}/{}", t.attempts, t.max_attempts),
        ];
        if let Some(worker) = &t.claimed_by {
            lines.push(format!("Worker:   {worker}"));
        }
        if !t.depends_on.is_empty() {
            lines.push("Depends on:".to_string());
            for dep in &t.depends_on {
                lines.push(format!("  - {dep}"));
            }
        }
        lines.push(String::new());
        lines.push(t.description.clone());
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TaskActionOutput {
    pub success: bool,
    pub message: String,
    pub task: Option<Task>,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: TaskArgs, ctx: &CliContext, json_mode: bool) -> Result<()> {
    match args.command {
        TaskCommands::Add {
            outcome,
            title,
            description,
            priority,
            phase,
            depends_on,
            max_attempts,
        } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &outcome).await?;
            let priority = TaskPriority::from_str(&priority).ok_or_else(|| anyhow!("Invalid priority: {priority}"))?;

            let mut task = Task::new(outcome_id, title, description)
                .with_priority(priority)
                .with_phase(phase)
                .with_max_attempts(max_attempts);
            for dep in &depends_on {
                task = task.with_dependency(resolve_task_id(&ctx.pool, dep).await?);
            }

            let task = ctx.tasks.create_task(task).await?;
            let out = TaskActionOutput {
                success: true,
                message: format!("Task created: {}", task.id),
                task: Some(task),
            };
            output(&out, json_mode);
        }

        TaskCommands::List { outcome, status } => {
            let filter = TaskFilter {
                outcome_id: resolve_optional_outcome(&ctx.pool, outcome.as_deref()).await?,
                status: status
                    .map(|s| TaskStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid status: {s}")))
                    .transpose()?,
            };
            let tasks = ctx.tasks.list_tasks(filter).await?;
            let out = TaskListOutput {
                total: tasks.len(),
                tasks,
            };
            output(&out, json_mode);
        }

        TaskCommands::Show { id } => {
            let task_id = resolve_task_id(&ctx.pool, &id).await?;
            let task = ctx.tasks.get_task(task_id).await?;
            output(&TaskDetailOutput { task }, json_mode);
        }

        TaskCommands::Claim { outcome, worker } => {
            let outcome_id = resolve_outcome_id(&ctx.pool, &outcome).await?;
            let out = match ctx.tasks.claim_next(outcome_id, &worker).await? {
                Some(task) => TaskActionOutput {
                    success: true,
                    message: format!("Claimed task {} ({})", task.id, task.title),
                    task: Some(task),
                },
                None => TaskActionOutput {
                    success: false,
                    message: "No claimable task.".to_string(),
                    task: None,
                },
            };
            output(&out, json_mode);
        }

        TaskCommands::Finish { id, failed } => {
            let task_id = resolve_task_id(&ctx.pool, &id).await?;
            let task = ctx.tasks.finish_task(task_id, !failed).await?;
            let out = TaskActionOutput {
                success: true,
                message: format!("Task {} is now {}", task.id, task.status.as_str()),
                task: Some(task),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
