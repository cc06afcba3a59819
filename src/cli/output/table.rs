//! Table output for CLI listings, built on comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::{short_id, truncate};
use crate::domain::models::{ActivityEntry, AnalysisJob, Escalation, EscalationStatus, JobStatus, Outcome, Task, TaskStatus};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    fn base_table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
        table
    }

    fn colored(&self, text: &str, color: Color) -> Cell {
        if self.use_colors {
            Cell::new(text).fg(color)
        } else {
            Cell::new(text)
        }
    }

    pub fn format_outcomes(&self, outcomes: &[Outcome]) -> String {
        let mut table = self.base_table(&["ID", "Name", "Status", "HOMR", "Auto-resolve"]);
        for outcome in outcomes {
            table.add_row(vec![
                Cell::new(short_id(&outcome.id)),
                Cell::new(truncate(&outcome.name, 40)),
                Cell::new(outcome.status.as_str()),
                Cell::new(if outcome.homr_enabled { "on" } else { "off" }),
                Cell::new(format!(
                    "{} @ {:.2}",
                    outcome.auto_resolve.mode.as_str(),
                    outcome.auto_resolve.confidence_threshold
                )),
            ]);
        }
        table.to_string()
    }

    pub fn format_tasks(&self, tasks: &[Task]) -> String {
        let mut table = self.base_table(&["ID", "Title", "Status", "Priority", "Attempts", "Deps"]);
        for task in tasks {
            let status = if task.is_paused() {
                "paused".to_string()
            } else {
                task.status.as_str().to_string()
            };
            table.add_row(vec![
                Cell::new(short_id(&task.id)),
                Cell::new(truncate(&task.title, 40)),
                self.colored(&status, task_status_color(task)),
                Cell::new(task.priority.as_str()),
                Cell::new(format!("{}/{}", task.attempts, task.max_attempts)),
                Cell::new(task.depends_on.len()),
            ]);
        }
        table.to_string()
    }

    pub fn format_escalations(&self, escalations: &[Escalation]) -> String {
        let mut table = self.base_table(&["ID", "Type", "Status", "Question", "Affected", "Created"]);
        for escalation in escalations {
            table.add_row(vec![
                Cell::new(short_id(&escalation.id)),
                Cell::new(escalation.trigger.trigger_type.as_str()),
                self.colored(escalation.status.as_str(), escalation_status_color(escalation.status)),
                Cell::new(truncate(&escalation.question.text, 50)),
                Cell::new(escalation.affected_tasks.len()),
                Cell::new(escalation.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }
        table.to_string()
    }

    pub fn format_activity(&self, entries: &[ActivityEntry]) -> String {
        let mut table = self.base_table(&["When", "Kind", "Summary"]);
        for entry in entries {
            table.add_row(vec![
                Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                Cell::new(entry.kind.as_str()),
                Cell::new(truncate(&entry.summary, 80)),
            ]);
        }
        table.to_string()
    }

    pub fn format_jobs(&self, jobs: &[AnalysisJob]) -> String {
        let mut table = self.base_table(&["ID", "Status", "Progress", "Lookback", "Created"]);
        for job in jobs {
            table.add_row(vec![
                Cell::new(short_id(&job.id)),
                self.colored(job.status.as_str(), job_status_color(job.status)),
                Cell::new(truncate(&job.progress, 50)),
                Cell::new(format!("{}d", job.options.lookback_days)),
                Cell::new(job.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }
        table.to_string()
    }
}

fn task_status_color(task: &Task) -> Color {
    if task.is_paused() {
        return Color::Yellow;
    }
    match task.status {
        TaskStatus::Pending => Color::White,
        TaskStatus::Claimed | TaskStatus::Running => Color::Cyan,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed => Color::Red,
    }
}

fn escalation_status_color(status: EscalationStatus) -> Color {
    match status {
        EscalationStatus::Pending => Color::Yellow,
        EscalationStatus::Answered => Color::Green,
        EscalationStatus::Dismissed => Color::DarkGrey,
    }
}

fn job_status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Pending | JobStatus::Running => Color::Cyan,
        JobStatus::Completed => Color::Green,
        JobStatus::Failed => Color::Red,
    }
}

/// Whether the terminal should get colored output; honors `NO_COLOR`.
pub fn supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}
