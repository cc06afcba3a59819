//! CLI type definitions
//!
//! Top-level clap structures; each command's arguments live next to its
//! implementation in [`super::commands`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{
    activity::ActivityArgs, analyze::AnalyzeArgs, auto_resolve::AutoResolveArgs, escalations::EscalationArgs,
    init::InitArgs, observe::ObserveArgs, outcome::OutcomeArgs, status::StatusArgs, task::TaskArgs,
};

#[derive(Parser, Debug)]
#[command(name = "homr")]
#[command(about = "HOMR - supervisory orchestration for autonomous task runs", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .homr/config.yaml plus HOMR_* variables)
    #[arg(short, long, global = true, env = "HOMR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration and database
    Init(InitArgs),

    /// Supervision summary of an outcome
    Status(StatusArgs),

    /// Outcome management
    Outcome(OutcomeArgs),

    /// Task management
    Task(TaskArgs),

    /// Review and resolve escalations
    Escalations(EscalationArgs),

    /// Auto-resolve configuration and runs
    AutoResolve(AutoResolveArgs),

    /// Improvement analysis over past escalations
    Analyze(AnalyzeArgs),

    /// Supervision activity feed
    Activity(ActivityArgs),

    /// Feed a task's output through the control loop
    Observe(ObserveArgs),
}
