//! HOMR CLI entry point.

use clap::Parser;

use homr::cli::commands;
use homr::cli::context::load_config;
use homr::cli::{handle_error, Cli, CliContext, Commands};
use homr::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, json),
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, &config, json).await,
        command => match CliContext::open(config).await {
            Ok(ctx) => run(command, &ctx, json).await,
            Err(err) => Err(err),
        },
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}

async fn run(command: Commands, ctx: &CliContext, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Init(_) => Ok(()),
        Commands::Status(args) => commands::status::execute(args, ctx, json).await,
        Commands::Outcome(args) => commands::outcome::execute(args, ctx, json).await,
        Commands::Task(args) => commands::task::execute(args, ctx, json).await,
        Commands::Escalations(args) => commands::escalations::execute(args, ctx, json).await,
        Commands::AutoResolve(args) => commands::auto_resolve::execute(args, ctx, json).await,
        Commands::Analyze(args) => commands::analyze::execute(args, ctx, json).await,
        Commands::Activity(args) => commands::activity::execute(args, ctx, json).await,
        Commands::Observe(args) => commands::observe::execute(args, ctx, json).await,
    }
}
