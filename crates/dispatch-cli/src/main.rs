//! Dispatch CLI - route task descriptions from the command line
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use cli::{Cli, Commands, ConfigAction, RulesAction};
use handlers::EngineOptions;
use std::io;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

mod cli;
mod handlers;

const DEFAULT_FILTER: &str = "dispatch_routing=info,dispatch_cli=info";
const VERBOSE_FILTER: &str = "dispatch_routing=debug,dispatch_cli=debug";

fn init_tracing(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = EngineOptions {
        config: cli.config,
        rules: cli.rules,
        weights: cli.weights,
    };

    match cli.command {
        Commands::Route {
            description,
            context,
            json,
        } => handlers::handle_route(&options, description, context, json).await?,
        Commands::Batch { file, json } => handlers::handle_batch(&options, &file, json).await?,
        Commands::Rules { action } => match action {
            RulesAction::Dump { output } => handlers::handle_rules_dump(output).await?,
            RulesAction::Check { path } => handlers::handle_rules_check(&path)?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Init { output } => handlers::handle_config_init(output)?,
        },
    }

    Ok(())
}
