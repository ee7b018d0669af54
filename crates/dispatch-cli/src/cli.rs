use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the dispatch router
#[derive(Debug, Parser)]
#[command(name = "dispatch")]
#[command(about = "Route tasks to handlers, orchestrators or a strategic planner", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Configuration file [default: ~/.dispatch/config.toml]")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Rule set file replacing the built-in rules")]
    pub rules: Option<PathBuf>,

    #[arg(long, global = true, help = "Weight snapshot to load before and save after routing")]
    pub weights: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Route one task description")]
    Route {
        #[arg(help = "The task description")]
        description: String,

        #[arg(long = "context", value_parser = parse_key_value, help = "Context hint as KEY=VALUE")]
        context: Vec<(String, String)>,

        #[arg(long, help = "Print the decision as JSON")]
        json: bool,
    },

    #[command(about = "Route every non-empty line of a file")]
    Batch {
        #[arg(help = "File with one task description per line")]
        file: PathBuf,

        #[arg(long, help = "Print decisions and report as JSON")]
        json: bool,
    },

    #[command(about = "Inspect rule sets")]
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    #[command(about = "Manage the configuration file")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    #[command(about = "Print or write the built-in rule set")]
    Dump {
        #[arg(short, long, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "Load and validate a rule set file")]
    Check {
        #[arg(help = "Rule set file")]
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    #[command(about = "Write the default configuration")]
    Init {
        #[arg(short, long, help = "Destination [default: ~/.dispatch/config.toml]")]
        output: Option<PathBuf>,
    },
}

/// Parses a `KEY=VALUE` context hint.
///
/// # Errors
/// Returns an error if there is no `=` or the key is empty
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.trim().to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
