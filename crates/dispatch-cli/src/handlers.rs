//! Command handlers for CLI operations

use anyhow::{Context as _, Result};
use dispatch_core::{RoutingConfig, RoutingDecision, RuleSet, TaskRequest, WeightTable};
use dispatch_routing::{MonitorReport, Rulebook, RoutingEngine};
use serde::Serialize;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::{info, warn};

/// Options shared by every routing command.
pub struct EngineOptions {
    pub config: Option<PathBuf>,
    pub rules: Option<PathBuf>,
    pub weights: Option<PathBuf>,
}

#[derive(Serialize)]
struct BatchOutput<'output> {
    decisions: &'output [RoutingDecision],
    report: &'output MonitorReport,
}

/// Loads the configuration from `path`, or from `~/.dispatch/config.toml`.
///
/// # Errors
/// Returns an error if an explicitly given file cannot be loaded
fn load_config(path: Option<&Path>) -> Result<RoutingConfig> {
    if let Some(path) = path {
        return RoutingConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()));
    }
    Ok(RoutingConfig::load_or_create().unwrap_or_else(|error| {
        warn!("Failed to load config from ~/.dispatch/config.toml: {error}");
        warn!("Using default configuration");
        RoutingConfig::default()
    }))
}

/// Builds an engine from the command-line options.
///
/// # Errors
/// Returns an error if the configuration, rules or weights cannot be loaded
async fn build_engine(options: &EngineOptions) -> Result<RoutingEngine> {
    let config = load_config(options.config.as_deref())?;
    let mut builder = RoutingEngine::builder().with_config(config);

    if let Some(path) = &options.rules {
        let rules = RuleSet::load_from_file(path)
            .with_context(|| format!("loading rules from {}", path.display()))?;
        info!(rules = %rules.name, version = rules.version, "using rule file");
        builder = builder.with_rules(rules);
    }

    if let Some(path) = &options.weights {
        if async_fs::try_exists(path).await.unwrap_or(false) {
            let weights = WeightTable::load_snapshot(path)
                .with_context(|| format!("loading weights from {}", path.display()))?;
            info!(revision = weights.revision, "weights loaded");
            builder = builder.with_weights(weights);
        }
    }

    Ok(builder.build()?)
}

/// Writes the learned weights back when a snapshot path was given.
///
/// # Errors
/// Returns an error if the snapshot cannot be written
fn save_weights(engine: &RoutingEngine, options: &EngineOptions) -> Result<()> {
    if let Some(path) = &options.weights {
        engine
            .weights()
            .save_snapshot(path)
            .with_context(|| format!("saving weights to {}", path.display()))?;
    }
    Ok(())
}

/// Route a single task and print the decision
///
/// # Errors
/// Returns an error if the engine cannot be built or output fails
pub async fn handle_route(
    options: &EngineOptions,
    description: String,
    context: Vec<(String, String)>,
    json: bool,
) -> Result<()> {
    let engine = build_engine(options).await?;
    let request = context
        .into_iter()
        .fold(TaskRequest::new(description), |request, (key, value)| {
            request.with_context(key, value)
        });
    let decision = engine.route(request).await;

    let mut stdout = io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&decision)?)?;
    } else {
        write_summary(&mut stdout, &decision)?;
    }
    drop(stdout);

    save_weights(&engine, options)
}

/// Route every non-empty line of a file and print the monitor report
///
/// # Errors
/// Returns an error if the file cannot be read or output fails
pub async fn handle_batch(options: &EngineOptions, file: &Path, json: bool) -> Result<()> {
    let contents = async_fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let requests: Vec<TaskRequest> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(TaskRequest::new)
        .collect();

    let engine = build_engine(options).await?;
    info!(tasks = requests.len(), "routing batch");
    let mut decisions = Vec::with_capacity(requests.len());
    for request in requests {
        decisions.push(engine.route(request).await);
    }
    let report = engine.report();

    let mut stdout = io::stdout().lock();
    if json {
        let output = BatchOutput {
            decisions: &decisions,
            report: &report,
        };
        writeln!(stdout, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        for decision in &decisions {
            writeln!(stdout, "{}", one_line(decision))?;
        }
        writeln!(stdout)?;
        write!(stdout, "{}", report.format_report()?)?;
    }
    drop(stdout);

    save_weights(&engine, options)
}

/// Print or write the built-in rule set
///
/// # Errors
/// Returns an error if the output cannot be written
pub async fn handle_rules_dump(output: Option<PathBuf>) -> Result<()> {
    let source = RuleSet::builtin_source();
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                async_fs::create_dir_all(parent).await?;
            }
            async_fs::write(&path, source)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "rule set written");
        }
        None => {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{source}")?;
        }
    }
    Ok(())
}

/// Load and validate a rule set file
///
/// # Errors
/// Returns an error if the file is unreadable or invalid
pub fn handle_rules_check(path: &Path) -> Result<()> {
    let rules = RuleSet::load_from_file(path)
        .with_context(|| format!("invalid rule set {}", path.display()))?;
    let compiled = Rulebook::compile(&rules)?;

    let mut stdout = io::stdout().lock();
    writeln!(
        stdout,
        "ok: '{}' v{} with {} domains and {} handlers",
        compiled.name(),
        compiled.version(),
        compiled.domains().len(),
        compiled.handlers().len()
    )?;
    Ok(())
}

/// Write the default configuration
///
/// # Errors
/// Returns an error if the destination cannot be written
pub fn handle_config_init(output: Option<PathBuf>) -> Result<()> {
    let path = match output {
        Some(path) => path,
        None => RoutingConfig::config_path()?,
    };
    RoutingConfig::default().save_to_file(&path)?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "wrote default configuration to {}", path.display())?;
    Ok(())
}

fn one_line(decision: &RoutingDecision) -> String {
    let target = decision.target.as_deref().unwrap_or("-");
    let fallback = if decision.fallback { " (fallback)" } else { "" };
    format!(
        "{:<11} {:<28} {:.2}{fallback}",
        decision.action.to_string(),
        target,
        decision.confidence
    )
}

fn write_summary(out: &mut impl io::Write, decision: &RoutingDecision) -> io::Result<()> {
    writeln!(out, "Action:      {}", decision.action)?;
    writeln!(out, "Target:      {}", decision.target.as_deref().unwrap_or("none"))?;
    if let Some(tier) = decision.tier {
        writeln!(out, "Tier:        {tier}")?;
    }
    writeln!(out, "Confidence:  {:.2}", decision.confidence)?;
    if let Some(complexity) = &decision.complexity {
        writeln!(
            out,
            "Complexity:  {} ({:.2})",
            complexity.label, complexity.value
        )?;
    }
    if !decision.domains.is_empty() {
        let domains: Vec<String> = decision
            .domains
            .iter()
            .map(|domain| format!("{} {:.2}", domain.domain_id, domain.confidence))
            .collect();
        writeln!(out, "Domains:     {}", domains.join(", "))?;
    }
    writeln!(out, "Escalation:  {:.2}", decision.escalation_score)?;
    if let Some(reason) = decision.fallback_reason {
        writeln!(out, "Fallback:    {reason}")?;
    }
    writeln!(out, "Reasoning:   {}", decision.reasoning)?;
    writeln!(out, "Time:        {:.2}ms", decision.decision_time_ms)?;
    Ok(())
}
