use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::Cli;
use cli::commands::Commands;
use formloop::executor::{ActionDispatcher, ExecutionContext, LocalActionDispatcher};
use formloop::form::{FormConfig, FormState};
use formloop::registry::{CollectOptions, ConflictDetector, VariableRegistry};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("formloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("formloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn load_form(path: &Path) -> Result<FormConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read form definition: {}", path.display()))?;
    FormConfig::from_yaml(&raw).with_context(|| format!("Failed to parse form: {}", path.display()))
}

/// Parse `key=value` seeds; values that parse as JSON keep their type,
/// everything else is a string.
fn parse_seeds(seeds: &[String]) -> Result<FormState> {
    let mut state = FormState::new();
    for seed in seeds {
        let (key, value) = seed
            .split_once('=')
            .ok_or_else(|| eyre::eyre!("--set expects key=value, got {:?}", seed))?;
        let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        state.set(key.to_string(), parsed);
    }
    Ok(state)
}

async fn handle_run_command(path: &Path, seeds: &[String], verbose: bool) -> Result<()> {
    let form = load_form(path)?;
    info!("Running form {} ({} actions)", form.id, form.actions.len());
    println!("{} {}", "Running:".green(), form.title);

    let mut ctx = ExecutionContext::new(parse_seeds(seeds)?);
    LocalActionDispatcher
        .dispatch(&form.actions, &form, &mut ctx)
        .await
        .with_context(|| format!("Form {} failed", form.id))?;

    for output in &ctx.outputs {
        println!("  {}", output);
    }
    if verbose {
        println!("{}", "Final state:".cyan());
        for (key, value) in ctx.state.iter() {
            println!("  {} = {}", key.bold(), value);
        }
    }
    println!("{} {} output(s)", "Done:".green(), ctx.outputs.len());
    Ok(())
}

fn handle_variables_command(path: &Path, internal: bool) -> Result<()> {
    let form = load_form(path)?;
    let options = if internal {
        CollectOptions::with_builtins()
    } else {
        CollectOptions::default()
    };
    let variables = VariableRegistry::collect_all_variables(&form, options);

    println!("{} {} variable(s)", "Variables:".cyan(), variables.len());
    for variable in &variables {
        let source = format!("{:?}", variable.source);
        let line = format!(
            "  {:<24} {:<16} {}",
            variable.name,
            source,
            variable.description.as_deref().unwrap_or("")
        );
        if variable.is_reserved {
            println!("{}", line.yellow());
        } else {
            println!("{}", line);
        }
    }
    Ok(())
}

fn handle_conflicts_command(path: &Path) -> Result<()> {
    let form = load_form(path)?;
    let variables = VariableRegistry::collect_all_variables(&form, CollectOptions::with_builtins());
    let conflicts = ConflictDetector::detect_conflicts(&variables);

    if conflicts.is_empty() {
        println!("{}", "No conflicts".green());
        return Ok(());
    }

    println!("{} {} conflict(s)", "Conflicts:".red(), conflicts.len());
    for conflict in &conflicts {
        println!(
            "  {} {:?} ({} definitions), try {}",
            conflict.variable_name.bold(),
            conflict.conflict_type,
            conflict.items.len(),
            conflict.suggestion.green()
        );
    }
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { form, set } => handle_run_command(form, set, cli.is_verbose()).await,
        Commands::Variables { form, internal } => handle_variables_command(form, *internal),
        Commands::Conflicts { form } => handle_conflicts_command(form),
    }
}
