// src/lib.rs

pub mod cli;
pub mod color;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod idle;
pub mod logging;
pub mod observer;
pub mod orchestrator;
pub mod probe;
pub mod signals;
pub mod types;

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::command::CommandSpec;
use crate::config::load_and_validate;
use crate::engine::{Runtime, RuntimeOptions};
use crate::errors::{Result, TandemError};
use crate::orchestrator::{DEFAULT_PREFIX, Orchestrator, OrchestratorOptions};

/// Everything needed to start a session, after merging the config file
/// with CLI flags.
#[derive(Debug, Clone)]
pub struct Plan {
    pub options: OrchestratorOptions,
    pub commands: Vec<CommandSpec>,
    pub groups: Vec<String>,
    pub exit_when_idle: bool,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the orchestrator and its initial run
/// - the runtime loop (which also handles teardown signals)
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let plan = build_plan(&args)?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let (tx, rx) = engine::channel();
    let mut orchestrator = Orchestrator::new(plan.options, tx)?;
    for spec in plan.commands {
        orchestrator.add(spec)?;
    }

    if plan.groups.is_empty() {
        orchestrator.run::<&str>(&[])?;
    } else {
        info!(groups = ?plan.groups, "running selected groups");
        orchestrator.run_group(&plan.groups)?;
    }

    let options = RuntimeOptions {
        exit_when_idle: plan.exit_when_idle,
    };
    let mut runtime = Runtime::new(orchestrator, rx, options);
    runtime.run().await?;
    Ok(())
}

/// Merge the optional config file with CLI flags and positional commands.
pub fn build_plan(args: &CliArgs) -> Result<Plan> {
    let (mut options, mut commands, mut exit_when_idle) = match &args.config {
        Some(path) => {
            let cfg = load_and_validate(path)?;
            (
                cfg.orchestrator_options(),
                cfg.command_specs(),
                cfg.options.exit_when_idle,
            )
        }
        None => (OrchestratorOptions::default(), Vec::new(), false),
    };

    apply_overrides(args, &mut options);
    exit_when_idle |= args.exit_when_idle;

    if args.names.len() > args.commands.len() {
        return Err(TandemError::ConfigError(format!(
            "{} names given for {} commands",
            args.names.len(),
            args.commands.len()
        )));
    }
    if !args.names.is_empty() && args.prefix.is_none() && options.prefix == DEFAULT_PREFIX {
        options.prefix = "[{command}]".to_string();
    }

    for (i, line) in args.commands.iter().enumerate() {
        let mut spec = CommandSpec::from(line.as_str());
        if let Some(name) = args.names.get(i).filter(|n| !n.trim().is_empty()) {
            spec = spec.alias(name.trim());
        }
        commands.push(spec);
    }

    if commands.is_empty() {
        return Err(TandemError::ConfigError(
            "no commands given; pass commands as arguments or use --config".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for spec in &commands {
        let name = spec.name();
        if !seen.insert(name.clone()) {
            return Err(TandemError::ConfigError(format!(
                "duplicate command name '{name}'"
            )));
        }
    }

    debug!(commands = commands.len(), "plan built");
    Ok(Plan {
        options,
        commands,
        groups: args.groups.clone(),
        exit_when_idle,
    })
}

fn apply_overrides(args: &CliArgs, options: &mut OrchestratorOptions) {
    if let Some(prefix) = &args.prefix {
        options.prefix = prefix.clone();
    }
    if let Some(min) = args.prefix_min {
        options.prefix_min = min;
    }
    if let Some(max) = args.prefix_max {
        options.prefix_max = Some(max);
    }
    if let Some(align) = args.prefix_align {
        options.prefix_align = align.into();
    }
    if let Some(fill) = args.prefix_fill {
        options.prefix_fill = fill;
    }
    if let Some(format) = &args.timestamp_format {
        options.timestamp_format = format.clone();
    }
    if let Some(color) = &args.default_color {
        options.default_color = Some(color.clone());
    }
    if let Some(target) = &args.pipe_input {
        options.pipe_input = Some(target.clone());
    }
    options.condensed |= args.condensed;
    options.raw |= args.raw;
    options.output_exit_code |= args.output_exit_code;
    if args.no_signals {
        options.handle_signals = false;
    }
}

/// Print commands, groups and dependency edges.
fn print_dry_run(plan: &Plan) {
    println!("tandem dry-run");
    println!("  prefix = {:?}", plan.options.prefix);
    println!("  raw = {}, condensed = {}", plan.options.raw, plan.options.condensed);
    if !plan.groups.is_empty() {
        println!("  groups = {:?}", plan.groups);
    }
    println!();

    println!("commands ({}):", plan.commands.len());
    for spec in &plan.commands {
        println!("  - {}", spec.name());
        println!("      cmd: {}", spec.command_line());
        if !spec.runnable {
            println!("      runnable: false");
        }
        if !spec.groups.is_empty() {
            println!("      groups: {:?}", spec.groups);
        }
        if !spec.delay.is_zero() {
            println!("      delay: {:?}", spec.delay);
        }
        if let Some(probe) = &spec.probe {
            println!(
                "      probe: {}:{} x{} -> {}",
                probe.host,
                probe.port,
                probe.attempts,
                probe.target.as_deref().unwrap_or("-")
            );
        }
        if let Some(idle) = &spec.idle {
            println!(
                "      idle: tick {:?} -> {}",
                idle.tick,
                idle.target.as_deref().unwrap_or("-")
            );
        }
    }

    debug!("dry-run complete (no execution)");
}
