//! Command-line entry point for the Nexous run engine.
//!
//! One `run` subcommand drives a project end to end; `replay` and `diff`
//! consume a previously written `trace.json`. Exit codes: 0 on success, 1 on
//! any failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use nexous_core::runner::{use_llm_from_env, RunOptions, Runner};
use nexous_core::trace::{load_trace, Trace};

#[derive(Parser, Debug)]
#[clap(name = "Nexous", author, version, about = "Nexous agent run engine")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a project end to end, writing one trace.json.
    Run {
        /// Path to the project YAML file.
        project: PathBuf,

        #[clap(long)]
        run_id: Option<String>,

        #[clap(long, help = "Force real LLM calls (overrides NEXOUS_USE_LLM)")]
        use_llm: bool,

        #[clap(long, help = "Load and validate the project and presets, then exit without executing")]
        dry_run: bool,

        #[clap(long, default_value = "traces")]
        trace_dir: PathBuf,

        #[clap(long, default_value = "presets")]
        preset_dir: PathBuf,

        #[clap(long, default_value = "workspace")]
        tool_base_dir: PathBuf,
    },
    /// Print a previously recorded trace.json.
    Replay {
        /// Path to a trace.json file.
        trace_path: PathBuf,
    },
    /// Compare two trace.json files agent-by-agent.
    Diff {
        left: PathBuf,
        right: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(log_level_filter).init();

    let result = match cli.command {
        Commands::Run { project, run_id, use_llm, dry_run, trace_dir, preset_dir, tool_base_dir } => {
            run_command(project, run_id, use_llm, dry_run, trace_dir, preset_dir, tool_base_dir).await
        }
        Commands::Replay { trace_path } => replay_command(trace_path),
        Commands::Diff { left, right } => diff_command(left, right),
    };

    if let Err(e) = result {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run_command(
    project: PathBuf,
    run_id: Option<String>,
    use_llm: bool,
    dry_run: bool,
    trace_dir: PathBuf,
    preset_dir: PathBuf,
    tool_base_dir: PathBuf,
) -> Result<()> {
    let options = RunOptions {
        run_id,
        use_llm: use_llm || use_llm_from_env(),
        dry_run,
        trace_root: trace_dir,
        preset_dir,
        tool_base_dir,
    };

    let outcome = Runner::run(&project, options).await.context("run failed")?;
    println!("run_id: {}", outcome.run_id);
    println!("status: {:?}", outcome.status);
    println!("trace: {}", outcome.trace_path.display());
    Ok(())
}

fn replay_command(trace_path: PathBuf) -> Result<()> {
    let trace = load_trace(&trace_path).with_context(|| format!("failed to load trace at {}", trace_path.display()))?;
    println!("project: {}", trace.project_id);
    println!("run: {}", trace.run_id);
    println!("status: {:?}", trace.status);
    for agent in &trace.agents {
        println!("  agent '{}' [{:?}] {} step(s)", agent.agent_id, agent.status, agent.steps.len());
        for step in &agent.steps {
            println!("    {} {:?}/{:?}", step.step_id, step.step_type, step.status);
        }
    }
    if let Some(summary) = &trace.summary {
        println!(
            "summary: {}/{} agents completed, {} llm calls, {} tool calls, {} tokens",
            summary.completed_agents, summary.total_agents, summary.total_llm_calls, summary.total_tool_calls, summary.total_tokens
        );
    }
    for error in &trace.errors {
        println!("error: [{}] agent={} step={} recoverable={} {}", error.kind, error.agent_id, error.step_id, error.recoverable, error.message);
    }
    Ok(())
}

fn diff_command(left: PathBuf, right: PathBuf) -> Result<()> {
    let left_trace = load_trace(&left).with_context(|| format!("failed to load trace at {}", left.display()))?;
    let right_trace = load_trace(&right).with_context(|| format!("failed to load trace at {}", right.display()))?;

    println!("left:  {} ({:?})", left_trace.run_id, left_trace.status);
    println!("right: {} ({:?})", right_trace.run_id, right_trace.status);

    if left_trace.project_id != right_trace.project_id {
        println!("~ project_id differs: '{}' vs '{}'", left_trace.project_id, right_trace.project_id);
    }
    if left_trace.status != right_trace.status {
        println!("~ status differs: {:?} vs {:?}", left_trace.status, right_trace.status);
    }
    let duration_diff = (left_trace.duration_ms - right_trace.duration_ms).abs();
    if duration_diff != 0 {
        println!(
            "~ duration_ms differs: {} vs {} (delta {})",
            left_trace.duration_ms, right_trace.duration_ms, duration_diff
        );
    }

    let agent_ids = |trace: &Trace| -> Vec<&str> { trace.agents.iter().map(|a| a.agent_id.as_str()).collect() };
    let left_ids = agent_ids(&left_trace);
    let right_ids = agent_ids(&right_trace);

    for id in &left_ids {
        if !right_ids.contains(id) {
            println!("- agent '{id}' present only in left");
        }
    }
    for id in &right_ids {
        if !left_ids.contains(id) {
            println!("+ agent '{id}' present only in right");
        }
    }

    for left_agent in &left_trace.agents {
        let Some(right_agent) = right_trace.agents.iter().find(|a| a.agent_id == left_agent.agent_id) else { continue };
        if left_agent.status != right_agent.status {
            println!("~ agent '{}' status differs: {:?} vs {:?}", left_agent.agent_id, left_agent.status, right_agent.status);
        }
        if left_agent.steps.len() != right_agent.steps.len() {
            println!(
                "~ agent '{}' step count differs: {} vs {}",
                left_agent.agent_id,
                left_agent.steps.len(),
                right_agent.steps.len()
            );
        }
    }

    Ok(())
}
