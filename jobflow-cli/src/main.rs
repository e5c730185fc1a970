use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jobflow_core::Flow;
use jobflow_engine::{Config, JobStatus, Manager, Parallelism, RunReport};
use jobflow_store::{FileStore, MemoryStore, StoreRouter};

mod demo_functions;
mod loader;

#[derive(Parser)]
#[command(author, version, about = "Run a jobflow flow description", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow description against the demo function registry
    Run(RunArgs),
    /// Print a flow description's job graph without running it
    Show {
        /// Path to the flow description (.json, .yml, or .yaml)
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to the flow description (.json, .yml, or .yaml)
    file: PathBuf,
    /// Persist job records under this directory instead of in memory only
    #[arg(long)]
    store_dir: Option<PathBuf>,
    /// Run up to this many independently-ready jobs concurrently
    #[arg(long)]
    parallelism: Option<NonZeroUsize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Show { file } => show(&file),
    }
}

fn show(file: &PathBuf) -> Result<()> {
    let flow = loader::load_flow(file)?;
    print_flow(&flow, 0);
    Ok(())
}

fn print_flow(flow: &Flow, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}flow {} ({})", flow.name, flow.uuid);
    for child in &flow.children {
        match child {
            jobflow_core::FlowChild::Job(job) => {
                println!("{indent}  job {} ({}) -> {}", job.name, job.uuid, job.callable);
            }
            jobflow_core::FlowChild::Flow(sub) => print_flow(sub, depth + 1),
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let flow = loader::load_flow(&args.file)?;
    let registry = demo_functions::registry();

    let config = Config {
        parallelism: args
            .parallelism
            .map(Parallelism::Bounded)
            .unwrap_or(Config::default().parallelism),
    };

    let report = match args.store_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating store directory '{}'", dir.display()))?;
            let store = StoreRouter::new(Box::new(FileStore::new(dir)));
            Manager::new(&registry, &store, config).run(&flow)
        }
        None => {
            let store = StoreRouter::new(Box::new(MemoryStore::new()));
            Manager::new(&registry, &store, config).run(&flow)
        }
    }
    .context("running flow")?;

    print_report(&report);

    if report.iter().any(|(_, _, status)| matches!(status, JobStatus::Failed(_))) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for (uuid, index, status) in report.iter() {
        match status {
            JobStatus::Done(response) => {
                let output = serde_json::to_string(&jobflow_core::encode(&response.output))
                    .unwrap_or_else(|_| "<unserializable>".to_string());
                println!("done      {uuid} #{index}  {output}");
            }
            JobStatus::Cancelled => println!("cancelled {uuid} #{index}"),
            JobStatus::Failed(reason) => println!("failed    {uuid} #{index}  {reason}"),
        }
    }
}
