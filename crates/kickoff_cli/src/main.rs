//! KICKOFF CLI
//!
//! Runs demo items through a background processor and reports the outcome.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod items;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use kickoff_runtime::{Extraction, Processor, ProcessorConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use items::{DemoKind, Plan, TaskList};

#[derive(Parser)]
#[command(name = "kickoff")]
#[command(about = "KICKOFF - start items one at a time from a background thread", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a batch of demo items
    Run(RunArgs),
    /// Check which kinds of value expose a start capability
    Check {
        /// Kinds to check
        #[arg(required = true, value_enum)]
        kinds: Vec<DemoKind>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Number items
    #[arg(long, default_value_t = 5)]
    numbers: u64,
    /// Greeting items
    #[arg(long, default_value_t = 5)]
    greetings: u64,
    /// Async task items
    #[arg(long, default_value_t = 0)]
    tasks: u64,
    /// How long each async task sleeps, in milliseconds
    #[arg(long, default_value_t = 50)]
    task_delay_ms: u64,
    /// Make every Nth number fail to start
    #[arg(long)]
    fail_every: Option<u64>,
    /// Maximum dispatches per window
    #[arg(long)]
    max_items: Option<usize>,
    /// Window length in seconds
    #[arg(long)]
    window: Option<f64>,
    /// Dispatch newest first
    #[arg(long)]
    lifo: bool,
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Summary format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl RunArgs {
    fn plan(&self) -> Plan {
        Plan {
            numbers: self.numbers,
            greetings: self.greetings,
            tasks: self.tasks,
            task_delay: Duration::from_millis(self.task_delay_ms),
            fail_every: self.fail_every,
        }
    }

    fn processor_config(&self) -> Result<ProcessorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                ProcessorConfig::from_json_str(&raw)
                    .wrap_err_with(|| format!("parsing {}", path.display()))?
            }
            None => ProcessorConfig::default(),
        };
        if self.max_items.is_some() {
            config.max_items = self.max_items;
        }
        if self.window.is_some() {
            config.window_secs = self.window;
        }
        if self.lifo {
            config.extraction = Extraction::Lifo;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    extraction: Extraction,
    rate_limit: Option<String>,
    total: usize,
    succeeded: Vec<String>,
    failed: Vec<FailureLine>,
    throttled: u64,
    elapsed_ms: u128,
    peak_in_window: Option<usize>,
    tasks_completed: usize,
}

#[derive(Debug, Serialize)]
struct FailureLine {
    item: String,
    error: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Check { kinds } => check(&kinds),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let config = args.processor_config()?;
    let limit = config.rate_limit()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .wrap_err("building async runtime")?;
    let tasks = TaskList::default();
    let items = items::build(&args.plan(), runtime.handle(), &tasks);

    let processor = Processor::new(items, &config)?;
    let started = Instant::now();
    processor.run()?;
    let completed = runtime.block_on(tasks.wait_all());
    let elapsed = started.elapsed();

    let monitor = processor.monitor();
    let summary = Summary {
        extraction: processor.extraction(),
        rate_limit: limit.map(|l| l.to_string()),
        total: processor.total(),
        succeeded: processor.succeeded().iter().map(|item| item.label()).collect(),
        failed: processor
            .failures()
            .into_iter()
            .map(|failed| FailureLine {
                item: failed.item.label(),
                error: failed.error.to_string(),
            })
            .collect(),
        throttled: monitor.metrics().throttled,
        elapsed_ms: elapsed.as_millis(),
        peak_in_window: limit.map(|l| monitor.peak_in_window(l.window())),
        tasks_completed: completed.len(),
    };

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        Format::Text => print_summary(&summary),
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("Dispatched {} items ({})", summary.total, summary.extraction);
    if let Some(limit) = &summary.rate_limit {
        println!("Rate limit: {}", limit);
    }
    println!("Succeeded: {}", summary.succeeded.len());
    for label in &summary.succeeded {
        println!("  {}", label);
    }
    println!("Failed: {}", summary.failed.len());
    for line in &summary.failed {
        println!("  {}: {}", line.item, line.error);
    }
    if let Some(peak) = summary.peak_in_window {
        println!("Peak dispatches per window: {} ({} throttled)", peak, summary.throttled);
    }
    if summary.tasks_completed > 0 {
        println!("Async tasks completed: {}", summary.tasks_completed);
    }
    println!("Elapsed: {}ms", summary.elapsed_ms);
}

fn check(kinds: &[DemoKind]) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .wrap_err("building async runtime")?;
    let tasks = TaskList::default();
    let check = items::capability_check();

    let candidates: Vec<_> = kinds
        .iter()
        .zip(0..)
        .map(|(kind, index)| items::candidate(*kind, index, runtime.handle(), &tasks))
        .collect();

    for candidate in &candidates {
        let verdict = if check.admits(candidate.value()) {
            "admitted"
        } else {
            "rejected"
        };
        println!("{}: {}", candidate.label(), verdict);
    }

    let processor = Processor::from_candidates(candidates, &check, &ProcessorConfig::default())?;
    println!("All {} values admitted", processor.total());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(std::iter::once("kickoff").chain(args.iter().copied()))
            .unwrap();
        match cli.command {
            Commands::Run(args) => args,
            Commands::Check { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_defaults() {
        let args = parse_run(&["run"]);
        assert_eq!(args.numbers, 5);
        assert_eq!(args.greetings, 5);
        assert_eq!(args.tasks, 0);
        assert_eq!(args.format, Format::Text);

        let config = args.processor_config().unwrap();
        assert_eq!(config, ProcessorConfig::default());
    }

    #[test]
    fn test_run_flags_build_config() {
        let args = parse_run(&["run", "--max-items", "1000", "--window", "1.25", "--lifo"]);
        let config = args.processor_config().unwrap();
        assert_eq!(config.extraction, Extraction::Lifo);

        let limit = config.rate_limit().unwrap().unwrap();
        assert_eq!(limit.max_items(), 1000);
        assert_eq!(limit.window(), Duration::from_millis(1250));
    }

    #[test]
    fn test_run_partial_limit_rejected() {
        let args = parse_run(&["run", "--max-items", "10"]);
        let config = args.processor_config().unwrap();
        assert!(config.rate_limit().is_err());
    }

    #[test]
    fn test_check_requires_kinds() {
        assert!(Cli::try_parse_from(["kickoff", "check"]).is_err());
        let cli = Cli::try_parse_from(["kickoff", "check", "number", "note"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Check { ref kinds } if kinds == &[DemoKind::Number, DemoKind::Note]
        ));
    }

    #[test]
    fn test_check_rejects_note() {
        assert!(check(&[DemoKind::Number, DemoKind::Greeting, DemoKind::Task]).is_ok());
        assert!(check(&[DemoKind::Number, DemoKind::Note]).is_err());
    }

    #[test]
    fn test_build_plan_with_failures_and_tasks() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .build()
            .unwrap();
        let tasks = TaskList::default();
        let plan = Plan {
            numbers: 6,
            greetings: 2,
            tasks: 3,
            task_delay: Duration::from_millis(1),
            fail_every: Some(3),
        };

        let items = items::build(&plan, runtime.handle(), &tasks);
        assert_eq!(items.len(), 11);

        let processor = Processor::new(items, &ProcessorConfig::default()).unwrap();
        processor.run().unwrap();

        let failed: Vec<String> = processor.failed().iter().map(|item| item.label()).collect();
        assert_eq!(failed, vec!["number-3", "number-6"]);
        assert_eq!(processor.succeeded_len(), 9);

        let mut completed = runtime.block_on(tasks.wait_all());
        completed.sort_unstable();
        assert_eq!(completed, vec![0, 1, 2]);
    }
}
