//! Section-exploring unit-test engine.
//!
//! Runs the built-in self-test suite, printing one status line per section
//! and a summary at the end. See `sectrun --help`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error};

use sectrun::exit_codes;
use sectrun::io::config::{DEFAULT_CONFIG_PATH, RunConfig, load_config};
use sectrun::io::console::ConsoleReport;
use sectrun::io::summary::{RunSummary, write_summary};
use sectrun::{RunOrder, SessionError, TestSession, logging, selftest};

#[derive(Parser)]
#[command(
    name = "sectrun",
    version,
    about = "Run test cases section by section, one leaf path per cycle"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every test case that matches the filters.
    Run(RunArgs),
    /// Print the test cases that match the filters without running them.
    List {
        /// Comma-separated name prefixes.
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Comma-separated name prefixes; matches case and section names.
    #[arg(short, long)]
    filter: Option<String>,
    #[arg(long, value_enum)]
    order: Option<RunOrder>,
    /// Seed for `--order random`.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Only print failures and the summary.
    #[arg(short, long)]
    quiet: bool,
    /// Write a JSON summary of the run to PATH.
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::List { filter, config } => cmd_list(filter, config),
    }
}

fn load(path: Option<PathBuf>) -> Result<RunConfig> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    load_config(&path).with_context(|| format!("load config {}", path.display()))
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let mut cfg = load(args.config)?;
    if let Some(order) = args.order {
        cfg.order = order;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    if let Some(filter) = args.filter {
        cfg.filters = vec![filter];
    }
    if args.quiet {
        cfg.verbose = false;
    }
    if args.summary.is_some() {
        cfg.summary_path = args.summary;
    }
    cfg.validate().context("invalid command-line options")?;
    debug!(?cfg, "effective configuration");

    let mut session = TestSession::with_options(
        selftest::registry(),
        Box::new(ConsoleReport::stdout()),
        cfg.session_options(),
    );
    session.set_property("verbose", if cfg.verbose { "true" } else { "false" });
    for filter in &cfg.filters {
        session.add_filter(filter);
    }
    session.run_pre_inits();

    match session.run_all() {
        Ok(outcome) => {
            if let Some(path) = &cfg.summary_path {
                write_run_summary(path, &RunSummary::from_outcome(&outcome))?;
            }
            Ok(if outcome.result.passed() {
                exit_codes::OK
            } else {
                exit_codes::FAILED
            })
        }
        Err(SessionError::Fatal { outcome, source }) => {
            error!(case = %source.case, "run stopped by a fatal condition");
            let message = format!("{:#}", anyhow::Error::new(source));
            eprintln!("{message}");
            if let Some(path) = &cfg.summary_path {
                write_run_summary(path, &RunSummary::fatal(&outcome, message))?;
            }
            Ok(exit_codes::FATAL)
        }
        Err(err) => Err(err.into()),
    }
}

fn write_run_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    write_summary(path, summary).with_context(|| format!("write summary {}", path.display()))
}

fn cmd_list(filter: Option<String>, config: Option<PathBuf>) -> Result<i32> {
    let cfg = load(config)?;
    let mut session = TestSession::with_options(
        selftest::registry(),
        Box::new(ConsoleReport::stdout()),
        cfg.session_options(),
    );
    let filters = filter.map(|filter| vec![filter]).unwrap_or(cfg.filters);
    for filter in &filters {
        session.add_filter(filter);
    }
    session.list();
    Ok(exit_codes::OK)
}
