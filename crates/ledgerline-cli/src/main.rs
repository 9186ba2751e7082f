#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use ledgerline_core::config;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ldg: replay, check and sync budget tables",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Replay an event log over a snapshot",
        long_about = "Build the table from a snapshot, apply a JSON array of change events, and report the final rows, totals and digest.",
        after_help = "EXAMPLES:\n    # Replay and print the resulting table\n    ldg replay scope.json events.json\n\n    # Skip rejected events and fail on invariant violations\n    ldg replay scope.json events.json --lenient --check\n\n    # Emit machine-readable output\n    ldg replay scope.json events.json --json"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Check a snapshot's table invariants",
        long_about = "Validate a snapshot, build its table and check parent sums, group layout, markup placement and totals.",
        after_help = "EXAMPLES:\n    # Check a snapshot\n    ldg check scope.json\n\n    # Check the table after an event log\n    ldg check scope.json --events events.json"
    )]
    Check(cmd::check::CheckArgs),

    #[command(
        about = "Generate order keys",
        after_help = "EXAMPLES:\n    # A key between two rows\n    ldg key between --after a --before b\n\n    # Ten evenly spaced keys\n    ldg key spread 10"
    )]
    Key(cmd::key::KeyArgs),

    #[command(
        about = "Drive an event log through the sync tasks",
        long_about = "Apply each user event locally, submit it, and fold the server's answer back in. Runs against an in-process server unless --remote is given.",
        after_help = "EXAMPLES:\n    # Offline run seeded from the snapshot\n    ldg sync scope.json events.json\n\n    # Against the configured API\n    LEDGERLINE_BASE_URL=https://api.example.test ldg sync scope.json events.json --remote"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    ldg completions bash > /etc/bash_completion.d/ldg"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("LEDGERLINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "ledgerline=debug,info"
        } else {
            "ledgerline=info,warn"
        })
    });

    let format = env::var("LEDGERLINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let config = config::resolve_config(&project_root)?;
    debug!(?config, "resolved config");

    match &cli.command {
        Commands::Replay(args) => cmd::replay::run_replay(args, &config, output),
        Commands::Check(args) => cmd::check::run_check(args, &config, output),
        Commands::Key(args) => cmd::key::run_key(args, output),
        Commands::Sync(args) => cmd::sync::run_sync(args, &config, output),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error = cmd::error_code(&err).map_or_else(
                || CliError::new(format!("{err:#}")),
                |code| CliError::coded(code, format!("{err:#}")),
            );
            if let Err(render) = render_error(output, &error) {
                eprintln!("error: {err:#} (while rendering: {render})");
            }
            ExitCode::FAILURE
        }
    }
}
