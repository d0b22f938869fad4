// ledgersync - merge a month of bank exports into the master ledger workbook

mod exit_codes;
mod reconcile;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ledgersync_recon::TargetMonth;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(about = "Merge monthly bank statement exports into the master ledger workbook")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(after_help = "\
Examples:
  ledgersync --target-date 2025-07
  ledgersync --target-date 2025-07-31 --output-folder ~/Desktop/recon
  ledgersync --target-date 2025-07 --dry-run --json
  ledgersync validate ledgersync.toml")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Month to reconcile (YYYY-MM; a full YYYY-MM-DD date picks its month)
    #[arg(long, value_name = "YYYY-MM")]
    target_date: Option<TargetMonth>,

    /// Write the output workbook here instead of the configured output_dir
    #[arg(long, value_name = "DIR")]
    output_folder: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, env = "LEDGERSYNC_CONFIG", default_value = "ledgersync.toml")]
    config: PathBuf,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Reconcile and report without writing the output workbook
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging (per-row detail)
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a config file without running
    #[command(after_help = "\
Examples:
  ledgersync validate ledgersync.toml")]
    Validate {
        /// Path to the config file
        config: PathBuf,
    },
}

fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).format_target(false).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let result = match cli.command {
        Some(Commands::Validate { config }) => reconcile::cmd_validate(&config),
        None => match cli.target_date {
            Some(month) => reconcile::cmd_run(reconcile::RunArgs {
                config: cli.config,
                month,
                output_folder: cli.output_folder,
                json: cli.json,
                dry_run: cli.dry_run,
            }),
            None => Err(CliError {
                code: EXIT_USAGE,
                message: "--target-date is required".into(),
                hint: Some("e.g. ledgersync --target-date 2025-07".into()),
            }),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
