pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use hrbridge_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "hrbridge",
    about = "Hrbridge operator CLI",
    long_about = "Operate Hrbridge upstream readiness, balance inspection, and config inspection.",
    after_help = "Examples:\n  hrbridge doctor --json\n  hrbridge balance 42 --year 2025\n  hrbridge config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config and upstream authentication readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Fetch remaining leave balances for one employee via the service account")]
    Balance {
        #[arg(help = "Upstream employee record id")]
        employee_id: i64,
        #[arg(long, help = "Reference year for the lookback windows (defaults to the current year)")]
        year: Option<i32>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Balance { employee_id, year } => commands::balance::run(employee_id, year),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Best-effort subscriber setup; command output still goes to stdout even
/// when config is broken, so a failure here only loses log lines.
fn init_tracing() {
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    let _ = result;
}
