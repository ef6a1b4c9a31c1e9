//! warden - service bootstrap orchestrator.
//!
//! Sequences one run: integrity pass over the operator scripts, self-repair
//! pass over warden's own entry script, then the configuration lifecycle.
//!
//! The terminal result code (see `warden_core::codes`) is the process exit
//! code, and on failure it is also printed as the last stderr line in the
//! stable form `warden: result code NNN` for operator scripting on
//! platforms that truncate exit statuses.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use warden_core::WardenConfig;

mod commands;

/// warden - service bootstrap orchestrator
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the warden configuration file
    #[arg(short, long, default_value = "warden.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline: script integrity, self-repair, lifecycle
    Run(commands::run::RunArgs),

    /// Validate the configured scripts without mutating anything
    Check(commands::check::CheckArgs),

    /// Repair one script through the isolated pipeline
    Repair(commands::repair::RepairArgs),
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<WardenConfig> {
    let config = WardenConfig::from_file(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warden: {e:#}");
            return ExitCode::from(2);
        },
    };

    let code = match cli.command {
        Commands::Run(args) => commands::run::execute(&config, &args),
        Commands::Check(args) => commands::check::execute(&config, &args),
        Commands::Repair(args) => commands::repair::execute(&config, &args),
    };

    if code == 0 {
        ExitCode::SUCCESS
    } else {
        eprintln!("warden: result code {code}");
        ExitCode::from(u8::try_from(code % 256).unwrap_or(1))
    }
}
