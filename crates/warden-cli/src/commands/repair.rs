//! One-shot repair of a named script through the isolated pipeline.

use std::path::PathBuf;

use clap::Args;
use tracing::error;
use warden_core::script::repair::repair;
use warden_core::WardenConfig;

use super::render_chain;

/// Arguments of `warden repair`.
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// The script to repair
    pub source: PathBuf,

    /// Where to promote the repaired copy; defaults to repairing in place
    #[arg(long)]
    pub destination: Option<PathBuf>,
}

/// Runs the repair pipeline and returns its result code.
pub fn execute(config: &WardenConfig, args: &RepairArgs) -> u16 {
    let destination = args.destination.clone().unwrap_or_else(|| args.source.clone());

    match repair(&args.source, &destination, &config.scripts.policy) {
        Ok(()) => {
            println!(
                "{} repaired and promoted to {}",
                args.source.display(),
                destination.display()
            );
            0
        },
        Err(e) => {
            let code = e.code();
            error!("{}", render_chain(&e));
            code
        },
    }
}
