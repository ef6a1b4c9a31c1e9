//! Validator-only pass: exhaustive reports, no mutation.

use std::path::PathBuf;

use clap::Args;
use warden_core::script::validator::validate;
use warden_core::WardenConfig;

/// Arguments of `warden check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Check one specific script instead of every configured one
    #[arg(long)]
    pub script: Option<PathBuf>,
}

/// Validates the targets and returns the first failure's result code.
pub fn execute(config: &WardenConfig, args: &CheckArgs) -> u16 {
    let policy = &config.scripts.policy;

    let targets: Vec<PathBuf> = match &args.script {
        Some(script) => vec![script.clone()],
        None => config
            .scripts
            .operator
            .iter()
            .chain(config.scripts.orchestrator.as_ref())
            .map(|pair| pair.primary.clone())
            .collect(),
    };

    let mut first_failure = 0;
    for target in &targets {
        match validate(target, policy) {
            Ok(()) => println!("{}: healthy", target.display()),
            Err(report) => {
                println!("{}: unhealthy", target.display());
                for finding in &report.findings {
                    println!("  {finding}");
                }
                if first_failure == 0 {
                    first_failure = report.code();
                }
            },
        }
    }
    first_failure
}
