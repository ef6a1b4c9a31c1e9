//! The full pipeline: integrity, self-repair, lifecycle.

use std::path::PathBuf;

use clap::Args;
use tracing::{error, info, warn};
use warden_core::context::RunContext;
use warden_core::lifecycle::LifecycleController;
use warden_core::metadata::cli::MetadataCliProcess;
use warden_core::report::RunReport;
use warden_core::script::integrity::{IntegrityManager, IntegrityOutcome, SelfRepair, SelfRepairOutcome};
use warden_core::service::CommandProbe;
use warden_core::{RunOutcome, WardenConfig};

use super::render_chain;

/// Arguments of `warden run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Write a machine-readable JSON run summary to this path
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

/// Executes the full pipeline and returns the terminal result code.
pub fn execute(config: &WardenConfig, args: &RunArgs) -> u16 {
    let ctx = RunContext::new();
    info!(run_id = %ctx.run_id, "warden run starting");

    let mut notes = Vec::new();
    let code = pipeline(config, &ctx, &mut notes);

    let outcome = if code == 0 {
        notes
            .iter()
            .rev()
            .find_map(|n| n.strip_prefix("outcome: ").map(str::to_string))
            .unwrap_or_else(|| "ok".to_string())
    } else {
        "failed".to_string()
    };

    if let Some(path) = &args.report_json {
        let report = RunReport::finish(&ctx, outcome, code, notes);
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "could not write run report");
                }
            },
            Err(e) => warn!(error = %e, "could not serialize run report"),
        }
    }

    code
}

fn pipeline(config: &WardenConfig, ctx: &RunContext, notes: &mut Vec<String>) -> u16 {
    let policy = &config.scripts.policy;

    // Operator scripts first; any fatal integrity failure ends the run.
    let manager = IntegrityManager::new(policy);
    for pair_config in &config.scripts.operator {
        let pair = pair_config.pair();
        match manager.ensure(&pair) {
            Ok(IntegrityOutcome::PrimaryHealthy) => {},
            Ok(IntegrityOutcome::RestoredFromBackup { plan }) => {
                println!("{plan}");
                notes.push(format!("restored {} from backup", pair.primary.display()));
            },
            Ok(IntegrityOutcome::RepairedBothSlots) => {
                notes.push(format!("repaired both slots of {}", pair.primary.display()));
            },
            Err(e) => {
                let code = e.code();
                error!(script = %pair.primary.display(), "{}", render_chain(&e));
                return code;
            },
        }
    }

    // Self-repair never stops the run; failures are recorded and deferred.
    if let (Some(own), Some(marker)) = (
        config.scripts.orchestrator.as_ref(),
        config.scripts.marker_path(),
    ) {
        let pair = own.pair();
        match SelfRepair::new(policy, &marker).ensure(&pair) {
            Ok(SelfRepairOutcome::Healthy) => {},
            Ok(SelfRepairOutcome::BackupReady { plan })
            | Ok(SelfRepairOutcome::RepairedIntoBackup { plan }) => {
                println!("{plan}");
                notes.push(format!(
                    "self-repair deferred: corrected copy in {}",
                    pair.backup.display()
                ));
            },
            Err(e) => {
                warn!("{}", render_chain(&e));
                notes.push(format!("self-repair failed with code {}", e.code()));
            },
        }
    }

    // Scripts are sound (or deferred); run the configuration lifecycle.
    let cli = MetadataCliProcess::new(config.metadata.cli_bin.clone());
    let probe = CommandProbe::new(config.service.probe_command.clone());
    let paths = config.lifecycle_paths();
    let options = config.lifecycle_options();
    let controller = LifecycleController::new(&cli, &probe, &paths, &options);

    match controller.run(ctx) {
        Ok(outcome) => {
            if let RunOutcome::Bootstrapped { guidance } = &outcome {
                println!("{guidance}");
            }
            println!("warden: {outcome}");
            notes.push(format!("outcome: {}", outcome.name()));
            0
        },
        Err(e) => {
            let code = e.code();
            error!("{}", render_chain(&e));
            code
        },
    }
}
