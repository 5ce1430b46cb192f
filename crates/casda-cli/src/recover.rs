//! # Recover Subcommand
//!
//! Rolls a failed artefact, or a failed observation and every failed
//! child, back to its checkpoint. Failure counts are kept.

use anyhow::Result;
use clap::Args;

use casda_core::Sbid;
use casda_state::RecoveryService;

use crate::config::DepositConfig;
use crate::open_repository;

/// Arguments for `casda-deposit recover`.
#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Observation.
    #[arg(long)]
    pub sbid: Sbid,

    /// Filename of the failed artefact. The whole observation when omitted.
    #[arg(long)]
    pub file: Option<String>,
}

/// Execute the recover subcommand.
pub fn run_recover(args: &RecoverArgs, config: &DepositConfig) -> Result<u8> {
    let mut repo = open_repository(config);
    let mut service = RecoveryService::new(&mut repo);

    let transitions = match &args.file {
        Some(file) => service.recover_artefact(args.sbid, file)?,
        None => service.recover_observation(args.sbid)?,
    };

    for t in &transitions {
        println!("  {t}");
    }
    println!(
        "OK: recovered {}{} ({} transition(s))",
        args.sbid,
        args.file
            .as_deref()
            .map(|f| format!("/{f}"))
            .unwrap_or_default(),
        transitions.len()
    );
    Ok(0)
}
