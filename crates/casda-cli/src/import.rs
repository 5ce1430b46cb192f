//! # Import Subcommand
//!
//! Builds a fresh UNDEPOSITED observation from a YAML manifest and writes
//! it to the state directory.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use casda_state::{DepositStateFactory, ObservationRepository, SignalBoard};

use crate::config::DepositConfig;
use crate::manifest::ObservationManifest;
use crate::open_repository;

/// Arguments for `casda-deposit import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the observation manifest (YAML).
    pub manifest: PathBuf,

    /// Replace an already imported observation, discarding its progress and signals.
    #[arg(long)]
    pub force: bool,
}

/// Execute the import subcommand.
pub fn run_import(args: &ImportArgs, config: &DepositConfig) -> Result<u8> {
    let manifest = ObservationManifest::load(&args.manifest)?;
    let observation = manifest.build(&DepositStateFactory::standard())?;
    let sbid = observation.sbid();

    let mut repo = open_repository(config);
    if repo.contains(sbid) {
        if !args.force {
            bail!("observation already imported: {sbid} (use --force to replace it)");
        }
        tracing::warn!(sbid = %sbid, "replacing existing observation");
        repo.save_signals(sbid, &SignalBoard::default())
            .context("failed to reset signals")?;
    }

    repo.save(&observation)
        .with_context(|| format!("failed to save {sbid}"))?;

    println!(
        "OK: imported {sbid} with {} artefacts",
        observation.artefacts().len()
    );
    Ok(0)
}
