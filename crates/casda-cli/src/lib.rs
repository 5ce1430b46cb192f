//! # casda-cli: Deposit Polling Driver
//!
//! Provides the `casda-deposit` command-line interface: the external
//! scheduler that loads an observation from a JSON state directory, calls
//! `progress_deposit` once per tick, and saves it again.
//!
//! ## Subcommands
//!
//! - `casda-deposit import`: Create an observation from a YAML manifest.
//! - `casda-deposit progress`: Run polling ticks until deposited, failed or stalled.
//! - `casda-deposit status` / `list`: Report deposit state.
//! - `casda-deposit set-state` / `signal`: Job runner entry points.
//! - `casda-deposit recover`: Roll a failed artefact or observation back.
//!
//! ```bash
//! casda-deposit import manifests/12345.yaml
//! casda-deposit -v progress --sbid 12345
//! casda-deposit status --sbid 12345 --json
//! ```

pub mod config;
pub mod import;
pub mod jobs;
pub mod manifest;
pub mod progress;
pub mod recover;
pub mod status;
pub mod store;

use anyhow::{Context, Result};

use casda_core::Sbid;
use casda_state::{Observation, ObservationRepository};

use crate::config::DepositConfig;
use crate::store::JsonDirectoryRepository;

/// Repository over the configured state directory.
pub fn open_repository(config: &DepositConfig) -> JsonDirectoryRepository {
    JsonDirectoryRepository::new(&config.state_dir)
}

/// Load an observation, failing if it was never imported.
pub fn load_observation<R: ObservationRepository + ?Sized>(
    repository: &R,
    sbid: Sbid,
) -> Result<Observation> {
    repository
        .load(sbid)
        .with_context(|| format!("failed to load {sbid}"))?
        .with_context(|| format!("observation not found: {sbid}"))
}
