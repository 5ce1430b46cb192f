//! # Job Runner Entry Points
//!
//! External jobs report back through two subcommands:
//!
//! - `set-state` replaces a state type wholesale (job completion, or FAILED
//!   on error). The type must belong to the owner's lifecycle and be later
//!   than the current stage, unless it is FAILED or INVALID.
//! - `signal` records, or withdraws, a "work for this stage is complete"
//!   report in the observation's signal file. Signals only take effect when
//!   `auto_complete` is off.

use anyhow::{Context, Result};
use clap::Args;

use casda_core::Sbid;
use casda_state::{
    DepositStateType, DepositTransition, Depositable, Observation, ObservationRepository,
    OwnerRef,
};

use crate::config::DepositConfig;
use crate::{load_observation, open_repository};

/// Arguments for `casda-deposit set-state`.
#[derive(Args, Debug)]
pub struct SetStateArgs {
    /// Observation.
    #[arg(long)]
    pub sbid: Sbid,

    /// Artefact filename. The observation itself when omitted.
    #[arg(long)]
    pub file: Option<String>,

    /// New state type (e.g. ENCAPSULATING, FAILED).
    #[arg(long)]
    pub state: DepositStateType,
}

/// Arguments for `casda-deposit signal`.
#[derive(Args, Debug)]
pub struct SignalArgs {
    /// Observation.
    #[arg(long)]
    pub sbid: Sbid,

    /// Artefact filename. The observation itself when omitted.
    #[arg(long)]
    pub file: Option<String>,

    /// Stage whose work is complete (e.g. PROCESSING, ARCHIVING).
    #[arg(long)]
    pub stage: DepositStateType,

    /// Withdraw the report instead of recording it.
    #[arg(long)]
    pub withdraw: bool,
}

fn owner_for(observation: &Observation, file: Option<&str>) -> Result<OwnerRef> {
    match file {
        None => Ok(OwnerRef::Observation(observation.sbid())),
        Some(filename) => observation
            .artefact_by_filename(filename)
            .map(|a| a.owner_ref())
            .with_context(|| format!("artefact not found: {} in {}", filename, observation.sbid())),
    }
}

fn report(target: &str, transitions: &[DepositTransition], requested: DepositStateType) {
    match transitions.split_first() {
        Some((t, rest)) => {
            println!("OK: {target} transitioned {} → {}", t.from, t.to);
            for t in rest {
                println!("  {t}");
            }
        }
        None => println!("OK: {target} already {requested}"),
    }
}

/// Execute the set-state subcommand.
pub fn run_set_state(args: &SetStateArgs, config: &DepositConfig) -> Result<u8> {
    let mut repo = open_repository(config);
    let mut observation = load_observation(&repo, args.sbid)?;

    let (target, transitions) = match &args.file {
        None => {
            let transition = observation
                .transition_to(args.state)
                .with_context(|| format!("cannot set {} to {}", args.sbid, args.state))?;
            (args.sbid.to_string(), transition.into_iter().collect::<Vec<_>>())
        }
        Some(filename) => {
            let id = observation
                .artefact_by_filename(filename)
                .map(|a| a.id())
                .with_context(|| format!("artefact not found: {filename} in {}", args.sbid))?;
            let transitions = observation
                .set_artefact_state(id, args.state)
                .with_context(|| format!("cannot set {filename} to {}", args.state))?;
            (filename.clone(), transitions)
        }
    };

    repo.save(&observation)
        .with_context(|| format!("failed to save {}", args.sbid))?;
    report(&target, &transitions, args.state);
    Ok(0)
}

/// Execute the signal subcommand.
pub fn run_signal(args: &SignalArgs, config: &DepositConfig) -> Result<u8> {
    let repo = open_repository(config);
    let observation = load_observation(&repo, args.sbid)?;
    let owner = owner_for(&observation, args.file.as_deref())?;

    if config.auto_complete {
        tracing::warn!("auto_complete is on; recorded signals are ignored by progress");
    }

    let mut board = repo.load_signals(args.sbid)?;
    let changed = if args.withdraw {
        board.withdraw(&owner, args.stage)
    } else {
        board.signal(owner.clone(), args.stage)
    };
    repo.save_signals(args.sbid, &board)?;

    let verb = if args.withdraw { "withdrew" } else { "signalled" };
    if changed {
        println!("OK: {verb} {} for {owner}", args.stage);
    } else {
        println!("OK: nothing to do, {} for {owner} unchanged", args.stage);
    }
    Ok(0)
}
