//! # Status and List Subcommands
//!
//! Read-only reporting over the state directory, as text or pretty JSON.

use std::fmt;

use anyhow::{bail, Context, Result};
use clap::Args;

use casda_core::{Sbid, Timestamp};
use casda_state::{
    ChildDepositableArtefact, DepositStateType, Depositable, ObservationRepository,
    ObservationStatus,
};

use crate::config::DepositConfig;
use crate::{load_observation, open_repository};

/// Arguments for `casda-deposit status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Observation to report.
    #[arg(long)]
    pub sbid: Sbid,

    /// Print the status projection as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `casda-deposit list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only observations in one of these states (comma separated).
    #[arg(long = "state", value_delimiter = ',')]
    pub states: Vec<DepositStateType>,

    /// List artefacts in one of these states instead of observations.
    #[arg(long = "artefact-state", value_delimiter = ',', conflicts_with = "states")]
    pub artefact_states: Vec<DepositStateType>,

    /// Only observations that completed deposit at or after this instant (RFC 3339, UTC).
    #[arg(long, requires = "completed_to")]
    pub completed_from: Option<String>,

    /// Only observations that completed deposit at or before this instant (RFC 3339, UTC).
    #[arg(long, requires = "completed_from")]
    pub completed_to: Option<String>,
}

/// Text rendering of an [`ObservationStatus`].
pub struct StatusView<'a>(pub &'a ObservationStatus);

impl fmt::Display for StatusView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        writeln!(f, "Observation: {}", s.sbid)?;
        writeln!(f, "  State: {}", s.state)?;
        writeln!(f, "  Failures: {}", s.failure_count)?;
        if let Some(checkpoint) = s.checkpoint {
            writeln!(f, "  Checkpoint: {checkpoint}")?;
        }
        if let Some(started) = s.deposit_started {
            writeln!(f, "  Started: {started}")?;
        }
        if let Some(completed) = s.deposit_completed {
            writeln!(f, "  Completed: {completed}")?;
        }
        writeln!(f, "  Artefacts: {}", s.artefacts.len())?;
        for a in &s.artefacts {
            write!(f, "    {} [{}] {}", a.filename, a.kind, a.state)?;
            if let Some(encaps) = &a.encapsulation {
                write!(f, " in {encaps}")?;
            }
            if a.failure_count > 0 {
                write!(f, " (failures: {})", a.failure_count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Execute the status subcommand.
pub fn run_status(args: &StatusArgs, config: &DepositConfig) -> Result<u8> {
    let repo = open_repository(config);
    let observation = load_observation(&repo, args.sbid)?;
    let status = ObservationStatus::from(&observation);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", StatusView(&status));
    }
    Ok(0)
}

fn parse_instant(value: &str, flag: &str) -> Result<Timestamp> {
    Timestamp::parse(value).with_context(|| format!("invalid --{flag}"))
}

/// Execute the list subcommand.
pub fn run_list(args: &ListArgs, config: &DepositConfig) -> Result<u8> {
    let repo = open_repository(config);
    if !repo.dir().is_dir() {
        println!("No observations found (state directory does not exist).");
        return Ok(0);
    }

    if !args.artefact_states.is_empty() {
        let found = repo.find_artefacts_by_state_types(&args.artefact_states)?;
        for (sbid, artefact) in &found {
            println!(
                "{sbid}  {}  [{}]  {}",
                artefact.filename(),
                artefact.kind(),
                artefact.deposit_state_type()
            );
        }
        println!("{} artefact(s)", found.len());
        return Ok(0);
    }

    let observations = match (&args.completed_from, &args.completed_to) {
        (Some(from), Some(to)) => {
            let from = parse_instant(from, "completed-from")?;
            let to = parse_instant(to, "completed-to")?;
            if to < from {
                bail!("--completed-to is before --completed-from");
            }
            let mut found = repo.find_completed_between(from, to)?;
            if !args.states.is_empty() {
                found.retain(|o| args.states.contains(&o.deposit_state_type()));
            }
            found
        }
        _ if !args.states.is_empty() => repo.find_by_state_types(&args.states)?,
        _ => repo.load_all()?,
    };

    for obs in &observations {
        let failed = obs.artefacts().iter().filter(|a| a.is_failed_deposit()).count();
        let deposited = obs.artefacts().iter().filter(|a| a.is_deposited()).count();
        println!(
            "{}  {}  {deposited}/{} deposited, {failed} failed",
            obs.sbid(),
            obs.deposit_state_type(),
            obs.artefacts().len()
        );
    }
    println!("{} observation(s)", observations.len());
    Ok(0)
}
