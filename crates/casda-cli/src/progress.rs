//! # Progress Subcommand
//!
//! The polling loop. Each tick is one `progress_deposit` call followed,
//! when `simulate_jobs` is on, by the simulated job runner, and a save.
//! The loop stops when the observation is deposited or failed, when a tick
//! moves nothing (stalled on a signal or job), or after `max_ticks`.

use anyhow::{Context, Result};
use clap::Args;

use casda_core::Sbid;
use casda_state::{
    AutoComplete, ArtefactId, DepositStateType, DepositTransition, Depositable, Lifecycle,
    Observation, ObservationRepository, ParentDepositableArtefact, SignalBoard, StageSignals,
};

use crate::config::DepositConfig;
use crate::store::JsonDirectoryRepository;
use crate::{load_observation, open_repository};

/// Arguments for `casda-deposit progress`.
#[derive(Args, Debug)]
pub struct ProgressArgs {
    /// Observation to progress. Every unfinished observation when omitted.
    #[arg(long)]
    pub sbid: Option<Sbid>,

    /// Run a single tick.
    #[arg(long)]
    pub once: bool,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The observation reached DEPOSITED.
    Deposited,
    /// The observation is in a failure-class state.
    Failed,
    /// A tick moved nothing.
    Stalled,
    /// `max_ticks` ticks ran without reaching any of the above.
    TickLimit,
}

/// Summary of one driven observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveReport {
    /// Why the loop stopped.
    pub outcome: DriveOutcome,
    /// Ticks run, including the last one.
    pub ticks: u32,
    /// Transitions applied across all ticks.
    pub transitions: usize,
    /// Observation state type when the loop stopped.
    pub state: DepositStateType,
}

/// Complete the encapsulation-bound jobs: every artefact on the encapsulated
/// lifecycle sitting at PROCESSING moves to ENCAPSULATING.
pub fn run_simulated_jobs(observation: &mut Observation) -> Result<Vec<DepositTransition>> {
    let ready: Vec<ArtefactId> = observation
        .artefacts()
        .iter()
        .filter(|a| {
            a.deposit_state().lifecycle() == Lifecycle::Encapsulated
                && a.deposit_state_type() == DepositStateType::Processing
        })
        .map(|a| a.id())
        .collect();

    let mut transitions = Vec::new();
    for id in ready {
        transitions.extend(
            observation
                .set_artefact_state(id, DepositStateType::Encapsulating)
                .context("simulated encapsulation job")?,
        );
    }
    Ok(transitions)
}

/// Tick `observation` until it settles, saving after every tick that moved something.
pub fn drive<R: ObservationRepository + ?Sized>(
    repository: &mut R,
    observation: &mut Observation,
    signals: &dyn StageSignals,
    simulate_jobs: bool,
    max_ticks: u32,
) -> Result<DriveReport> {
    let sbid = observation.sbid();
    let mut transitions = 0;
    let mut outcome = DriveOutcome::TickLimit;
    let mut ticks = 0;

    while ticks < max_ticks {
        ticks += 1;
        let mut moved = observation.progress_deposit(signals);
        if simulate_jobs && !observation.is_failed_deposit() {
            moved.extend(run_simulated_jobs(observation)?);
        }
        tracing::debug!(sbid = %sbid, tick = ticks, moved = moved.len(), "tick");

        if !moved.is_empty() {
            transitions += moved.len();
            repository
                .save(observation)
                .with_context(|| format!("failed to save {sbid}"))?;
        }

        if observation.is_deposited() {
            outcome = DriveOutcome::Deposited;
            break;
        }
        if observation.is_failed_deposit() {
            outcome = DriveOutcome::Failed;
            break;
        }
        if moved.is_empty() {
            outcome = DriveOutcome::Stalled;
            break;
        }
    }

    Ok(DriveReport {
        outcome,
        ticks,
        transitions,
        state: observation.deposit_state_type(),
    })
}

fn drive_one(
    repo: &mut JsonDirectoryRepository,
    sbid: Sbid,
    config: &DepositConfig,
    max_ticks: u32,
) -> Result<DriveReport> {
    let mut observation = load_observation(&*repo, sbid)?;
    let board: SignalBoard;
    let signals: &dyn StageSignals = if config.auto_complete {
        &AutoComplete
    } else {
        board = repo.load_signals(sbid)?;
        &board
    };
    drive(
        repo,
        &mut observation,
        signals,
        config.simulate_jobs,
        max_ticks,
    )
}

/// Execute the progress subcommand. Exit code 2 if any observation failed.
pub fn run_progress(args: &ProgressArgs, config: &DepositConfig) -> Result<u8> {
    let mut repo = open_repository(config);
    let max_ticks = if args.once { 1 } else { config.max_ticks };

    let sbids = match args.sbid {
        Some(sbid) => vec![sbid],
        None => {
            let mut pending = Vec::new();
            for obs in repo.load_all()? {
                if obs.is_deposited() || obs.is_failed_deposit() {
                    tracing::debug!(
                        sbid = %obs.sbid(),
                        state = %obs.deposit_state_type(),
                        "skipping settled observation"
                    );
                    continue;
                }
                pending.push(obs.sbid());
            }
            pending
        }
    };

    if sbids.is_empty() {
        println!("No observations to progress.");
        return Ok(0);
    }

    let mut failed = false;
    for sbid in sbids {
        let report = drive_one(&mut repo, sbid, config, max_ticks)?;
        let verdict = match report.outcome {
            DriveOutcome::Deposited => "deposited",
            DriveOutcome::Failed => {
                failed = true;
                "FAILED"
            }
            DriveOutcome::Stalled => "waiting",
            DriveOutcome::TickLimit => "tick limit reached",
        };
        println!(
            "{sbid}: {} after {} tick(s), {} transition(s) ({verdict})",
            report.state, report.ticks, report.transitions
        );
    }

    Ok(if failed { 2 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use casda_state::{DepositStateFactory, DepositableKind, InMemoryObservationRepository};

    fn observation() -> Observation {
        let f = DepositStateFactory::standard();
        let mut obs = Observation::new(Sbid(77), &f).unwrap();
        obs.add_artefact(&f, DepositableKind::ObservationMetadataFile, "observation.xml")
            .unwrap();
        let encaps = obs
            .add_artefact(&f, DepositableKind::EncapsulationFile, "encaps.tar")
            .unwrap();
        obs.add_encapsulated_artefact(&f, DepositableKind::Spectrum, "spectrum.fits", encaps)
            .unwrap();
        obs.add_artefact(&f, DepositableKind::ImageCube, "image.fits")
            .unwrap();
        obs
    }

    #[test]
    fn auto_complete_with_jobs_deposits() {
        let mut repo = InMemoryObservationRepository::new();
        let mut obs = observation();
        let report = drive(&mut repo, &mut obs, &AutoComplete, true, 64).unwrap();

        assert_eq!(report.outcome, DriveOutcome::Deposited);
        assert_eq!(report.state, DepositStateType::Deposited);
        assert!(report.ticks < 64);
        assert!(obs.all_children_deposited());
        assert_eq!(repo.load(Sbid(77)).unwrap(), Some(obs));
    }

    #[test]
    fn without_jobs_encapsulation_stalls() {
        let mut repo = InMemoryObservationRepository::new();
        let mut obs = observation();
        let report = drive(&mut repo, &mut obs, &AutoComplete, false, 64).unwrap();

        assert_eq!(report.outcome, DriveOutcome::Stalled);
        assert_eq!(report.state, DepositStateType::Depositing);
        let spectrum = obs.artefact_by_filename("spectrum.fits").unwrap();
        assert_eq!(spectrum.deposit_state_type(), DepositStateType::Processing);
        let encaps = obs.artefact_by_filename("encaps.tar").unwrap();
        assert_eq!(encaps.deposit_state_type(), DepositStateType::Processing);
    }

    #[test]
    fn empty_signal_board_waits_on_first_signal() {
        let mut repo = InMemoryObservationRepository::new();
        let mut obs = observation();
        let board = SignalBoard::default();
        let report = drive(&mut repo, &mut obs, &board, true, 64).unwrap();

        assert_eq!(report.outcome, DriveOutcome::Stalled);
        assert_eq!(report.ticks, 3);
        assert_eq!(report.state, DepositStateType::PriorityDepositing);
        let meta = obs.artefact_by_filename("observation.xml").unwrap();
        assert_eq!(meta.deposit_state_type(), DepositStateType::Processing);
    }

    #[test]
    fn tick_limit() {
        let mut repo = InMemoryObservationRepository::new();
        let mut obs = observation();
        let report = drive(&mut repo, &mut obs, &AutoComplete, true, 1).unwrap();
        assert_eq!(report.outcome, DriveOutcome::TickLimit);
        assert_eq!(report.ticks, 1);
        assert_eq!(report.state, DepositStateType::PriorityDepositing);
    }

    #[test]
    fn failed_child_stops_the_loop() {
        let mut repo = InMemoryObservationRepository::new();
        let mut obs = observation();
        drive(&mut repo, &mut obs, &AutoComplete, true, 6).unwrap();
        assert_eq!(obs.deposit_state_type(), DepositStateType::Depositing);

        let cube = obs.artefact_by_filename("image.fits").unwrap().id();
        obs.set_artefact_state(cube, DepositStateType::Failed).unwrap();
        let report = drive(&mut repo, &mut obs, &AutoComplete, true, 64).unwrap();
        assert_eq!(report.outcome, DriveOutcome::Failed);
        assert_eq!(report.ticks, 1);
    }

    #[test]
    fn simulated_jobs_only_touch_encapsulated_processing() {
        let mut obs = observation();
        assert!(run_simulated_jobs(&mut obs).unwrap().is_empty());

        let spectrum = obs.artefact_by_filename("spectrum.fits").unwrap().id();
        let cube = obs.artefact_by_filename("image.fits").unwrap().id();
        obs.set_artefact_state(spectrum, DepositStateType::Processing)
            .unwrap();
        obs.set_artefact_state(cube, DepositStateType::Processing)
            .unwrap();

        let moved = run_simulated_jobs(&mut obs).unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].to, DepositStateType::Encapsulating);
        assert_eq!(
            obs.artefact(cube).unwrap().deposit_state_type(),
            DepositStateType::Processing
        );
    }

    #[test]
    fn run_progress_over_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = DepositConfig {
            state_dir: dir.path().to_path_buf(),
            ..DepositConfig::default()
        };
        let mut repo = open_repository(&config);
        repo.save(&observation()).unwrap();

        let args = ProgressArgs {
            sbid: None,
            once: false,
        };
        assert_eq!(run_progress(&args, &config).unwrap(), 0);
        let stored = repo.load(Sbid(77)).unwrap().unwrap();
        assert!(stored.is_deposited());
        assert!(stored.deposit_completed().is_some());

        // settled observations are skipped
        assert_eq!(run_progress(&args, &config).unwrap(), 0);
    }

    #[test]
    fn run_progress_reads_signal_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DepositConfig {
            state_dir: dir.path().to_path_buf(),
            auto_complete: false,
            ..DepositConfig::default()
        };
        let mut repo = open_repository(&config);
        let obs = observation();
        repo.save(&obs).unwrap();

        let mut board = SignalBoard::default();
        let meta = obs.artefact_by_filename("observation.xml").unwrap();
        board.signal(meta.owner_ref(), DepositStateType::Processing);
        repo.save_signals(Sbid(77), &board).unwrap();

        let args = ProgressArgs {
            sbid: Some(Sbid(77)),
            once: false,
        };
        assert_eq!(run_progress(&args, &config).unwrap(), 0);
        let stored = repo.load(Sbid(77)).unwrap().unwrap();
        let meta = stored.artefact_by_filename("observation.xml").unwrap();
        assert_eq!(meta.deposit_state_type(), DepositStateType::Depositing);
    }
}
