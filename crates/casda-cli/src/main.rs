//! # casda-deposit entry point
//!
//! Parses command-line arguments, resolves the driver configuration,
//! installs the tracing subscriber, and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use casda_cli::config::{DepositConfig, LogFormat};
use casda_cli::import::{run_import, ImportArgs};
use casda_cli::jobs::{run_set_state, run_signal, SetStateArgs, SignalArgs};
use casda_cli::progress::{run_progress, ProgressArgs};
use casda_cli::recover::{run_recover, RecoverArgs};
use casda_cli::status::{run_list, run_status, ListArgs, StatusArgs};

/// CASDA observation deposit driver.
///
/// Imports observations from manifests, polls their deposit state machine
/// forward, records job results and readiness signals, and recovers failed
/// deposits. State lives in a directory of JSON files.
#[derive(Parser, Debug)]
#[command(name = "casda-deposit", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Observation state directory (overrides config and CASDA_STATE_DIR).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Upper bound of polling ticks per observation (overrides config and CASDA_MAX_TICKS).
    #[arg(long, global = true)]
    max_ticks: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import an observation from a YAML manifest.
    Import(ImportArgs),

    /// Poll observations forward until deposited, failed or waiting.
    Progress(ProgressArgs),

    /// Show the deposit status of one observation.
    Status(StatusArgs),

    /// List observations, or artefacts, by state.
    List(ListArgs),

    /// Set a state type directly, as a job runner does.
    SetState(SetStateArgs),

    /// Record or withdraw a stage-complete signal.
    Signal(SignalArgs),

    /// Recover a failed artefact or observation.
    Recover(RecoverArgs),
}

fn env_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let filter = env_filter(verbose);
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = DepositConfig::resolve(
        cli.config.as_deref(),
        cli.state_dir.as_deref(),
        cli.max_ticks,
    );
    let log_format = config.as_ref().map(|c| c.log_format).unwrap_or_default();
    init_tracing(cli.verbose, log_format);

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    tracing::debug!(
        state_dir = %config.state_dir.display(),
        max_ticks = config.max_ticks,
        auto_complete = config.auto_complete,
        simulate_jobs = config.simulate_jobs,
        "resolved configuration"
    );

    let result = match cli.command {
        Commands::Import(args) => run_import(&args, &config),
        Commands::Progress(args) => run_progress(&args, &config),
        Commands::Status(args) => run_status(&args, &config),
        Commands::List(args) => run_list(&args, &config),
        Commands::SetState(args) => run_set_state(&args, &config),
        Commands::Signal(args) => run_signal(&args, &config),
        Commands::Recover(args) => run_recover(&args, &config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casda_core::Sbid;
    use casda_state::DepositStateType;

    #[test]
    fn cli_parse_import() {
        let cli = Cli::try_parse_from(["casda-deposit", "import", "obs.yaml", "--force"]).unwrap();
        if let Commands::Import(args) = cli.command {
            assert_eq!(args.manifest, PathBuf::from("obs.yaml"));
            assert!(args.force);
        } else {
            panic!("expected import");
        }
    }

    #[test]
    fn cli_parse_progress() {
        let cli = Cli::try_parse_from(["casda-deposit", "progress", "--sbid", "12345", "--once"])
            .unwrap();
        if let Commands::Progress(args) = cli.command {
            assert_eq!(args.sbid, Some(Sbid(12345)));
            assert!(args.once);
        } else {
            panic!("expected progress");
        }

        let cli = Cli::try_parse_from(["casda-deposit", "progress"]).unwrap();
        assert!(matches!(cli.command, Commands::Progress(ProgressArgs { sbid: None, .. })));
    }

    #[test]
    fn cli_parse_rejects_zero_sbid() {
        assert!(Cli::try_parse_from(["casda-deposit", "status", "--sbid", "0"]).is_err());
        assert!(Cli::try_parse_from(["casda-deposit", "status", "--sbid", "abc"]).is_err());
    }

    #[test]
    fn cli_parse_status_json() {
        let cli =
            Cli::try_parse_from(["casda-deposit", "status", "--sbid", "7", "--json"]).unwrap();
        if let Commands::Status(args) = cli.command {
            assert_eq!(args.sbid, Sbid(7));
            assert!(args.json);
        } else {
            panic!("expected status");
        }
    }

    #[test]
    fn cli_parse_list_states() {
        let cli = Cli::try_parse_from([
            "casda-deposit",
            "list",
            "--state",
            "FAILED,DEPOSITING",
        ])
        .unwrap();
        if let Commands::List(args) = cli.command {
            assert_eq!(
                args.states,
                vec![DepositStateType::Failed, DepositStateType::Depositing]
            );
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn cli_parse_list_conflicts_and_requires() {
        assert!(Cli::try_parse_from([
            "casda-deposit",
            "list",
            "--state",
            "FAILED",
            "--artefact-state",
            "FAILED",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "casda-deposit",
            "list",
            "--completed-from",
            "2024-01-01T00:00:00Z",
        ])
        .is_err());
    }

    #[test]
    fn cli_parse_set_state() {
        let cli = Cli::try_parse_from([
            "casda-deposit",
            "set-state",
            "--sbid",
            "5",
            "--file",
            "spectrum.fits",
            "--state",
            "ENCAPSULATING",
        ])
        .unwrap();
        if let Commands::SetState(args) = cli.command {
            assert_eq!(args.file.as_deref(), Some("spectrum.fits"));
            assert_eq!(args.state, DepositStateType::Encapsulating);
        } else {
            panic!("expected set-state");
        }
    }

    #[test]
    fn cli_parse_unknown_state_name_errors() {
        assert!(Cli::try_parse_from([
            "casda-deposit",
            "set-state",
            "--sbid",
            "5",
            "--state",
            "HALFWAY",
        ])
        .is_err());
    }

    #[test]
    fn cli_parse_signal_withdraw() {
        let cli = Cli::try_parse_from([
            "casda-deposit",
            "signal",
            "--sbid",
            "5",
            "--stage",
            "ARCHIVING",
            "--withdraw",
        ])
        .unwrap();
        if let Commands::Signal(args) = cli.command {
            assert!(args.file.is_none());
            assert_eq!(args.stage, DepositStateType::Archiving);
            assert!(args.withdraw);
        } else {
            panic!("expected signal");
        }
    }

    #[test]
    fn cli_parse_recover() {
        let cli = Cli::try_parse_from(["casda-deposit", "recover", "--sbid", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Recover(_)));
    }

    #[test]
    fn cli_parse_global_options() {
        let cli = Cli::try_parse_from([
            "casda-deposit",
            "-vv",
            "--config",
            "casda.yaml",
            "list",
            "--state-dir",
            "/tmp/state",
            "--max-ticks",
            "8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("casda.yaml")));
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(cli.max_ticks, Some(8));
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["casda-deposit"]).is_err());
    }
}
