//! # JSON State Directory
//!
//! File-backed [`ObservationRepository`]. Each observation lives in
//! `<state_dir>/<sbid>.json`; its readiness signals, when signals are not
//! auto-completed, in `<state_dir>/<sbid>.signals.json`.
//!
//! Writes go to a sibling `.tmp` file that is then renamed over the target,
//! so a crashed driver never leaves a truncated state file behind.

use std::path::{Path, PathBuf};

use casda_core::Sbid;
use casda_state::{Observation, ObservationRepository, RepositoryError, SignalBoard};

const STATE_SUFFIX: &str = ".json";
const SIGNALS_SUFFIX: &str = ".signals.json";

/// Observation repository over a directory of JSON files.
#[derive(Debug, Clone)]
pub struct JsonDirectoryRepository {
    dir: PathBuf,
}

fn storage(path: &Path, e: std::io::Error) -> RepositoryError {
    RepositoryError::Storage(format!("{}: {e}", path.display()))
}

fn serialization(path: &Path, e: serde_json::Error) -> RepositoryError {
    RepositoryError::Serialization(format!("{}: {e}", path.display()))
}

impl JsonDirectoryRepository {
    /// Repository rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for `sbid`.
    pub fn observation_file(&self, sbid: Sbid) -> PathBuf {
        self.dir.join(format!("{}{STATE_SUFFIX}", sbid.value()))
    }

    /// Path of the signal file for `sbid`.
    pub fn signals_file(&self, sbid: Sbid) -> PathBuf {
        self.dir.join(format!("{}{SIGNALS_SUFFIX}", sbid.value()))
    }

    /// Whether a state file exists for `sbid`.
    pub fn contains(&self, sbid: Sbid) -> bool {
        self.observation_file(sbid).is_file()
    }

    /// Stored signals for `sbid`. A missing file is an empty board.
    pub fn load_signals(&self, sbid: Sbid) -> Result<SignalBoard, RepositoryError> {
        let path = self.signals_file(sbid);
        if !path.exists() {
            return Ok(SignalBoard::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| storage(&path, e))?;
        serde_json::from_str(&content).map_err(|e| serialization(&path, e))
    }

    /// Replace the stored signals for `sbid`.
    pub fn save_signals(&self, sbid: Sbid, board: &SignalBoard) -> Result<(), RepositoryError> {
        let path = self.signals_file(sbid);
        let json = serde_json::to_string_pretty(board).map_err(|e| serialization(&path, e))?;
        self.write_atomic(&path, &json)
    }

    fn write_atomic(&self, path: &Path, content: &str) -> Result<(), RepositoryError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| storage(&self.dir, e))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(|e| storage(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| storage(path, e))
    }
}

impl ObservationRepository for JsonDirectoryRepository {
    fn load(&self, sbid: Sbid) -> Result<Option<Observation>, RepositoryError> {
        let path = self.observation_file(sbid);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| storage(&path, e))?;
        let observation: Observation =
            serde_json::from_str(&content).map_err(|e| serialization(&path, e))?;
        if observation.sbid() != sbid {
            return Err(RepositoryError::Serialization(format!(
                "{}: holds {} instead of {sbid}",
                path.display(),
                observation.sbid()
            )));
        }
        Ok(Some(observation))
    }

    fn save(&mut self, observation: &Observation) -> Result<(), RepositoryError> {
        let path = self.observation_file(observation.sbid());
        let json =
            serde_json::to_string_pretty(observation).map_err(|e| serialization(&path, e))?;
        self.write_atomic(&path, &json)?;
        tracing::debug!(sbid = %observation.sbid(), path = %path.display(), "saved observation");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Sbid>, RepositoryError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut sbids = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| storage(&self.dir, e))? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(
                        dir = %self.dir.display(),
                        error = %e,
                        "failed to read directory entry while listing observations"
                    );
                    continue;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(SIGNALS_SUFFIX) {
                continue;
            }
            let Some(stem) = name.strip_suffix(STATE_SUFFIX) else {
                continue;
            };
            match stem.parse::<Sbid>() {
                Ok(sbid) => sbids.push(sbid),
                Err(e) => tracing::warn!(
                    file = %name,
                    error = %e,
                    "skipping state file without a valid sbid"
                ),
            }
        }
        sbids.sort();
        Ok(sbids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casda_state::{
        AutoComplete, DepositStateFactory, DepositStateType, DepositableKind, OwnerRef,
        ParentDepositableArtefact, StageSignals,
    };

    fn observation(sbid: u32) -> Observation {
        let f = DepositStateFactory::standard();
        let mut obs = Observation::new(Sbid(sbid), &f).unwrap();
        obs.add_artefact(&f, DepositableKind::Catalogue, "catalogue.xml")
            .unwrap();
        obs
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonDirectoryRepository::new(dir.path().join("state"));
        let mut obs = observation(42);
        obs.progress_deposit(&AutoComplete);

        repo.save(&obs).unwrap();
        assert!(repo.contains(Sbid(42)));
        assert!(!repo.observation_file(Sbid(42)).with_extension("tmp").exists());
        assert_eq!(repo.load(Sbid(42)).unwrap(), Some(obs));
        assert_eq!(repo.load(Sbid(43)).unwrap(), None);
    }

    #[test]
    fn list_skips_signal_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonDirectoryRepository::new(dir.path());
        repo.save(&observation(30)).unwrap();
        repo.save(&observation(4)).unwrap();
        repo.save_signals(Sbid(4), &SignalBoard::default()).unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();

        assert_eq!(repo.list().unwrap(), vec![Sbid(4), Sbid(30)]);
    }

    #[test]
    fn list_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonDirectoryRepository::new(dir.path().join("absent"));
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonDirectoryRepository::new(dir.path());
        std::fs::write(repo.observation_file(Sbid(7)), "{not json").unwrap();
        assert!(matches!(
            repo.load(Sbid(7)),
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[test]
    fn state_outside_lifecycle_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonDirectoryRepository::new(dir.path());
        repo.save(&observation(11)).unwrap();

        let path = repo.observation_file(Sbid(11));
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let state = &mut json["artefacts"][0]["record"]["state"];
        assert_eq!(state["lifecycle"], "standard");
        state["type"] = "STAGING".into();
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let err = repo.load(Sbid(11)).unwrap_err();
        assert!(matches!(err, RepositoryError::Serialization(_)));
        assert!(err.to_string().contains("STAGING"));
    }

    #[test]
    fn misplaced_observation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonDirectoryRepository::new(dir.path());
        repo.save(&observation(8)).unwrap();
        std::fs::rename(repo.observation_file(Sbid(8)), repo.observation_file(Sbid(9))).unwrap();
        assert!(repo.load(Sbid(9)).is_err());
    }

    #[test]
    fn signals_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonDirectoryRepository::new(dir.path());
        assert!(repo.load_signals(Sbid(5)).unwrap().is_empty());

        let owner = OwnerRef::Observation(Sbid(5));
        let mut board = SignalBoard::default();
        board.signal(owner.clone(), DepositStateType::Archiving);
        repo.save_signals(Sbid(5), &board).unwrap();

        let loaded = repo.load_signals(Sbid(5)).unwrap();
        assert!(loaded.is_complete(&owner, DepositStateType::Archiving));
        assert_eq!(loaded, board);
    }
}
