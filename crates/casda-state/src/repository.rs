//! # Persistence Contract
//!
//! The state machine is purely in-memory. A repository loads an observation
//! before a polling tick and saves it after. The read projections used by
//! reporting surfaces (by state type, by completion date) have default
//! implementations on top of `list` + `load`; backends with an index can
//! override them.

use std::collections::BTreeMap;

use casda_core::{Sbid, Timestamp};
use thiserror::Error;

use crate::artefact::Artefact;
use crate::depositable::Depositable;
use crate::observation::Observation;
use crate::state::DepositStateType;

/// Failure of the persistence collaborator.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Backing store unreachable or I/O failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Load/save observations and query read projections.
pub trait ObservationRepository {
    /// Load an observation, `None` if absent.
    fn load(&self, sbid: Sbid) -> Result<Option<Observation>, RepositoryError>;

    /// Insert or replace an observation.
    fn save(&mut self, observation: &Observation) -> Result<(), RepositoryError>;

    /// Every stored sbid, ascending.
    fn list(&self) -> Result<Vec<Sbid>, RepositoryError>;

    /// Every stored observation, ascending by sbid.
    fn load_all(&self) -> Result<Vec<Observation>, RepositoryError> {
        let mut observations = Vec::new();
        for sbid in self.list()? {
            if let Some(obs) = self.load(sbid)? {
                observations.push(obs);
            }
        }
        Ok(observations)
    }

    /// Observations whose own state type is one of `types`.
    fn find_by_state_types(
        &self,
        types: &[DepositStateType],
    ) -> Result<Vec<Observation>, RepositoryError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|o| types.contains(&o.deposit_state_type()))
            .collect())
    }

    /// Observations that completed deposit within `[from, to]`.
    fn find_completed_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Observation>, RepositoryError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|o| o.deposit_completed().is_some_and(|t| t.is_within(from, to)))
            .collect())
    }

    /// Artefacts, across all observations, whose state type is one of `types`.
    fn find_artefacts_by_state_types(
        &self,
        types: &[DepositStateType],
    ) -> Result<Vec<(Sbid, Artefact)>, RepositoryError> {
        let mut found = Vec::new();
        for obs in self.load_all()? {
            for artefact in obs.artefacts() {
                if types.contains(&artefact.deposit_state_type()) {
                    found.push((obs.sbid(), artefact.clone()));
                }
            }
        }
        Ok(found)
    }
}

/// Repository kept in a map. Used by tests and embedded drivers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObservationRepository {
    observations: BTreeMap<Sbid, Observation>,
}

impl InMemoryObservationRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl ObservationRepository for InMemoryObservationRepository {
    fn load(&self, sbid: Sbid) -> Result<Option<Observation>, RepositoryError> {
        Ok(self.observations.get(&sbid).cloned())
    }

    fn save(&mut self, observation: &Observation) -> Result<(), RepositoryError> {
        self.observations
            .insert(observation.sbid(), observation.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Sbid>, RepositoryError> {
        Ok(self.observations.keys().copied().collect())
    }

    fn load_all(&self) -> Result<Vec<Observation>, RepositoryError> {
        Ok(self.observations.values().cloned().collect())
    }
}
