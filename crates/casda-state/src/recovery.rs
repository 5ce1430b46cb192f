//! # Recovery
//!
//! Rolls artefacts (and their observation) out of a failure-class state
//! back to the checkpoint recorded when they failed. The failure count is
//! kept as audit trail.
//!
//! - `recover_artefact`: the artefact must be failed. If the observation was
//!   failed only because of failed children and none remain, the
//!   observation is recovered too.
//! - `recover_observation`: the observation must be failed. Every failed
//!   child is recovered, then the observation.

use casda_core::Sbid;
use thiserror::Error;

use crate::depositable::{DepositTransition, Depositable};
use crate::error::DepositError;
use crate::observation::Observation;
use crate::repository::{ObservationRepository, RepositoryError};
use crate::state::DepositStateType;

/// Reasons a recovery request does not apply.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The artefact is not in a failure-class state.
    #[error("artefact {file_id:?} of observation {sbid} is {state}, not a failed deposit")]
    ArtefactInvalidState {
        /// Observation.
        sbid: Sbid,
        /// Artefact filename.
        file_id: String,
        /// Its current state type.
        state: DepositStateType,
    },

    /// No such artefact in the observation.
    #[error("observation {sbid} has no artefact {file_id:?}")]
    ArtefactNotFound {
        /// Observation.
        sbid: Sbid,
        /// Artefact filename.
        file_id: String,
    },

    /// No such observation.
    #[error("observation {sbid} not found")]
    ObservationNotFound {
        /// Requested sbid.
        sbid: Sbid,
    },

    /// The observation is not in a failure-class state.
    #[error("observation {sbid} is {state}, not a failed deposit")]
    ObservationNotFailed {
        /// Observation.
        sbid: Sbid,
        /// Its current state type.
        state: DepositStateType,
    },

    /// The checkpoint could not be rebound.
    #[error(transparent)]
    Deposit(#[from] DepositError),

    /// The repository failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Recover one failed artefact of `observation`, identified by filename.
pub fn recover_artefact(
    observation: &mut Observation,
    file_id: &str,
) -> Result<Vec<DepositTransition>, RecoveryError> {
    let sbid = observation.sbid();
    let artefact = observation
        .artefact_by_filename_mut(file_id)
        .ok_or_else(|| RecoveryError::ArtefactNotFound {
            sbid,
            file_id: file_id.to_string(),
        })?;
    if !artefact.is_failed_deposit() {
        return Err(RecoveryError::ArtefactInvalidState {
            sbid,
            file_id: file_id.to_string(),
            state: artefact.deposit_state_type(),
        });
    }

    let mut transitions: Vec<DepositTransition> =
        artefact.recover_deposit()?.into_iter().collect();

    if observation.is_failed_deposit()
        && !observation.artefacts().iter().any(|a| a.is_failed_deposit())
    {
        transitions.extend(observation.recover_deposit()?);
    }
    tracing::info!(sbid = %sbid, file_id, recovered = transitions.len(), "artefact recovered");
    Ok(transitions)
}

/// Recover a failed observation and every failed artefact in it.
pub fn recover_observation(
    observation: &mut Observation,
) -> Result<Vec<DepositTransition>, RecoveryError> {
    let sbid = observation.sbid();
    if !observation.is_failed_deposit() {
        return Err(RecoveryError::ObservationNotFailed {
            sbid,
            state: observation.deposit_state_type(),
        });
    }

    let mut transitions = Vec::new();
    for artefact in observation.artefacts_mut() {
        if artefact.is_failed_deposit() {
            transitions.extend(artefact.recover_deposit()?);
        }
    }
    transitions.extend(observation.recover_deposit()?);
    tracing::info!(sbid = %sbid, recovered = transitions.len(), "observation recovered");
    Ok(transitions)
}

/// Recovery over a repository: load, recover, save.
pub struct RecoveryService<'r, R: ObservationRepository + ?Sized> {
    repository: &'r mut R,
}

impl<'r, R: ObservationRepository + ?Sized> RecoveryService<'r, R> {
    /// Wrap a repository.
    pub fn new(repository: &'r mut R) -> Self {
        Self { repository }
    }

    fn load(&self, sbid: Sbid) -> Result<Observation, RecoveryError> {
        self.repository
            .load(sbid)?
            .ok_or(RecoveryError::ObservationNotFound { sbid })
    }

    /// Recover artefact `file_id` of observation `sbid`.
    pub fn recover_artefact(
        &mut self,
        sbid: Sbid,
        file_id: &str,
    ) -> Result<Vec<DepositTransition>, RecoveryError> {
        let mut observation = self.load(sbid)?;
        let transitions = recover_artefact(&mut observation, file_id)?;
        self.repository.save(&observation)?;
        Ok(transitions)
    }

    /// Recover observation `sbid`.
    pub fn recover_observation(
        &mut self,
        sbid: Sbid,
    ) -> Result<Vec<DepositTransition>, RecoveryError> {
        let mut observation = self.load(sbid)?;
        let transitions = recover_observation(&mut observation)?;
        self.repository.save(&observation)?;
        Ok(transitions)
    }
}
