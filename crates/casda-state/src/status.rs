//! Read-only status projection for reporting surfaces.

use casda_core::{Sbid, Timestamp};
use serde::{Deserialize, Serialize};

use crate::artefact::{Artefact, DepositableKind};
use crate::depositable::{ChildDepositableArtefact, Depositable, ParentDepositableArtefact};
use crate::observation::Observation;
use crate::state::DepositStateType;

/// Status of one artefact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtefactStatus {
    /// Filename, unique within the observation.
    pub filename: String,
    /// Artefact kind.
    pub kind: DepositableKind,
    /// Current state type.
    pub state: DepositStateType,
    /// Whether DEPOSITED.
    pub deposited: bool,
    /// Whether in a failure-class state.
    pub failed: bool,
    /// Distinct entries into a failure-class state.
    pub failure_count: u32,
    /// State type to recover to, while failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<DepositStateType>,
    /// Filename of the encapsulation this artefact is packed into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encapsulation: Option<String>,
}

/// Status of an observation and all its artefacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationStatus {
    /// Scheduling block id.
    pub sbid: Sbid,
    /// Current state type.
    pub state: DepositStateType,
    /// Whether DEPOSITED.
    pub deposited: bool,
    /// Whether in a failure-class state.
    pub failed: bool,
    /// Distinct entries into a failure-class state.
    pub failure_count: u32,
    /// State type to recover to, while failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<DepositStateType>,
    /// When the observation left UNDEPOSITED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_started: Option<Timestamp>,
    /// When the observation reached DEPOSITED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_completed: Option<Timestamp>,
    /// Artefacts in child order.
    pub artefacts: Vec<ArtefactStatus>,
}

impl ArtefactStatus {
    fn project(artefact: &Artefact, observation: &Observation) -> Self {
        Self {
            filename: artefact.filename().to_string(),
            kind: artefact.kind(),
            state: artefact.deposit_state_type(),
            deposited: artefact.is_deposited(),
            failed: artefact.is_failed_deposit(),
            failure_count: artefact.deposit_failure_count(),
            checkpoint: artefact.checkpoint_state_type(),
            encapsulation: artefact
                .encapsulation()
                .and_then(|id| observation.artefact(id))
                .map(|e| e.filename().to_string()),
        }
    }
}

impl From<&Observation> for ObservationStatus {
    fn from(observation: &Observation) -> Self {
        Self {
            sbid: observation.sbid(),
            state: observation.deposit_state_type(),
            deposited: observation.is_deposited(),
            failed: observation.is_failed_deposit(),
            failure_count: observation.deposit_failure_count(),
            checkpoint: observation.checkpoint_state_type(),
            deposit_started: observation.deposit_started(),
            deposit_completed: observation.deposit_completed(),
            artefacts: observation
                .children()
                .into_iter()
                .map(|a| ArtefactStatus::project(a, observation))
                .collect(),
        }
    }
}

impl ObservationStatus {
    /// Number of artefacts in each state type.
    pub fn state_counts(&self) -> Vec<(DepositStateType, usize)> {
        let mut counts: std::collections::BTreeMap<DepositStateType, usize> =
            std::collections::BTreeMap::new();
        for a in &self.artefacts {
            *counts.entry(a.state).or_default() += 1;
        }
        counts.into_iter().collect()
    }
}
