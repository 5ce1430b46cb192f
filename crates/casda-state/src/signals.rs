//! # Readiness Signals
//!
//! External jobs (staging, registration, archiving, notification) report
//! completion of a stage's work. Progression only reads those reports; it
//! never starts or awaits a job.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::artefact::OwnerRef;
use crate::state::DepositStateType;

/// Source of "work for this stage is complete" reports.
pub trait StageSignals {
    /// Whether the work of `stage` for `owner` is complete.
    fn is_complete(&self, owner: &OwnerRef, stage: DepositStateType) -> bool;
}

/// Treats every stage as complete. Used by simulations and scenario tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoComplete;

impl StageSignals for AutoComplete {
    fn is_complete(&self, _owner: &OwnerRef, _stage: DepositStateType) -> bool {
        true
    }
}

/// Explicit set of completed (owner, stage) pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBoard {
    completed: BTreeSet<(OwnerRef, DepositStateType)>,
}

impl SignalBoard {
    /// Mark the work of `stage` for `owner` complete. Returns `false` if it already was.
    pub fn signal(&mut self, owner: OwnerRef, stage: DepositStateType) -> bool {
        self.completed.insert((owner, stage))
    }

    /// Withdraw a completion report.
    pub fn withdraw(&mut self, owner: &OwnerRef, stage: DepositStateType) -> bool {
        self.completed.remove(&(owner.clone(), stage))
    }

    /// Number of recorded completions.
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Whether nothing has been signalled.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}

impl StageSignals for SignalBoard {
    fn is_complete(&self, owner: &OwnerRef, stage: DepositStateType) -> bool {
        self.completed.contains(&(owner.clone(), stage))
    }
}
