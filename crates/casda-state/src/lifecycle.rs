//! # Lifecycle Tables
//!
//! Each depositable kind walks a fixed, linear sequence of stages. Rather
//! than one state class per stage per kind, a lifecycle is a static table of
//! [`Step`]s interpreted by a single generic progression routine
//! ([`DepositState::progress`](crate::DepositState::progress)).
//!
//! ## Sequences
//!
//! ```text
//! Standard          UNDEPOSITED ─▶ PROCESSING ─▶ PROCESSED ─▶ DEPOSITING ─▶ DEPOSITED
//!
//! Archived          UNDEPOSITED ─▶ PROCESSING ─▶ PROCESSED ─▶ STAGING ─▶ STAGED
//!                   ─▶ REGISTERING ─▶ REGISTERED ─▶ ARCHIVING ─▶ ARCHIVED ─▶ DEPOSITED
//!
//! Encapsulated      UNDEPOSITED ─▶ PROCESSING ═▶ ENCAPSULATING ─▶ ENCAPSULATED ═▶ DEPOSITED
//!                   (═▶ set externally: job runner / encapsulation fan-out)
//!
//! Encapsulation     same stages as Archived; PROCESSING ─▶ PROCESSED waits for every
//!                   member to be ENCAPSULATING, ARCHIVED ─▶ DEPOSITED for every member
//!                   to be ENCAPSULATED
//!
//! Observation       UNDEPOSITED ─▶ PRIORITY_DEPOSITING ─▶ DEPOSITING ─▶ ARCHIVING
//!                   ─▶ NOTIFYING ─▶ DEPOSITED
//!
//! Level7Collection  UNVALIDATED ─▶ VALIDATING ─▶ VALID ─▶ PREPARING ─▶ DEPOSITING
//!                   ─▶ DEPOSITED
//! ```
//!
//! FAILED and INVALID are accepted by every lifecycle. Neither has an
//! outgoing step, so only recovery leaves them.

use serde::{Deserialize, Serialize};

use crate::state::DepositStateType as S;

/// Condition, besides an optional readiness signal, that opens a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Open as soon as the owner is progressed.
    Immediate,
    /// Never self-progressed; a job runner or parent sets the next stage.
    External,
    /// Every child has reached the given stage.
    ChildrenReached(S),
    /// The owner's encapsulation has reached the given stage.
    EncapsulationReached(S),
    /// Every priority child (observation metadata file) is deposited.
    PriorityChildrenDeposited,
    /// Every child is deposited.
    ChildrenDeposited,
}

/// One edge of a lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Stage the edge leaves.
    pub from: S,
    /// Stage the edge enters.
    pub to: S,
    /// Structural condition.
    pub gate: Gate,
    /// Whether the external "work for `from` complete" signal is also required.
    pub awaits_signal: bool,
}

const fn step(from: S, to: S, gate: Gate, awaits_signal: bool) -> Step {
    Step {
        from,
        to,
        gate,
        awaits_signal,
    }
}

const STANDARD: &[Step] = &[
    step(S::Undeposited, S::Processing, Gate::Immediate, false),
    step(S::Processing, S::Processed, Gate::Immediate, true),
    step(S::Processed, S::Depositing, Gate::Immediate, false),
    step(S::Depositing, S::Deposited, Gate::Immediate, true),
];

const ARCHIVED: &[Step] = &[
    step(S::Undeposited, S::Processing, Gate::Immediate, false),
    step(S::Processing, S::Processed, Gate::Immediate, true),
    step(S::Processed, S::Staging, Gate::Immediate, false),
    step(S::Staging, S::Staged, Gate::Immediate, true),
    step(S::Staged, S::Registering, Gate::Immediate, false),
    step(S::Registering, S::Registered, Gate::Immediate, true),
    step(S::Registered, S::Archiving, Gate::Immediate, false),
    step(S::Archiving, S::Archived, Gate::Immediate, true),
    step(S::Archived, S::Deposited, Gate::Immediate, false),
];

const ENCAPSULATED: &[Step] = &[
    step(S::Undeposited, S::Processing, Gate::Immediate, false),
    step(S::Processing, S::Encapsulating, Gate::External, false),
    step(
        S::Encapsulating,
        S::Encapsulated,
        Gate::EncapsulationReached(S::Processed),
        false,
    ),
    step(S::Encapsulated, S::Deposited, Gate::External, false),
];

const ENCAPSULATION: &[Step] = &[
    step(S::Undeposited, S::Processing, Gate::Immediate, false),
    step(
        S::Processing,
        S::Processed,
        Gate::ChildrenReached(S::Encapsulating),
        true,
    ),
    step(S::Processed, S::Staging, Gate::Immediate, false),
    step(S::Staging, S::Staged, Gate::Immediate, true),
    step(S::Staged, S::Registering, Gate::Immediate, false),
    step(S::Registering, S::Registered, Gate::Immediate, true),
    step(S::Registered, S::Archiving, Gate::Immediate, false),
    step(S::Archiving, S::Archived, Gate::Immediate, true),
    step(
        S::Archived,
        S::Deposited,
        Gate::ChildrenReached(S::Encapsulated),
        false,
    ),
];

const OBSERVATION: &[Step] = &[
    step(S::Undeposited, S::PriorityDepositing, Gate::Immediate, false),
    step(
        S::PriorityDepositing,
        S::Depositing,
        Gate::PriorityChildrenDeposited,
        false,
    ),
    step(S::Depositing, S::Archiving, Gate::ChildrenDeposited, false),
    step(S::Archiving, S::Notifying, Gate::Immediate, true),
    step(S::Notifying, S::Deposited, Gate::Immediate, true),
];

const LEVEL7_COLLECTION: &[Step] = &[
    step(S::Unvalidated, S::Validating, Gate::Immediate, false),
    step(S::Validating, S::Valid, Gate::Immediate, true),
    step(S::Valid, S::Preparing, Gate::Immediate, false),
    step(S::Preparing, S::Depositing, Gate::Immediate, true),
    step(S::Depositing, S::Deposited, Gate::ChildrenDeposited, false),
];

/// A named lifecycle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Processed then deposited directly.
    Standard,
    /// Staged, registered and archived individually.
    Archived,
    /// Packed into an encapsulation archive.
    Encapsulated,
    /// The encapsulation archive itself.
    Encapsulation,
    /// Top-level observation.
    Observation,
    /// Level 7 (derived data) collection.
    Level7Collection,
}

impl Lifecycle {
    /// Every lifecycle.
    pub const ALL: [Lifecycle; 6] = [
        Self::Standard,
        Self::Archived,
        Self::Encapsulated,
        Self::Encapsulation,
        Self::Observation,
        Self::Level7Collection,
    ];

    /// The step table, in sequence order.
    pub fn steps(&self) -> &'static [Step] {
        match self {
            Self::Standard => STANDARD,
            Self::Archived => ARCHIVED,
            Self::Encapsulated => ENCAPSULATED,
            Self::Encapsulation => ENCAPSULATION,
            Self::Observation => OBSERVATION,
            Self::Level7Collection => LEVEL7_COLLECTION,
        }
    }

    /// The stage a new owner starts in.
    pub fn initial(&self) -> S {
        match self {
            Self::Level7Collection => S::Unvalidated,
            _ => S::Undeposited,
        }
    }

    /// Position of `stage` in the sequence, or `None` if it is not part of it.
    pub fn position(&self, stage: S) -> Option<usize> {
        if stage == self.initial() {
            return Some(0);
        }
        self.steps()
            .iter()
            .position(|s| s.to == stage)
            .map(|i| i + 1)
    }

    /// The step leaving `stage`, if any.
    pub fn step_from(&self, stage: S) -> Option<&'static Step> {
        self.steps().iter().find(|s| s.from == stage)
    }

    /// Whether an owner on this lifecycle may be put into `stage`.
    pub fn accepts(&self, stage: S) -> bool {
        match stage {
            S::Failed | S::Invalid => true,
            other => self.position(other).is_some(),
        }
    }

    /// The full stage sequence, initial stage first.
    pub fn sequence(&self) -> Vec<S> {
        std::iter::once(self.initial())
            .chain(self.steps().iter().map(|s| s.to))
            .collect()
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Archived => "archived",
            Self::Encapsulated => "encapsulated",
            Self::Encapsulation => "encapsulation",
            Self::Observation => "observation",
            Self::Level7Collection => "level7_collection",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
