//! # Deposit Errors
//!
//! Configuration and structural errors raised while building or driving a
//! deposit hierarchy. FAILED and INVALID are pipeline states, not errors:
//! they never appear here, and a progression call that makes no progress
//! is a success.

use thiserror::Error;

use crate::artefact::{ArtefactId, DepositableKind};
use crate::lifecycle::Lifecycle;
use crate::state::DepositStateType;

/// Errors from the state factory and from hierarchy construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepositError {
    /// The factory has no lifecycle registered for this kind.
    #[error("no lifecycle registered for artefact kind {kind}")]
    UnregisteredKind {
        /// Kind requested.
        kind: DepositableKind,
    },

    /// The state type is not part of the owner's lifecycle.
    #[error("state type {state} is not part of the {lifecycle} lifecycle")]
    UnknownStateType {
        /// Lifecycle of the owner.
        lifecycle: Lifecycle,
        /// State type requested.
        state: DepositStateType,
    },

    /// A direct state change would move backward or leave a failure
    /// class. Only recovery does that.
    #[error("{owner} cannot move from {from} to {to} without recovery")]
    StateRegression {
        /// Owner identity.
        owner: String,
        /// Current state type.
        from: DepositStateType,
        /// State type requested.
        to: DepositStateType,
    },

    /// An encapsulation file cannot be deposited before all of its members
    /// are encapsulated.
    #[error("encapsulation {encapsulation} cannot be deposited: member {member} is {state}")]
    EncapsulationNotReady {
        /// Encapsulation filename.
        encapsulation: String,
        /// First member short of ENCAPSULATED.
        member: String,
        /// That member's state type.
        state: DepositStateType,
    },

    /// A state name did not match any state type.
    #[error("unknown deposit state type name: {0:?}")]
    UnknownStateName(String),

    /// Only spectra, moment maps, cubelets, thumbnails and evaluation files
    /// can be packed into an encapsulation.
    #[error("artefact kind {kind} cannot be encapsulated")]
    NotEncapsulatable {
        /// Kind requested.
        kind: DepositableKind,
    },

    /// Filenames are unique within a parent.
    #[error("{parent} already has an artefact named {filename:?}")]
    DuplicateFilename {
        /// Parent identity.
        parent: String,
        /// Offending filename.
        filename: String,
    },

    /// The referenced encapsulation does not exist or is not an encapsulation file.
    #[error("{parent} has no encapsulation file with id {id}")]
    UnknownEncapsulation {
        /// Parent identity.
        parent: String,
        /// Arena id requested.
        id: ArtefactId,
    },

    /// The kind is a top-level parent and cannot be a child artefact.
    #[error("artefact kind {kind} cannot be a child artefact")]
    NotAChildKind {
        /// Kind requested.
        kind: DepositableKind,
    },

    /// No artefact with the given id in the parent's arena.
    #[error("{parent} has no artefact with id {id}")]
    UnknownArtefact {
        /// Parent identity.
        parent: String,
        /// Arena id requested.
        id: ArtefactId,
    },
}
