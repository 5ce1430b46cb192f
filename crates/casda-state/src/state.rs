//! # Deposit States
//!
//! A deposit state is one pipeline stage for one artefact. It is a small
//! immutable value: the stage tag ([`DepositStateType`]), the lifecycle table
//! that gives the stage its meaning, and a non-owning reference to the
//! artefact it belongs to.
//!
//! ## Predicates
//!
//! Instead of one boolean method per concrete state class, every stage tag
//! maps to a [`StateClass`] bit set (terminal, failure, encapsulation,
//! archival, validation). All `is_*` predicates read that table.
//!
//! ## Replacement, not mutation
//!
//! A `DepositState` is never modified. [`DepositState::progress`] returns a
//! fresh value (either a clone of `self` or the next stage) and the owning
//! record swaps it in wholesale, so a reader never observes a half-applied
//! transition.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artefact::OwnerRef;
use crate::context::ProgressContext;
use crate::error::DepositError;
use crate::lifecycle::Lifecycle;

// ─── State Types ─────────────────────────────────────────────────────

/// Every stage a depositable can be in, across all lifecycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStateType {
    /// Imported, nothing started yet.
    Undeposited,
    /// Artefact-level processing job running (checksums, metadata extraction).
    Processing,
    /// Processing finished.
    Processed,
    /// Waiting to be packed into its encapsulation archive.
    Encapsulating,
    /// Packed into its encapsulation archive.
    Encapsulated,
    /// Being copied to the archive staging area.
    Staging,
    /// Present in the staging area.
    Staged,
    /// Being registered with the archive catalogue.
    Registering,
    /// Registered with the archive catalogue.
    Registered,
    /// Archive job running.
    Archiving,
    /// Archive job finished.
    Archived,
    /// Fully deposited (terminal).
    Deposited,
    /// Observation-level: notifying the project system that the deposit finished.
    Notifying,
    /// Observation-level: depositing priority artefacts (metadata file).
    PriorityDepositing,
    /// Depositing (observation children, standard artefacts, level 7 catalogues).
    Depositing,
    /// Level 7 collection: validation job running.
    Validating,
    /// Level 7 collection: submitted, not yet validated.
    Unvalidated,
    /// Level 7 collection: validation passed.
    Valid,
    /// Level 7 collection: validation failed (failure class).
    Invalid,
    /// Level 7 collection: preparing derived products for deposit.
    Preparing,
    /// Deposit failed (failure class).
    Failed,
}

impl DepositStateType {
    /// Every state type, in declaration order.
    pub const ALL: [DepositStateType; 21] = [
        Self::Undeposited,
        Self::Processing,
        Self::Processed,
        Self::Encapsulating,
        Self::Encapsulated,
        Self::Staging,
        Self::Staged,
        Self::Registering,
        Self::Registered,
        Self::Archiving,
        Self::Archived,
        Self::Deposited,
        Self::Notifying,
        Self::PriorityDepositing,
        Self::Depositing,
        Self::Validating,
        Self::Unvalidated,
        Self::Valid,
        Self::Invalid,
        Self::Preparing,
        Self::Failed,
    ];

    /// The canonical name, as persisted and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undeposited => "UNDEPOSITED",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Encapsulating => "ENCAPSULATING",
            Self::Encapsulated => "ENCAPSULATED",
            Self::Staging => "STAGING",
            Self::Staged => "STAGED",
            Self::Registering => "REGISTERING",
            Self::Registered => "REGISTERED",
            Self::Archiving => "ARCHIVING",
            Self::Archived => "ARCHIVED",
            Self::Deposited => "DEPOSITED",
            Self::Notifying => "NOTIFYING",
            Self::PriorityDepositing => "PRIORITY_DEPOSITING",
            Self::Depositing => "DEPOSITING",
            Self::Validating => "VALIDATING",
            Self::Unvalidated => "UNVALIDATED",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Preparing => "PREPARING",
            Self::Failed => "FAILED",
        }
    }

    /// Predicate classes of this state type.
    pub const fn class(self) -> StateClass {
        match self {
            Self::Deposited => StateClass::TERMINAL,
            Self::Failed => StateClass::FAILURE,
            Self::Invalid => StateClass::FAILURE.union(StateClass::VALIDATION),
            Self::Encapsulating | Self::Encapsulated => StateClass::ENCAPSULATION,
            Self::Staging
            | Self::Staged
            | Self::Registering
            | Self::Registered
            | Self::Archiving
            | Self::Archived => StateClass::ARCHIVAL,
            Self::Unvalidated | Self::Validating | Self::Valid => StateClass::VALIDATION,
            Self::Undeposited
            | Self::Processing
            | Self::Processed
            | Self::Notifying
            | Self::PriorityDepositing
            | Self::Depositing
            | Self::Preparing => StateClass::NONE,
        }
    }

    /// Whether this type is a failure class (FAILED, INVALID).
    pub fn is_failure(self) -> bool {
        self.class().contains(StateClass::FAILURE)
    }
}

impl std::fmt::Display for DepositStateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepositStateType {
    type Err = DepositError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DepositError::UnknownStateName(s.to_string()))
    }
}

// ─── Predicate Classes ───────────────────────────────────────────────

/// Bit set of predicate classes a state type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateClass(u8);

impl StateClass {
    /// No class.
    pub const NONE: Self = Self(0);
    /// No further progression (DEPOSITED).
    pub const TERMINAL: Self = Self(1);
    /// Failed deposit; counted and recoverable.
    pub const FAILURE: Self = Self(1 << 1);
    /// Encapsulation-bound stage of a child artefact.
    pub const ENCAPSULATION: Self = Self(1 << 2);
    /// Staging, registration or archiving stage.
    pub const ARCHIVAL: Self = Self(1 << 3);
    /// Level 7 validation stage.
    pub const VALIDATION: Self = Self(1 << 4);

    /// Combine two class sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every class in `other` is also in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

// ─── Deposit State ───────────────────────────────────────────────────

/// One pipeline stage bound to one owning artefact.
///
/// Construct through [`DepositStateFactory`](crate::DepositStateFactory);
/// derive successors through [`progress`](Self::progress) or
/// [`rebind`](Self::rebind).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDepositState")]
pub struct DepositState {
    #[serde(rename = "type")]
    state_type: DepositStateType,
    lifecycle: Lifecycle,
    owner: OwnerRef,
}

/// Wire form of a [`DepositState`], checked against its lifecycle on load.
#[derive(Deserialize)]
struct RawDepositState {
    #[serde(rename = "type")]
    state_type: DepositStateType,
    lifecycle: Lifecycle,
    owner: OwnerRef,
}

impl TryFrom<RawDepositState> for DepositState {
    type Error = DepositError;

    fn try_from(raw: RawDepositState) -> Result<Self, Self::Error> {
        Self::bind(raw.state_type, raw.lifecycle, raw.owner)
    }
}

impl DepositState {
    /// Bind a state type to an owner, rejecting types outside the lifecycle.
    pub(crate) fn bind(
        state_type: DepositStateType,
        lifecycle: Lifecycle,
        owner: OwnerRef,
    ) -> Result<Self, DepositError> {
        if !lifecycle.accepts(state_type) {
            return Err(DepositError::UnknownStateType {
                lifecycle,
                state: state_type,
            });
        }
        Ok(Self {
            state_type,
            lifecycle,
            owner,
        })
    }

    /// The stage tag.
    pub fn state_type(&self) -> DepositStateType {
        self.state_type
    }

    /// The lifecycle table this state belongs to.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// The artefact this state belongs to.
    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    /// Whether no further progression is possible.
    pub fn is_terminal(&self) -> bool {
        self.state_type.class().contains(StateClass::TERMINAL)
    }

    /// Whether this is a failed deposit (FAILED, INVALID).
    pub fn is_failed_deposit(&self) -> bool {
        self.state_type.is_failure()
    }

    /// Whether the owner is fully deposited.
    pub fn is_deposited(&self) -> bool {
        self.state_type == DepositStateType::Deposited
    }

    /// Whether the owner is ENCAPSULATING or ENCAPSULATED.
    pub fn is_encapsulation_stage(&self) -> bool {
        self.state_type.class().contains(StateClass::ENCAPSULATION)
    }

    /// Whether the owner is in a staging/registration/archiving stage.
    pub fn is_archival_stage(&self) -> bool {
        self.state_type.class().contains(StateClass::ARCHIVAL)
    }

    /// Whether the owner is in a validation stage.
    pub fn is_validation_stage(&self) -> bool {
        self.state_type.class().contains(StateClass::VALIDATION)
    }

    /// Whether this state is `stage` or later in its lifecycle.
    ///
    /// Failure-class states have reached nothing. A stage outside this
    /// lifecycle is never reached.
    pub fn has_reached(&self, stage: DepositStateType) -> bool {
        match (
            self.lifecycle.position(self.state_type),
            self.lifecycle.position(stage),
        ) {
            (Some(current), Some(wanted)) => current >= wanted,
            _ => false,
        }
    }

    /// Evaluate the outgoing step of this stage against `ctx`.
    ///
    /// Returns the next state if the step's gate is open, otherwise a clone
    /// of `self`. Never moves more than one step.
    pub fn progress(&self, ctx: &ProgressContext<'_>) -> DepositState {
        match self.lifecycle.step_from(self.state_type) {
            Some(step) if ctx.permits(step, &self.owner) => Self {
                state_type: step.to,
                lifecycle: self.lifecycle,
                owner: self.owner.clone(),
            },
            _ => self.clone(),
        }
    }

    /// Same owner and lifecycle, different stage.
    ///
    /// Used by job runners that set a stage directly, by encapsulation
    /// fan-out, and by recovery.
    pub fn rebind(&self, state_type: DepositStateType) -> Result<DepositState, DepositError> {
        Self::bind(state_type, self.lifecycle, self.owner.clone())
    }

    /// The state a job runner may set directly in place of this one.
    ///
    /// Like [`rebind`](Self::rebind), but refuses to move backward in the
    /// lifecycle or out of a failure class. Failure-class targets are
    /// always allowed; everything else must be later than the current
    /// stage. Only recovery moves a state back.
    pub fn advance_to(&self, state_type: DepositStateType) -> Result<DepositState, DepositError> {
        let next = self.rebind(state_type)?;
        if state_type == self.state_type || state_type.is_failure() {
            return Ok(next);
        }
        if self.is_failed_deposit() || self.has_reached(state_type) {
            return Err(DepositError::StateRegression {
                owner: self.owner.to_string(),
                from: self.state_type,
                to: state_type,
            });
        }
        Ok(next)
    }

    /// The FAILED state for the same owner. Every lifecycle accepts FAILED.
    pub fn failed(&self) -> DepositState {
        Self {
            state_type: DepositStateType::Failed,
            lifecycle: self.lifecycle,
            owner: self.owner.clone(),
        }
    }
}

impl std::fmt::Display for DepositState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.state_type, self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{AutoComplete, SignalBoard};
    use casda_core::Sbid;

    fn owner() -> OwnerRef {
        OwnerRef::Observation(Sbid(100))
    }

    #[test]
    fn test_names_round_trip() {
        for t in DepositStateType::ALL {
            assert_eq!(t.as_str().parse::<DepositStateType>().unwrap(), t);
        }
        assert_eq!(
            "priority_depositing".parse::<DepositStateType>().unwrap(),
            DepositStateType::PriorityDepositing
        );
        assert!("HALF_DEPOSITED".parse::<DepositStateType>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&DepositStateType::PriorityDepositing).unwrap();
        assert_eq!(json, "\"PRIORITY_DEPOSITING\"");
    }

    #[test]
    fn test_class_table() {
        assert!(DepositStateType::Failed.is_failure());
        assert!(DepositStateType::Invalid.is_failure());
        assert!(DepositStateType::Invalid
            .class()
            .contains(StateClass::VALIDATION));
        assert!(!DepositStateType::Preparing.is_failure());
        assert!(DepositStateType::Deposited
            .class()
            .contains(StateClass::TERMINAL));
        assert!(DepositStateType::Archived
            .class()
            .contains(StateClass::ARCHIVAL));
        for t in DepositStateType::ALL {
            assert!(t.class().contains(StateClass::NONE));
        }
    }

    #[test]
    fn test_bind_rejects_foreign_stage() {
        let err = DepositState::bind(DepositStateType::Staging, Lifecycle::Observation, owner());
        assert!(matches!(err, Err(DepositError::UnknownStateType { .. })));
    }

    #[test]
    fn test_predicates() {
        let s = DepositState::bind(DepositStateType::Deposited, Lifecycle::Observation, owner())
            .unwrap();
        assert!(s.is_terminal());
        assert!(s.is_deposited());
        assert!(!s.is_failed_deposit());
        let f = s.failed();
        assert!(f.is_failed_deposit());
        assert!(!f.is_terminal());
        assert_eq!(f.owner(), &owner());
    }

    #[test]
    fn test_has_reached() {
        let s = DepositState::bind(
            DepositStateType::Depositing,
            Lifecycle::Observation,
            owner(),
        )
        .unwrap();
        assert!(s.has_reached(DepositStateType::Undeposited));
        assert!(s.has_reached(DepositStateType::Depositing));
        assert!(!s.has_reached(DepositStateType::Archiving));
        assert!(!s.has_reached(DepositStateType::Staging));
        assert!(!s.failed().has_reached(DepositStateType::Undeposited));
    }

    #[test]
    fn test_progress_waits_for_signal() {
        let s = DepositState::bind(
            DepositStateType::Archiving,
            Lifecycle::Observation,
            owner(),
        )
        .unwrap();
        let board = SignalBoard::default();
        let ctx = ProgressContext::new(&board);
        assert_eq!(s.progress(&ctx), s);
        assert_eq!(s.progress(&ctx), s);

        let ctx = ProgressContext::new(&AutoComplete);
        assert_eq!(
            s.progress(&ctx).state_type(),
            DepositStateType::Notifying
        );
    }

    #[test]
    fn test_advance_to_only_moves_forward() {
        let s = DepositState::bind(DepositStateType::Processed, Lifecycle::Standard, owner())
            .unwrap();
        assert_eq!(
            s.advance_to(DepositStateType::Deposited).unwrap().state_type(),
            DepositStateType::Deposited
        );
        assert_eq!(s.advance_to(DepositStateType::Processed).unwrap(), s);
        assert!(matches!(
            s.advance_to(DepositStateType::Undeposited),
            Err(DepositError::StateRegression {
                from: DepositStateType::Processed,
                to: DepositStateType::Undeposited,
                ..
            })
        ));
        assert!(s.advance_to(DepositStateType::Invalid).unwrap().is_failed_deposit());

        let failed = s.failed();
        assert!(matches!(
            failed.advance_to(DepositStateType::Deposited),
            Err(DepositError::StateRegression { .. })
        ));
        assert_eq!(
            failed.advance_to(DepositStateType::Invalid).unwrap().state_type(),
            DepositStateType::Invalid
        );
    }

    #[test]
    fn test_deserialize_rejects_foreign_stage() {
        let s = DepositState::bind(DepositStateType::Processing, Lifecycle::Standard, owner())
            .unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(serde_json::from_str::<DepositState>(&json).unwrap(), s);

        let foreign = json.replace("\"PROCESSING\"", "\"STAGING\"");
        let err = serde_json::from_str::<DepositState>(&foreign).unwrap_err();
        assert!(err.to_string().contains("not part of the standard lifecycle"));
    }

    #[test]
    fn test_terminal_and_failed_do_not_progress() {
        let ctx = ProgressContext::new(&AutoComplete);
        let done =
            DepositState::bind(DepositStateType::Deposited, Lifecycle::Standard, owner()).unwrap();
        assert_eq!(done.progress(&ctx), done);
        let failed = done.failed();
        assert_eq!(failed.progress(&ctx), failed);
    }
}
