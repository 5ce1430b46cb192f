//! # Depositable Capabilities
//!
//! [`Depositable`] is implemented by everything that carries a deposit
//! state. It owns a [`DepositRecord`]: the current state plus the failure
//! audit trail. Every state change goes through
//! [`DepositRecord::replace`], which is where failure counting, checkpoint
//! bookkeeping and transition logging happen.
//!
//! [`ChildDepositableArtefact`] adds parent navigation and encapsulation
//! membership. [`ParentDepositableArtefact`] adds the child list and the
//! aggregate `progress_deposit` call that an external scheduler polls.

use casda_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::artefact::{ArtefactId, DepositableKind, OwnerRef, ParentRef};
use crate::error::DepositError;
use crate::signals::StageSignals;
use crate::state::{DepositState, DepositStateType};

// ─── Transition Record ───────────────────────────────────────────────

/// One applied state replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTransition {
    /// Owner whose state was replaced.
    pub owner: OwnerRef,
    /// State type before.
    pub from: DepositStateType,
    /// State type after.
    pub to: DepositStateType,
    /// When the replacement happened.
    pub timestamp: Timestamp,
}

impl std::fmt::Display for DepositTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.owner, self.from, self.to)
    }
}

// ─── Deposit Record ──────────────────────────────────────────────────

/// Current state of a depositable plus its failure audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    state: DepositState,
    #[serde(default)]
    failure_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checkpoint: Option<DepositStateType>,
}

impl DepositRecord {
    /// A record starting in `state` with no failures.
    pub fn new(state: DepositState) -> Self {
        Self {
            state,
            failure_count: 0,
            checkpoint: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &DepositState {
        &self.state
    }

    /// Number of distinct entries into a failure-class state.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Last non-failure state type before the current failure, if failed.
    pub fn checkpoint(&self) -> Option<DepositStateType> {
        self.checkpoint
    }

    /// Swap in `next` wholesale.
    ///
    /// Replacing a state with one of the same type is a no-op, so
    /// FAILED followed by FAILED counts once. Entering a failure-class type
    /// increments the failure count; entering it from outside the failure
    /// class records the previous type as checkpoint. Leaving the failure
    /// class clears the checkpoint.
    pub fn replace(&mut self, next: DepositState) -> Option<DepositTransition> {
        let from = self.state.state_type();
        let to = next.state_type();
        if from == to {
            return None;
        }

        let owner = next.owner().clone();
        if to.is_failure() {
            self.failure_count += 1;
            if !from.is_failure() {
                self.checkpoint = Some(from);
            }
            tracing::warn!(
                owner = %owner,
                from = %from,
                to = %to,
                failure_count = self.failure_count,
                "deposit failed"
            );
        } else {
            if from.is_failure() {
                self.checkpoint = None;
            }
            tracing::info!(owner = %owner, from = %from, to = %to, "deposit state changed");
        }

        self.state = next;
        Some(DepositTransition {
            owner,
            from,
            to,
            timestamp: Timestamp::now(),
        })
    }

    /// Roll a failure-class state back to its checkpoint.
    ///
    /// Returns `Ok(None)` when the state is not a failure. Without a
    /// checkpoint the lifecycle's initial state is used. The failure count
    /// is kept as audit trail.
    pub fn recover(&mut self) -> Result<Option<DepositTransition>, DepositError> {
        if !self.state.is_failed_deposit() {
            return Ok(None);
        }
        let target = self
            .checkpoint
            .unwrap_or_else(|| self.state.lifecycle().initial());
        let next = self.state.rebind(target)?;
        let transition = self.replace(next);
        if let Some(t) = &transition {
            tracing::info!(owner = %t.owner, to = %t.to, "deposit recovered");
        }
        Ok(transition)
    }
}

// ─── Capabilities ────────────────────────────────────────────────────

/// Anything with a deposit state.
pub trait Depositable {
    /// The record holding the current state.
    fn deposit_record(&self) -> &DepositRecord;

    /// Mutable access to the record.
    fn deposit_record_mut(&mut self) -> &mut DepositRecord;

    /// Current state.
    fn deposit_state(&self) -> &DepositState {
        self.deposit_record().state()
    }

    /// Current state type.
    fn deposit_state_type(&self) -> DepositStateType {
        self.deposit_state().state_type()
    }

    /// Whether fully deposited.
    fn is_deposited(&self) -> bool {
        self.deposit_state().is_deposited()
    }

    /// Whether in a failure-class state.
    fn is_failed_deposit(&self) -> bool {
        self.deposit_state().is_failed_deposit()
    }

    /// Number of distinct entries into a failure-class state.
    fn deposit_failure_count(&self) -> u32 {
        self.deposit_record().failure_count()
    }

    /// Checkpoint recorded by the current failure, if any.
    fn checkpoint_state_type(&self) -> Option<DepositStateType> {
        self.deposit_record().checkpoint()
    }

    /// Swap in a new state.
    fn replace_deposit_state(&mut self, next: DepositState) -> Option<DepositTransition> {
        self.deposit_record_mut().replace(next)
    }

    /// Set the state type directly, as a job runner does.
    ///
    /// The target must be later in the lifecycle, or failure-class. See
    /// [`DepositState::advance_to`].
    fn transition_to(
        &mut self,
        state_type: DepositStateType,
    ) -> Result<Option<DepositTransition>, DepositError> {
        let next = self.deposit_state().advance_to(state_type)?;
        Ok(self.replace_deposit_state(next))
    }

    /// Roll a failure back to its checkpoint.
    fn recover_deposit(&mut self) -> Result<Option<DepositTransition>, DepositError> {
        self.deposit_record_mut().recover()
    }
}

/// A depositable with a parent.
pub trait ChildDepositableArtefact: Depositable {
    /// Kind of artefact.
    fn kind(&self) -> DepositableKind;

    /// Filename, unique within the parent.
    fn filename(&self) -> &str;

    /// Parent reference, `None` when detached.
    fn parent(&self) -> Option<&ParentRef>;

    /// Encapsulation this artefact is packed into, if any.
    fn encapsulation(&self) -> Option<ArtefactId>;

    /// Whether bound to an encapsulation.
    fn is_encapsulated(&self) -> bool {
        self.encapsulation().is_some()
    }
}

/// A depositable owning children and driving their progression.
pub trait ParentDepositableArtefact: Depositable {
    /// Child type.
    type Child: ChildDepositableArtefact;

    /// Children, in processing order.
    fn children(&self) -> Vec<&Self::Child>;

    /// Advance this hierarchy by at most one step per entity.
    ///
    /// Returns every transition applied during the call. An empty result
    /// means nothing was ready, which is not an error.
    fn progress_deposit(&mut self, signals: &dyn StageSignals) -> Vec<DepositTransition>;

    /// Children in a failure-class state.
    fn failed_children(&self) -> Vec<&Self::Child> {
        self.children()
            .into_iter()
            .filter(|c| c.is_failed_deposit())
            .collect()
    }

    /// Whether every child is deposited.
    fn all_children_deposited(&self) -> bool {
        self.children().iter().all(|c| c.is_deposited())
    }
}
