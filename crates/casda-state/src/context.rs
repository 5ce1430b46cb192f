//! # Progress Context
//!
//! What a state needs to know about its surroundings to decide whether its
//! outgoing step is open: the readiness signals, the states of the owner's
//! children, and the state of the owner's encapsulation. Parents build one
//! per owner per call from a read-only view of their arena.

use crate::artefact::OwnerRef;
use crate::lifecycle::{Gate, Step};
use crate::signals::StageSignals;
use crate::state::{DepositState, DepositStateType};

/// Read-only view consulted by [`DepositState::progress`].
pub struct ProgressContext<'a> {
    signals: &'a dyn StageSignals,
    children: Vec<&'a DepositState>,
    priority_children: Vec<&'a DepositState>,
    encapsulation: Option<&'a DepositState>,
}

impl<'a> ProgressContext<'a> {
    /// A context with signals only: no children, no encapsulation.
    pub fn new(signals: &'a dyn StageSignals) -> Self {
        Self {
            signals,
            children: Vec::new(),
            priority_children: Vec::new(),
            encapsulation: None,
        }
    }

    /// Set the owner's children.
    pub fn with_children(mut self, children: Vec<&'a DepositState>) -> Self {
        self.children = children;
        self
    }

    /// Set the owner's priority children.
    pub fn with_priority_children(mut self, children: Vec<&'a DepositState>) -> Self {
        self.priority_children = children;
        self
    }

    /// Set the owner's encapsulation state.
    pub fn with_encapsulation(mut self, encapsulation: Option<&'a DepositState>) -> Self {
        self.encapsulation = encapsulation;
        self
    }

    /// Whether `step` may be taken by `owner` now.
    pub fn permits(&self, step: &Step, owner: &OwnerRef) -> bool {
        let structural = match step.gate {
            Gate::Immediate => true,
            Gate::External => false,
            Gate::ChildrenReached(stage) => self.children.iter().all(|c| c.has_reached(stage)),
            Gate::EncapsulationReached(stage) => {
                self.encapsulation.is_some_and(|e| e.has_reached(stage))
            }
            Gate::PriorityChildrenDeposited => {
                self.priority_children.iter().all(|c| c.is_deposited())
            }
            Gate::ChildrenDeposited => self.children.iter().all(|c| c.is_deposited()),
        };
        structural && (!step.awaits_signal || self.signal(owner, step.from))
    }

    fn signal(&self, owner: &OwnerRef, stage: DepositStateType) -> bool {
        self.signals.is_complete(owner, stage)
    }
}

impl std::fmt::Debug for ProgressContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressContext")
            .field("children", &self.children.len())
            .field("priority_children", &self.priority_children.len())
            .field("encapsulation", &self.encapsulation.map(|e| e.state_type()))
            .finish()
    }
}
