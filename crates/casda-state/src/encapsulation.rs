//! # Encapsulation Coordination
//!
//! An encapsulation file is a child of its observation and, at the same
//! time, the parent of the small artefacts packed into it. Its members live
//! in the observation's arena and point at it by [`ArtefactId`];
//! [`EncapsulationFile`] is a short-lived view splitting the arena into the
//! file and its members so both can be updated in one call.
//!
//! ## Fan-in
//!
//! The file cannot leave PROCESSING until every member has reached
//! ENCAPSULATING. One lagging member holds the whole encapsulation; each
//! blocked call is a no-op.
//!
//! ## Fan-out
//!
//! Members never deposit themselves. When the file takes its
//! ARCHIVED → DEPOSITED edge (open once every member is ENCAPSULATED), every
//! member that is ENCAPSULATED is forced to DEPOSITED in the same call.
//! Members already DEPOSITED are left alone. A job runner setting the file
//! to DEPOSITED directly ([`EncapsulationFile::set_state`]) goes through the
//! same gate and the same fan-out.

use crate::artefact::{Artefact, ArtefactId, DepositableKind, ParentRef};
use crate::comparator::compare_children;
use crate::context::ProgressContext;
use crate::depositable::{
    ChildDepositableArtefact, DepositRecord, DepositTransition, Depositable,
    ParentDepositableArtefact,
};
use crate::error::DepositError;
use crate::signals::StageSignals;
use crate::state::DepositStateType;

/// Mutable view of one encapsulation file and its members.
#[derive(Debug)]
pub struct EncapsulationFile<'a> {
    file: &'a mut Artefact,
    members: Vec<&'a mut Artefact>,
}

impl<'a> EncapsulationFile<'a> {
    /// Split `artefacts` into the encapsulation `id` and its members.
    ///
    /// Returns `None` if `id` is not an encapsulation file in `artefacts`.
    pub(crate) fn split(artefacts: &'a mut [Artefact], id: ArtefactId) -> Option<Self> {
        let mut file = None;
        let mut members = Vec::new();
        for artefact in artefacts.iter_mut() {
            if artefact.id() == id {
                file = Some(artefact);
            } else if artefact.encapsulation() == Some(id) {
                members.push(artefact);
            }
        }
        let file = file.filter(|f| f.kind() == DepositableKind::EncapsulationFile)?;
        members.sort_by(|a, b| compare_children(Some(&**a), Some(&**b)));
        Some(Self { file, members })
    }

    /// Arena id of the file.
    pub fn id(&self) -> ArtefactId {
        self.file.id()
    }

    /// Set the file's state type directly, as a job runner does.
    ///
    /// DEPOSITED is refused while any member is short of ENCAPSULATED, and
    /// deposits the ENCAPSULATED members in the same call. Returns the
    /// file's transition first, then the members'.
    pub fn set_state(
        &mut self,
        state_type: DepositStateType,
    ) -> Result<Vec<DepositTransition>, DepositError> {
        let next = self.file.deposit_state().advance_to(state_type)?;
        let fan_out = state_type == DepositStateType::Deposited;
        if fan_out {
            if let Some(lagging) = self
                .members
                .iter()
                .find(|m| !m.deposit_state().has_reached(DepositStateType::Encapsulated))
            {
                return Err(DepositError::EncapsulationNotReady {
                    encapsulation: self.file.filename().to_string(),
                    member: lagging.filename().to_string(),
                    state: lagging.deposit_state_type(),
                });
            }
        }

        let mut transitions = Vec::new();
        if let Some(t) = self.file.replace_deposit_state(next) {
            transitions.push(t);
            if fan_out {
                transitions.extend(self.fan_out());
            }
        }
        Ok(transitions)
    }

    /// Force every ENCAPSULATED member to DEPOSITED.
    fn fan_out(&mut self) -> Vec<DepositTransition> {
        let mut transitions = Vec::new();
        for member in self.members.iter_mut() {
            if member.deposit_state_type() != DepositStateType::Encapsulated {
                continue;
            }
            match member.transition_to(DepositStateType::Deposited) {
                Ok(Some(t)) => transitions.push(t),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        encapsulation = %self.file.filename(),
                        member = %member.filename(),
                        error = %e,
                        "encapsulation fan-out skipped member"
                    );
                }
            }
        }
        tracing::debug!(
            encapsulation = %self.file.filename(),
            deposited = transitions.len(),
            "encapsulation fan-out"
        );
        transitions
    }
}

impl Depositable for EncapsulationFile<'_> {
    fn deposit_record(&self) -> &DepositRecord {
        self.file.deposit_record()
    }

    fn deposit_record_mut(&mut self) -> &mut DepositRecord {
        self.file.deposit_record_mut()
    }
}

impl ChildDepositableArtefact for EncapsulationFile<'_> {
    fn kind(&self) -> DepositableKind {
        self.file.kind()
    }

    fn filename(&self) -> &str {
        self.file.filename()
    }

    fn parent(&self) -> Option<&ParentRef> {
        self.file.parent()
    }

    fn encapsulation(&self) -> Option<ArtefactId> {
        None
    }
}

impl ParentDepositableArtefact for EncapsulationFile<'_> {
    type Child = Artefact;

    fn children(&self) -> Vec<&Artefact> {
        self.members.iter().map(|m| &**m).collect()
    }

    fn progress_deposit(&mut self, signals: &dyn StageSignals) -> Vec<DepositTransition> {
        let next = {
            let ctx = ProgressContext::new(signals)
                .with_children(self.members.iter().map(|m| m.deposit_state()).collect());
            self.file.deposit_state().progress(&ctx)
        };

        let mut transitions = Vec::new();
        if let Some(t) = self.file.replace_deposit_state(next) {
            let fan_out = t.from == DepositStateType::Archived && t.to == DepositStateType::Deposited;
            transitions.push(t);
            if fan_out {
                transitions.extend(self.fan_out());
            }
        }
        transitions
    }
}
