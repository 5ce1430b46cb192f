//! # Level 7 Collections
//!
//! Derived catalogues contributed by science teams after an observation has
//! been deposited. The collection is validated first; its catalogues only
//! start moving once it is DEPOSITING, and the collection deposits when
//! every catalogue has.
//!
//! INVALID is set by the validation job, never reached by progression.

use casda_core::{CollectionId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::artefact::{Artefact, ArtefactId, DepositableKind, OwnerRef, ParentRef};
use crate::comparator::{ordered_indices, sort_children};
use crate::context::ProgressContext;
use crate::depositable::{
    ChildDepositableArtefact, DepositRecord, DepositTransition, Depositable,
    ParentDepositableArtefact,
};
use crate::error::DepositError;
use crate::factory::DepositStateFactory;
use crate::signals::StageSignals;
use crate::state::{DepositState, DepositStateType};

/// A level 7 collection and its catalogues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level7Collection {
    id: CollectionId,
    record: DepositRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deposit_completed: Option<Timestamp>,
    #[serde(default)]
    catalogues: Vec<Artefact>,
}

impl Level7Collection {
    /// A new UNVALIDATED collection.
    pub fn new(id: CollectionId, factory: &DepositStateFactory) -> Result<Self, DepositError> {
        let state = factory.initial_state(
            DepositableKind::Level7Collection,
            false,
            OwnerRef::Level7Collection(id),
        )?;
        Ok(Self {
            id,
            record: DepositRecord::new(state),
            deposit_completed: None,
            catalogues: Vec::new(),
        })
    }

    /// Collection id.
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Reference used by catalogues.
    pub fn parent_ref(&self) -> ParentRef {
        ParentRef::Level7Collection(self.id)
    }

    /// When the collection reached DEPOSITED.
    pub fn deposit_completed(&self) -> Option<Timestamp> {
        self.deposit_completed
    }

    /// Add a catalogue.
    pub fn add_catalogue(
        &mut self,
        factory: &DepositStateFactory,
        filename: impl Into<String>,
    ) -> Result<ArtefactId, DepositError> {
        let filename = filename.into();
        if self.catalogues.iter().any(|c| c.filename() == filename) {
            return Err(DepositError::DuplicateFilename {
                parent: self.parent_ref().to_string(),
                filename,
            });
        }
        let parent = Some(self.parent_ref());
        let owner = OwnerRef::artefact(parent, filename.clone());
        let state = factory.initial_state(DepositableKind::Catalogue, false, owner)?;
        let id = ArtefactId(self.catalogues.len() as u32);
        self.catalogues.push(Artefact::new(
            id,
            DepositableKind::Catalogue,
            filename,
            parent,
            None,
            DepositRecord::new(state),
        ));
        Ok(id)
    }

    /// Catalogues, in arena order.
    pub fn catalogues(&self) -> &[Artefact] {
        &self.catalogues
    }

    /// Set a catalogue's state type directly (job runner).
    pub fn set_catalogue_state(
        &mut self,
        id: ArtefactId,
        state_type: DepositStateType,
    ) -> Result<Option<DepositTransition>, DepositError> {
        let parent = self.parent_ref().to_string();
        self.catalogues
            .get_mut(id.index())
            .filter(|c| c.id() == id)
            .ok_or(DepositError::UnknownArtefact { parent, id })?
            .transition_to(state_type)
    }

    fn apply(&mut self, next: DepositState) -> Option<DepositTransition> {
        let transition = self.record.replace(next)?;
        if transition.to == DepositStateType::Deposited {
            self.deposit_completed = Some(transition.timestamp);
        }
        Some(transition)
    }

    /// Set the collection's own state type directly (validation job).
    pub fn set_state(
        &mut self,
        state_type: DepositStateType,
    ) -> Result<Option<DepositTransition>, DepositError> {
        self.transition_to(state_type)
    }
}

impl Depositable for Level7Collection {
    fn deposit_record(&self) -> &DepositRecord {
        &self.record
    }

    fn deposit_record_mut(&mut self) -> &mut DepositRecord {
        &mut self.record
    }

    /// Also stamps the completion time.
    fn transition_to(
        &mut self,
        state_type: DepositStateType,
    ) -> Result<Option<DepositTransition>, DepositError> {
        let next = self.record.state().advance_to(state_type)?;
        Ok(self.apply(next))
    }
}

impl ParentDepositableArtefact for Level7Collection {
    type Child = Artefact;

    fn children(&self) -> Vec<&Artefact> {
        let mut children: Vec<&Artefact> = self.catalogues.iter().collect();
        sort_children(&mut children);
        children
    }

    fn progress_deposit(&mut self, signals: &dyn StageSignals) -> Vec<DepositTransition> {
        let mut transitions = Vec::new();
        if self.is_failed_deposit() || self.deposit_state().is_terminal() {
            return transitions;
        }

        if self.deposit_state_type() == DepositStateType::Depositing {
            for i in ordered_indices(&self.catalogues, |_| true) {
                let ctx = ProgressContext::new(signals);
                transitions.extend(self.catalogues[i].progress_deposit(&ctx));
            }
            if let Some(failed) = self.catalogues.iter().find(|c| c.is_failed_deposit()) {
                tracing::warn!(
                    collection = %self.id,
                    catalogue = %failed.filename(),
                    "catalogue failed, failing collection"
                );
                let next = self.record.state().failed();
                transitions.extend(self.record.replace(next));
                return transitions;
            }
        }

        let next = {
            let children = self.catalogues.iter().map(|c| c.deposit_state()).collect();
            let ctx = ProgressContext::new(signals).with_children(children);
            self.record.state().progress(&ctx)
        };
        transitions.extend(self.apply(next));
        transitions
    }
}
