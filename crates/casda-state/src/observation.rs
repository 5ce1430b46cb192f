//! # Observation
//!
//! Top-level parent of a deposit. Owns the arena of child artefacts
//! (including encapsulation files) and derives its own coarse stage from
//! them:
//!
//! ```text
//! UNDEPOSITED ─▶ PRIORITY_DEPOSITING ─▶ DEPOSITING ─▶ ARCHIVING ─▶ NOTIFYING ─▶ DEPOSITED
//!                 metadata file         every child
//!                 deposited             deposited
//! ```
//!
//! ## One call, one step
//!
//! [`Observation::progress_deposit`] advances each entity at most one step:
//!
//! 1. in PRIORITY_DEPOSITING, the priority children (metadata file);
//! 2. in DEPOSITING, every other non-encapsulation child in child order,
//!    then each encapsulation file in child order (with fan-out);
//! 3. any failed child in scope fails the observation and ends the call;
//! 4. the observation's own step.
//!
//! Because the own step is gated on the children, the observation never
//! outruns its least advanced child.

use std::collections::BTreeMap;

use casda_core::{Sbid, Timestamp};
use serde::{Deserialize, Serialize};

use crate::artefact::{Artefact, ArtefactId, DepositableKind, OwnerRef, ParentRef};
use crate::comparator::{ordered_indices, sort_children};
use crate::context::ProgressContext;
use crate::depositable::{
    ChildDepositableArtefact, DepositRecord, DepositTransition, Depositable,
    ParentDepositableArtefact,
};
use crate::encapsulation::EncapsulationFile;
use crate::error::DepositError;
use crate::factory::DepositStateFactory;
use crate::signals::StageSignals;
use crate::state::{DepositState, DepositStateType};

/// An observation (scheduling block) and its child artefacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    sbid: Sbid,
    record: DepositRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deposit_started: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deposit_completed: Option<Timestamp>,
    #[serde(default)]
    artefacts: Vec<Artefact>,
}

impl Observation {
    /// A freshly imported, UNDEPOSITED observation with no artefacts.
    pub fn new(sbid: Sbid, factory: &DepositStateFactory) -> Result<Self, DepositError> {
        let state = factory.initial_state(
            DepositableKind::Observation,
            false,
            OwnerRef::Observation(sbid),
        )?;
        Ok(Self {
            sbid,
            record: DepositRecord::new(state),
            deposit_started: None,
            deposit_completed: None,
            artefacts: Vec::new(),
        })
    }

    /// Scheduling block id.
    pub fn sbid(&self) -> Sbid {
        self.sbid
    }

    /// Reference used by children.
    pub fn parent_ref(&self) -> ParentRef {
        ParentRef::Observation(self.sbid)
    }

    /// When the observation left UNDEPOSITED.
    pub fn deposit_started(&self) -> Option<Timestamp> {
        self.deposit_started
    }

    /// When the observation reached DEPOSITED.
    pub fn deposit_completed(&self) -> Option<Timestamp> {
        self.deposit_completed
    }

    // ── Construction ────────────────────────────────────────────────

    /// Add a child artefact on its kind's registered lifecycle.
    pub fn add_artefact(
        &mut self,
        factory: &DepositStateFactory,
        kind: DepositableKind,
        filename: impl Into<String>,
    ) -> Result<ArtefactId, DepositError> {
        self.push_artefact(factory, kind, filename.into(), None)
    }

    /// Add a child artefact packed into the encapsulation file `encapsulation`.
    pub fn add_encapsulated_artefact(
        &mut self,
        factory: &DepositStateFactory,
        kind: DepositableKind,
        filename: impl Into<String>,
        encapsulation: ArtefactId,
    ) -> Result<ArtefactId, DepositError> {
        let is_encapsulation = self
            .artefact(encapsulation)
            .is_some_and(|a| a.kind() == DepositableKind::EncapsulationFile);
        if !is_encapsulation {
            return Err(DepositError::UnknownEncapsulation {
                parent: self.parent_ref().to_string(),
                id: encapsulation,
            });
        }
        self.push_artefact(factory, kind, filename.into(), Some(encapsulation))
    }

    fn push_artefact(
        &mut self,
        factory: &DepositStateFactory,
        kind: DepositableKind,
        filename: String,
        encapsulation: Option<ArtefactId>,
    ) -> Result<ArtefactId, DepositError> {
        if !kind.is_child() {
            return Err(DepositError::NotAChildKind { kind });
        }
        if self.artefact_by_filename(&filename).is_some() {
            return Err(DepositError::DuplicateFilename {
                parent: self.parent_ref().to_string(),
                filename,
            });
        }
        let parent = Some(self.parent_ref());
        let owner = OwnerRef::artefact(parent, filename.clone());
        let state = factory.initial_state(kind, encapsulation.is_some(), owner)?;
        let id = ArtefactId(self.artefacts.len() as u32);
        self.artefacts.push(Artefact::new(
            id,
            kind,
            filename,
            parent,
            encapsulation,
            DepositRecord::new(state),
        ));
        Ok(id)
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Every artefact, in arena order.
    pub fn artefacts(&self) -> &[Artefact] {
        &self.artefacts
    }

    /// Artefact by arena id.
    pub fn artefact(&self, id: ArtefactId) -> Option<&Artefact> {
        self.artefacts.get(id.index()).filter(|a| a.id() == id)
    }

    /// Artefact by filename.
    pub fn artefact_by_filename(&self, filename: &str) -> Option<&Artefact> {
        self.artefacts.iter().find(|a| a.filename() == filename)
    }

    pub(crate) fn artefact_by_filename_mut(&mut self, filename: &str) -> Option<&mut Artefact> {
        self.artefacts.iter_mut().find(|a| a.filename() == filename)
    }

    pub(crate) fn artefacts_mut(&mut self) -> &mut [Artefact] {
        &mut self.artefacts
    }

    /// Encapsulation files, in child order.
    pub fn encapsulations(&self) -> Vec<&Artefact> {
        ordered_indices(&self.artefacts, |a| {
            a.kind() == DepositableKind::EncapsulationFile
        })
        .into_iter()
        .map(|i| &self.artefacts[i])
        .collect()
    }

    /// Members of the encapsulation `id`, in child order.
    pub fn encapsulation_members(&self, id: ArtefactId) -> Vec<&Artefact> {
        ordered_indices(&self.artefacts, |a| a.encapsulation() == Some(id))
            .into_iter()
            .map(|i| &self.artefacts[i])
            .collect()
    }

    /// Mutable view of the encapsulation `id` and its members.
    pub fn encapsulation_mut(&mut self, id: ArtefactId) -> Option<EncapsulationFile<'_>> {
        EncapsulationFile::split(&mut self.artefacts, id)
    }

    // ── Job runner entry point ──────────────────────────────────────

    /// Replace an artefact's state type directly, as an external job does
    /// on completion or failure.
    ///
    /// The target must be later in the artefact's lifecycle or failure-class.
    /// Encapsulation files go through [`EncapsulationFile::set_state`], so
    /// depositing one also deposits its members.
    pub fn set_artefact_state(
        &mut self,
        id: ArtefactId,
        state_type: DepositStateType,
    ) -> Result<Vec<DepositTransition>, DepositError> {
        let parent = self.parent_ref().to_string();
        let artefact = self
            .artefacts
            .get_mut(id.index())
            .filter(|a| a.id() == id)
            .ok_or(DepositError::UnknownArtefact { parent, id })?;
        if artefact.kind() != DepositableKind::EncapsulationFile {
            return Ok(artefact.transition_to(state_type)?.into_iter().collect());
        }
        match EncapsulationFile::split(&mut self.artefacts, id) {
            Some(mut encapsulation) => encapsulation.set_state(state_type),
            None => Ok(Vec::new()),
        }
    }

    // ── Progression ─────────────────────────────────────────────────

    fn progress_children(
        &mut self,
        signals: &dyn StageSignals,
        in_scope: fn(&Artefact) -> bool,
        transitions: &mut Vec<DepositTransition>,
    ) {
        let encapsulation_states: BTreeMap<ArtefactId, DepositState> = self
            .artefacts
            .iter()
            .filter(|a| a.kind() == DepositableKind::EncapsulationFile)
            .map(|a| (a.id(), a.deposit_state().clone()))
            .collect();

        let order = ordered_indices(&self.artefacts, |a| {
            in_scope(a) && a.kind() != DepositableKind::EncapsulationFile
        });
        for i in order {
            let encapsulation = self.artefacts[i]
                .encapsulation()
                .and_then(|id| encapsulation_states.get(&id));
            let ctx = ProgressContext::new(signals).with_encapsulation(encapsulation);
            transitions.extend(self.artefacts[i].progress_deposit(&ctx));
        }
    }

    fn progress_encapsulations(
        &mut self,
        signals: &dyn StageSignals,
        transitions: &mut Vec<DepositTransition>,
    ) {
        let order = ordered_indices(&self.artefacts, |a| {
            a.kind() == DepositableKind::EncapsulationFile
        });
        for i in order {
            let id = self.artefacts[i].id();
            if let Some(mut encapsulation) = EncapsulationFile::split(&mut self.artefacts, id) {
                transitions.extend(encapsulation.progress_deposit(signals));
            }
        }
    }

    fn progress_own(&mut self, signals: &dyn StageSignals) -> Option<DepositTransition> {
        let next = {
            let children = self.artefacts.iter().map(|a| a.deposit_state()).collect();
            let priority = self
                .artefacts
                .iter()
                .filter(|a| a.kind().is_priority())
                .map(|a| a.deposit_state())
                .collect();
            let ctx = ProgressContext::new(signals)
                .with_children(children)
                .with_priority_children(priority);
            self.record.state().progress(&ctx)
        };
        self.apply(next)
    }

    fn apply(&mut self, next: DepositState) -> Option<DepositTransition> {
        let transition = self.record.replace(next)?;
        if transition.from == DepositStateType::Undeposited {
            self.deposit_started = Some(transition.timestamp);
        }
        if transition.to == DepositStateType::Deposited {
            self.deposit_completed = Some(transition.timestamp);
        }
        Some(transition)
    }
}

impl Depositable for Observation {
    fn deposit_record(&self) -> &DepositRecord {
        &self.record
    }

    fn deposit_record_mut(&mut self) -> &mut DepositRecord {
        &mut self.record
    }

    /// Also stamps the deposit start and completion times.
    fn transition_to(
        &mut self,
        state_type: DepositStateType,
    ) -> Result<Option<DepositTransition>, DepositError> {
        let next = self.record.state().advance_to(state_type)?;
        Ok(self.apply(next))
    }
}

impl ParentDepositableArtefact for Observation {
    type Child = Artefact;

    fn children(&self) -> Vec<&Artefact> {
        let mut children: Vec<&Artefact> = self.artefacts.iter().collect();
        sort_children(&mut children);
        children
    }

    fn progress_deposit(&mut self, signals: &dyn StageSignals) -> Vec<DepositTransition> {
        let mut transitions = Vec::new();
        if self.is_failed_deposit() || self.deposit_state().is_terminal() {
            return transitions;
        }

        let in_scope: Option<fn(&Artefact) -> bool> = match self.deposit_state_type() {
            DepositStateType::PriorityDepositing => Some(|a: &Artefact| a.kind().is_priority()),
            DepositStateType::Depositing => Some(|_: &Artefact| true),
            _ => None,
        };

        if let Some(in_scope) = in_scope {
            self.progress_children(signals, in_scope, &mut transitions);
            if self.deposit_state_type() == DepositStateType::Depositing {
                self.progress_encapsulations(signals, &mut transitions);
            }

            if let Some(failed) = self
                .artefacts
                .iter()
                .find(|a| in_scope(a) && a.is_failed_deposit())
            {
                tracing::warn!(
                    sbid = %self.sbid,
                    artefact = %failed.filename(),
                    state = %failed.deposit_state_type(),
                    "child artefact failed, failing observation"
                );
                let next = self.record.state().failed();
                transitions.extend(self.apply(next));
                return transitions;
            }
        }

        transitions.extend(self.progress_own(signals));
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{AutoComplete, SignalBoard};

    fn factory() -> DepositStateFactory {
        DepositStateFactory::standard()
    }

    #[test]
    fn test_new_observation_is_undeposited() {
        let obs = Observation::new(Sbid(1), &factory()).unwrap();
        assert_eq!(obs.deposit_state_type(), DepositStateType::Undeposited);
        assert!(obs.artefacts().is_empty());
        assert!(obs.deposit_started().is_none());
    }

    #[test]
    fn test_duplicate_filename_rejected() {
        let f = factory();
        let mut obs = Observation::new(Sbid(1), &f).unwrap();
        obs.add_artefact(&f, DepositableKind::Catalogue, "cat.xml")
            .unwrap();
        let err = obs
            .add_artefact(&f, DepositableKind::ImageCube, "cat.xml")
            .unwrap_err();
        assert!(matches!(err, DepositError::DuplicateFilename { .. }));
    }

    #[test]
    fn test_top_level_kind_rejected_as_child() {
        let f = factory();
        let mut obs = Observation::new(Sbid(1), &f).unwrap();
        let err = obs
            .add_artefact(&f, DepositableKind::Observation, "obs")
            .unwrap_err();
        assert!(matches!(err, DepositError::NotAChildKind { .. }));
    }

    #[test]
    fn test_encapsulation_must_exist() {
        let f = factory();
        let mut obs = Observation::new(Sbid(1), &f).unwrap();
        let cube = obs
            .add_artefact(&f, DepositableKind::ImageCube, "cube.fits")
            .unwrap();
        let err = obs
            .add_encapsulated_artefact(&f, DepositableKind::Spectrum, "s.fits", cube)
            .unwrap_err();
        assert!(matches!(err, DepositError::UnknownEncapsulation { .. }));

        let encaps = obs
            .add_artefact(&f, DepositableKind::EncapsulationFile, "e.tar")
            .unwrap();
        let err = obs
            .add_encapsulated_artefact(&f, DepositableKind::ImageCube, "c2.fits", encaps)
            .unwrap_err();
        assert!(matches!(err, DepositError::NotEncapsulatable { .. }));
        let spectrum = obs
            .add_encapsulated_artefact(&f, DepositableKind::Spectrum, "s.fits", encaps)
            .unwrap();
        assert_eq!(obs.encapsulation_members(encaps).len(), 1);
        assert_eq!(obs.encapsulation_members(encaps)[0].id(), spectrum);
        assert_eq!(obs.encapsulations().len(), 1);
    }

    #[test]
    fn test_metadata_file_deposits_first() {
        let f = factory();
        let mut obs = Observation::new(Sbid(1), &f).unwrap();
        let meta = obs
            .add_artefact(&f, DepositableKind::ObservationMetadataFile, "observation.xml")
            .unwrap();
        let cat = obs
            .add_artefact(&f, DepositableKind::Catalogue, "cat.xml")
            .unwrap();

        obs.progress_deposit(&AutoComplete);
        assert_eq!(obs.deposit_state_type(), DepositStateType::PriorityDepositing);
        assert!(obs.deposit_started().is_some());

        // metadata: PROCESSING, PROCESSED, DEPOSITING, DEPOSITED
        for _ in 0..4 {
            obs.progress_deposit(&AutoComplete);
            assert_eq!(
                obs.artefact(cat).unwrap().deposit_state_type(),
                DepositStateType::Undeposited
            );
        }
        assert!(obs.artefact(meta).unwrap().is_deposited());
        assert_eq!(obs.deposit_state_type(), DepositStateType::Depositing);
    }

    #[test]
    fn test_waits_for_signals() {
        let f = factory();
        let mut obs = Observation::new(Sbid(2), &f).unwrap();
        let cat = obs
            .add_artefact(&f, DepositableKind::Catalogue, "cat.xml")
            .unwrap();
        let mut board = SignalBoard::default();
        obs.progress_deposit(&board);
        obs.progress_deposit(&board);
        obs.progress_deposit(&board);
        let snapshot = obs.clone();
        for _ in 0..3 {
            assert!(obs.progress_deposit(&board).is_empty());
        }
        assert_eq!(obs, snapshot);

        let owner = obs.artefact(cat).unwrap().owner_ref();
        board.signal(owner, DepositStateType::Processing);
        obs.progress_deposit(&board);
        assert_eq!(
            obs.artefact(cat).unwrap().deposit_state_type(),
            DepositStateType::Processed
        );
    }

    #[test]
    fn test_failed_child_fails_observation() {
        let f = factory();
        let mut obs = Observation::new(Sbid(3), &f).unwrap();
        let cube = obs
            .add_artefact(&f, DepositableKind::ImageCube, "cube.fits")
            .unwrap();
        obs.progress_deposit(&AutoComplete);
        obs.progress_deposit(&AutoComplete);
        assert_eq!(obs.deposit_state_type(), DepositStateType::Depositing);

        obs.set_artefact_state(cube, DepositStateType::Failed).unwrap();
        let transitions = obs.progress_deposit(&AutoComplete);
        assert_eq!(obs.deposit_state_type(), DepositStateType::Failed);
        assert_eq!(obs.checkpoint_state_type(), Some(DepositStateType::Depositing));
        assert_eq!(obs.deposit_failure_count(), 1);
        assert_eq!(transitions.last().map(|t| t.to), Some(DepositStateType::Failed));
        assert_eq!(obs.failed_children().len(), 1);

        // halted
        assert!(obs.progress_deposit(&AutoComplete).is_empty());
    }

    #[test]
    fn test_set_artefact_state_validates() {
        let f = factory();
        let mut obs = Observation::new(Sbid(4), &f).unwrap();
        let cat = obs
            .add_artefact(&f, DepositableKind::Catalogue, "cat.xml")
            .unwrap();
        assert!(matches!(
            obs.set_artefact_state(cat, DepositStateType::Staging),
            Err(DepositError::UnknownStateType { .. })
        ));
        assert!(matches!(
            obs.set_artefact_state(ArtefactId(7), DepositStateType::Processing),
            Err(DepositError::UnknownArtefact { .. })
        ));
    }

    #[test]
    fn test_set_artefact_state_never_regresses() {
        let f = factory();
        let mut obs = Observation::new(Sbid(6), &f).unwrap();
        let cube = obs
            .add_artefact(&f, DepositableKind::ImageCube, "cube.fits")
            .unwrap();
        obs.set_artefact_state(cube, DepositStateType::Deposited)
            .unwrap();
        assert!(matches!(
            obs.set_artefact_state(cube, DepositStateType::Undeposited),
            Err(DepositError::StateRegression { .. })
        ));
        assert!(obs.artefact(cube).unwrap().is_deposited());

        obs.set_artefact_state(cube, DepositStateType::Failed).unwrap();
        assert!(matches!(
            obs.set_artefact_state(cube, DepositStateType::Processing),
            Err(DepositError::StateRegression { .. })
        ));
        assert_eq!(obs.artefact(cube).unwrap().deposit_failure_count(), 1);
    }

    #[test]
    fn test_set_artefact_state_accepts_invalid() {
        let f = factory();
        let mut obs = Observation::new(Sbid(7), &f).unwrap();
        let cat = obs
            .add_artefact(&f, DepositableKind::Catalogue, "cat.xml")
            .unwrap();
        obs.set_artefact_state(cat, DepositStateType::Processing)
            .unwrap();
        let transitions = obs
            .set_artefact_state(cat, DepositStateType::Invalid)
            .unwrap();
        assert_eq!(transitions.len(), 1);
        let cat = obs.artefact(cat).unwrap();
        assert!(cat.is_failed_deposit());
        assert_eq!(cat.checkpoint_state_type(), Some(DepositStateType::Processing));
    }

    #[test]
    fn test_direct_encapsulation_deposit_lets_observation_finish() {
        let f = factory();
        let mut obs = Observation::new(Sbid(8), &f).unwrap();
        let encaps = obs
            .add_artefact(&f, DepositableKind::EncapsulationFile, "e.tar")
            .unwrap();
        let member = obs
            .add_encapsulated_artefact(&f, DepositableKind::Cubelet, "c.fits", encaps)
            .unwrap();
        obs.transition_to(DepositStateType::Depositing).unwrap();

        assert!(matches!(
            obs.set_artefact_state(encaps, DepositStateType::Deposited),
            Err(DepositError::EncapsulationNotReady { .. })
        ));
        obs.set_artefact_state(member, DepositStateType::Encapsulated)
            .unwrap();
        let transitions = obs
            .set_artefact_state(encaps, DepositStateType::Deposited)
            .unwrap();
        assert_eq!(transitions.len(), 2);
        assert!(obs.artefact(member).unwrap().is_deposited());

        // ARCHIVING, NOTIFYING, DEPOSITED
        for _ in 0..3 {
            obs.progress_deposit(&AutoComplete);
        }
        assert!(obs.is_deposited());
    }

    #[test]
    fn test_direct_observation_deposit_stamps_times() {
        let f = factory();
        let mut obs = Observation::new(Sbid(9), &f).unwrap();
        obs.transition_to(DepositStateType::Deposited).unwrap();
        assert!(obs.deposit_started().is_some());
        assert!(obs.deposit_completed().is_some());
    }

    #[test]
    fn test_serde_round_trip() {
        let f = factory();
        let mut obs = Observation::new(Sbid(5), &f).unwrap();
        let encaps = obs
            .add_artefact(&f, DepositableKind::EncapsulationFile, "e.tar")
            .unwrap();
        obs.add_encapsulated_artefact(&f, DepositableKind::Cubelet, "c.fits", encaps)
            .unwrap();
        obs.progress_deposit(&AutoComplete);
        let json = serde_json::to_string_pretty(&obs).unwrap();
        let back: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obs);
    }
}
