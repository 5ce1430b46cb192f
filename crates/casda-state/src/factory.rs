//! # Deposit State Factory
//!
//! Central registry mapping each depositable kind to its lifecycle table.
//! Asking for a kind that is not registered, or for a state type outside
//! the kind's lifecycle, is a configuration error. Nothing is defaulted
//! silently.

use std::collections::BTreeMap;

use crate::artefact::{DepositableKind, OwnerRef};
use crate::error::DepositError;
use crate::lifecycle::Lifecycle;
use crate::state::{DepositState, DepositStateType};

/// Kind → lifecycle registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositStateFactory {
    lifecycles: BTreeMap<DepositableKind, Lifecycle>,
}

impl DepositStateFactory {
    /// A factory with nothing registered.
    pub fn empty() -> Self {
        Self {
            lifecycles: BTreeMap::new(),
        }
    }

    /// The standard kind → lifecycle mapping.
    pub fn standard() -> Self {
        use DepositableKind as K;
        let mut factory = Self::empty();
        factory
            .register(K::Observation, Lifecycle::Observation)
            .register(K::Level7Collection, Lifecycle::Level7Collection)
            .register(K::ObservationMetadataFile, Lifecycle::Standard)
            .register(K::Catalogue, Lifecycle::Standard)
            .register(K::Thumbnail, Lifecycle::Standard)
            .register(K::EvaluationFile, Lifecycle::Standard)
            .register(K::ImageCube, Lifecycle::Archived)
            .register(K::MeasurementSet, Lifecycle::Archived)
            .register(K::Spectrum, Lifecycle::Archived)
            .register(K::MomentMap, Lifecycle::Archived)
            .register(K::Cubelet, Lifecycle::Archived)
            .register(K::EncapsulationFile, Lifecycle::Encapsulation);
        factory
    }

    /// Register (or replace) the lifecycle used by `kind`.
    pub fn register(&mut self, kind: DepositableKind, lifecycle: Lifecycle) -> &mut Self {
        self.lifecycles.insert(kind, lifecycle);
        self
    }

    /// Lifecycle for `kind`. Encapsulation-bound artefacts use the
    /// encapsulated lifecycle regardless of their registered one.
    pub fn lifecycle_for(
        &self,
        kind: DepositableKind,
        encapsulated: bool,
    ) -> Result<Lifecycle, DepositError> {
        if encapsulated {
            if !kind.is_encapsulatable() {
                return Err(DepositError::NotEncapsulatable { kind });
            }
            return Ok(Lifecycle::Encapsulated);
        }
        self.lifecycles
            .get(&kind)
            .copied()
            .ok_or(DepositError::UnregisteredKind { kind })
    }

    /// Build the `state_type` state for an owner of the given kind.
    pub fn create_state(
        &self,
        kind: DepositableKind,
        encapsulated: bool,
        state_type: DepositStateType,
        owner: OwnerRef,
    ) -> Result<DepositState, DepositError> {
        let lifecycle = self.lifecycle_for(kind, encapsulated)?;
        DepositState::bind(state_type, lifecycle, owner)
    }

    /// Build the initial state for an owner of the given kind.
    pub fn initial_state(
        &self,
        kind: DepositableKind,
        encapsulated: bool,
        owner: OwnerRef,
    ) -> Result<DepositState, DepositError> {
        let lifecycle = self.lifecycle_for(kind, encapsulated)?;
        DepositState::bind(lifecycle.initial(), lifecycle, owner)
    }

    /// Build a state from its persisted name.
    pub fn create_state_by_name(
        &self,
        kind: DepositableKind,
        encapsulated: bool,
        name: &str,
        owner: OwnerRef,
    ) -> Result<DepositState, DepositError> {
        let state_type: DepositStateType = name.parse()?;
        self.create_state(kind, encapsulated, state_type, owner)
    }
}

impl Default for DepositStateFactory {
    fn default() -> Self {
        Self::standard()
    }
}
