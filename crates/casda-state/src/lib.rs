//! # casda-state: Observation Deposit State Machine
//!
//! Drives every artefact of an observation (catalogues, image cubes,
//! measurement sets, spectra, moment maps, cubelets, thumbnails, evaluation
//! files, encapsulation archives) through its deposit pipeline, and derives
//! the observation's own stage from them.
//!
//! ## Layers
//!
//! - **States** ([`state`]): a single `DepositStateType` tag plus a
//!   predicate class table. States are immutable and replaced wholesale.
//!
//! - **Lifecycles** ([`lifecycle`]): one static step table per kind of
//!   depositable, interpreted by one generic progression routine.
//!
//! - **Factory** ([`factory`]): kind → lifecycle registry. Unknown kinds and
//!   out-of-lifecycle state types fail fast.
//!
//! - **Capabilities** ([`depositable`]): `Depositable`,
//!   `ChildDepositableArtefact`, `ParentDepositableArtefact`, and the
//!   `DepositRecord` that counts failures and records checkpoints.
//!
//! - **Hierarchies**: [`observation`] (with [`encapsulation`] fan-in and
//!   fan-out) and [`collection`] (level 7 collections).
//!
//! - **Ordering** ([`comparator`]): deterministic child order.
//!
//! - **Recovery** ([`recovery`]), **persistence contract**
//!   ([`repository`]) and **status projection** ([`status`]).
//!
//! ## Driving
//!
//! The crate holds no timers or threads. An external scheduler loads an
//! observation, calls `progress_deposit` once per tick with the current
//! readiness [`signals`], and saves it. Each call moves every entity at
//! most one step; a call that moves nothing is a success.
//!
//! ```text
//! let factory = DepositStateFactory::standard();
//! let mut obs = Observation::new(Sbid(1234), &factory)?;
//! let encaps = obs.add_artefact(&factory, DepositableKind::EncapsulationFile, "encaps.tar")?;
//! obs.add_encapsulated_artefact(&factory, DepositableKind::Spectrum, "spec.fits", encaps)?;
//! let transitions = obs.progress_deposit(&AutoComplete);
//! ```

pub mod artefact;
pub mod collection;
pub mod comparator;
pub mod context;
pub mod depositable;
pub mod encapsulation;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod observation;
pub mod recovery;
pub mod repository;
pub mod signals;
pub mod state;
pub mod status;

// Re-export primary types.
pub use artefact::{Artefact, ArtefactId, DepositableKind, OwnerRef, ParentRef};
pub use collection::Level7Collection;
pub use comparator::{compare_children, sort_children};
pub use context::ProgressContext;
pub use depositable::{
    ChildDepositableArtefact, DepositRecord, DepositTransition, Depositable,
    ParentDepositableArtefact,
};
pub use encapsulation::EncapsulationFile;
pub use error::DepositError;
pub use factory::DepositStateFactory;
pub use lifecycle::{Gate, Lifecycle, Step};
pub use observation::Observation;
pub use recovery::{recover_artefact, recover_observation, RecoveryError, RecoveryService};
pub use repository::{InMemoryObservationRepository, ObservationRepository, RepositoryError};
pub use signals::{AutoComplete, SignalBoard, StageSignals};
pub use state::{DepositState, DepositStateType, StateClass};
pub use status::{ArtefactStatus, ObservationStatus};
