//! # Artefacts
//!
//! Child artefacts live in an arena owned by their parent (an observation's
//! `Vec<Artefact>` or a level 7 collection's catalogue list). Relations are
//! plain values, never references:
//!
//! - a child knows its parent by [`ParentRef`] (sbid or collection id),
//! - encapsulation membership is an [`ArtefactId`] into the parent's arena,
//! - a deposit state knows its owner by [`OwnerRef`].
//!
//! Nothing here owns anything it points at, so a hierarchy serializes as a
//! tree and cannot form ownership cycles.

use casda_core::{CollectionId, Sbid};
use serde::{Deserialize, Serialize};

use crate::context::ProgressContext;
use crate::depositable::{ChildDepositableArtefact, DepositRecord, DepositTransition, Depositable};

// ─── Kinds ───────────────────────────────────────────────────────────

/// Every kind of depositable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositableKind {
    /// Top-level observation (scheduling block).
    Observation,
    /// Top-level level 7 collection.
    Level7Collection,
    /// The observation's metadata file; deposited before anything else.
    ObservationMetadataFile,
    /// Source catalogue (VOTable).
    Catalogue,
    /// Image cube.
    ImageCube,
    /// Visibility measurement set.
    MeasurementSet,
    /// Extracted spectrum.
    Spectrum,
    /// Moment map.
    MomentMap,
    /// Cubelet.
    Cubelet,
    /// Preview image.
    Thumbnail,
    /// Quality evaluation file.
    EvaluationFile,
    /// Archive packing many small artefacts.
    EncapsulationFile,
}

impl DepositableKind {
    /// Every kind.
    pub const ALL: [DepositableKind; 12] = [
        Self::Observation,
        Self::Level7Collection,
        Self::ObservationMetadataFile,
        Self::Catalogue,
        Self::ImageCube,
        Self::MeasurementSet,
        Self::Spectrum,
        Self::MomentMap,
        Self::Cubelet,
        Self::Thumbnail,
        Self::EvaluationFile,
        Self::EncapsulationFile,
    ];

    /// Type discriminator used for ordering and display.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Observation => "Observation",
            Self::Level7Collection => "Level7Collection",
            Self::ObservationMetadataFile => "ObservationMetadataFile",
            Self::Catalogue => "Catalogue",
            Self::ImageCube => "ImageCube",
            Self::MeasurementSet => "MeasurementSet",
            Self::Spectrum => "Spectrum",
            Self::MomentMap => "MomentMap",
            Self::Cubelet => "Cubelet",
            Self::Thumbnail => "Thumbnail",
            Self::EvaluationFile => "EvaluationFile",
            Self::EncapsulationFile => "EncapsulationFile",
        }
    }

    /// Whether artefacts of this kind may be packed into an encapsulation.
    pub fn is_encapsulatable(&self) -> bool {
        matches!(
            self,
            Self::Spectrum | Self::MomentMap | Self::Cubelet | Self::Thumbnail | Self::EvaluationFile
        )
    }

    /// Whether this kind can be a child artefact (everything except the top-level parents).
    pub fn is_child(&self) -> bool {
        !matches!(self, Self::Observation | Self::Level7Collection)
    }

    /// Whether this kind is deposited ahead of every other child.
    pub fn is_priority(&self) -> bool {
        matches!(self, Self::ObservationMetadataFile)
    }
}

impl std::fmt::Display for DepositableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

// ─── References ──────────────────────────────────────────────────────

/// Non-owning reference to a top-level parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentRef {
    /// An observation, by scheduling block id.
    Observation(Sbid),
    /// A level 7 collection, by collection id.
    Level7Collection(CollectionId),
}

impl ParentRef {
    /// Ordering key: parent type discriminator, then numeric identity.
    pub fn sort_key(&self) -> (&'static str, u64) {
        match self {
            Self::Observation(sbid) => ("Observation", u64::from(sbid.value())),
            Self::Level7Collection(id) => ("Level7Collection", id.value()),
        }
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observation(sbid) => write!(f, "observation:{}", sbid.value()),
            Self::Level7Collection(id) => write!(f, "level7:{}", id.value()),
        }
    }
}

/// Non-owning reference from a deposit state to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRef {
    /// The observation itself.
    Observation(Sbid),
    /// The level 7 collection itself.
    Level7Collection(CollectionId),
    /// A child artefact, by parent and filename.
    Artefact {
        /// Parent of the artefact, if attached.
        parent: Option<ParentRef>,
        /// Filename, unique within the parent.
        filename: String,
    },
}

impl OwnerRef {
    /// Reference to a child artefact.
    pub fn artefact(parent: Option<ParentRef>, filename: impl Into<String>) -> Self {
        Self::Artefact {
            parent,
            filename: filename.into(),
        }
    }
}

impl From<ParentRef> for OwnerRef {
    fn from(parent: ParentRef) -> Self {
        match parent {
            ParentRef::Observation(sbid) => Self::Observation(sbid),
            ParentRef::Level7Collection(id) => Self::Level7Collection(id),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observation(sbid) => write!(f, "observation:{}", sbid.value()),
            Self::Level7Collection(id) => write!(f, "level7:{}", id.value()),
            Self::Artefact {
                parent: Some(parent),
                filename,
            } => write!(f, "{parent}/{filename}"),
            Self::Artefact {
                parent: None,
                filename,
            } => write!(f, "(detached)/{filename}"),
        }
    }
}

/// Index of an artefact in its parent's arena. Stable for the parent's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtefactId(pub u32);

impl ArtefactId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ArtefactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Artefact ────────────────────────────────────────────────────────

/// A child artefact and its deposit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artefact {
    id: ArtefactId,
    kind: DepositableKind,
    filename: String,
    parent: Option<ParentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encapsulation: Option<ArtefactId>,
    record: DepositRecord,
}

impl Artefact {
    pub(crate) fn new(
        id: ArtefactId,
        kind: DepositableKind,
        filename: String,
        parent: Option<ParentRef>,
        encapsulation: Option<ArtefactId>,
        record: DepositRecord,
    ) -> Self {
        Self {
            id,
            kind,
            filename,
            parent,
            encapsulation,
            record,
        }
    }

    /// Arena id.
    pub fn id(&self) -> ArtefactId {
        self.id
    }

    /// Reference used by this artefact's deposit states.
    pub fn owner_ref(&self) -> OwnerRef {
        OwnerRef::artefact(self.parent, self.filename.clone())
    }

    /// Evaluate one step of this artefact against `ctx` and swap in the result.
    pub(crate) fn progress_deposit(
        &mut self,
        ctx: &ProgressContext<'_>,
    ) -> Option<DepositTransition> {
        let next = self.record.state().progress(ctx);
        self.record.replace(next)
    }
}

impl Depositable for Artefact {
    fn deposit_record(&self) -> &DepositRecord {
        &self.record
    }

    fn deposit_record_mut(&mut self) -> &mut DepositRecord {
        &mut self.record
    }
}

impl ChildDepositableArtefact for Artefact {
    fn kind(&self) -> DepositableKind {
        self.kind
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn parent(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    fn encapsulation(&self) -> Option<ArtefactId> {
        self.encapsulation
    }
}
