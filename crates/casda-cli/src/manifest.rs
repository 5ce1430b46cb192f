//! # Observation Manifests
//!
//! YAML description of an observation's artefacts, as produced by the
//! ingest pipeline:
//!
//! ```yaml
//! sbid: 12345
//! artefacts:
//!   - kind: observation_metadata_file
//!     filename: observation.xml
//!   - kind: encapsulation_file
//!     filename: encaps-1.tar
//!   - kind: spectrum
//!     filename: spectrum-1.fits
//!     encapsulation: encaps-1.tar
//! ```
//!
//! Encapsulation files are created first so members may reference them by
//! filename regardless of their position in the list.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use casda_core::Sbid;
use casda_state::{DepositStateFactory, DepositableKind, Observation};

/// One artefact entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtefactEntry {
    /// Artefact kind.
    pub kind: DepositableKind,
    /// Filename, unique within the observation.
    pub filename: String,
    /// Filename of the encapsulation file this artefact is packed into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encapsulation: Option<String>,
}

/// An observation and its artefacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationManifest {
    /// Scheduling block id.
    pub sbid: u32,
    /// Artefacts.
    #[serde(default)]
    pub artefacts: Vec<ArtefactEntry>,
}

impl ObservationManifest {
    /// Parse a YAML manifest.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("invalid observation manifest")
    }

    /// Read a YAML manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Build a fresh UNDEPOSITED observation.
    pub fn build(&self, factory: &DepositStateFactory) -> Result<Observation> {
        let sbid = Sbid::new(self.sbid).context("invalid sbid in manifest")?;
        let mut obs = Observation::new(sbid, factory)?;

        let (encapsulations, others): (Vec<_>, Vec<_>) = self
            .artefacts
            .iter()
            .partition(|e| e.kind == DepositableKind::EncapsulationFile);

        for entry in encapsulations {
            if entry.encapsulation.is_some() {
                bail!(
                    "encapsulation file {:?} cannot itself be encapsulated",
                    entry.filename
                );
            }
            obs.add_artefact(factory, entry.kind, entry.filename.as_str())
                .with_context(|| format!("artefact {:?}", entry.filename))?;
        }

        for entry in others {
            match &entry.encapsulation {
                None => obs.add_artefact(factory, entry.kind, entry.filename.as_str()),
                Some(encaps) => {
                    let Some(id) = obs.artefact_by_filename(encaps).map(|a| a.id()) else {
                        bail!(
                            "artefact {:?} references unknown encapsulation {encaps:?}",
                            entry.filename
                        );
                    };
                    obs.add_encapsulated_artefact(factory, entry.kind, entry.filename.as_str(), id)
                }
            }
            .with_context(|| format!("artefact {:?}", entry.filename))?;
        }

        tracing::debug!(
            sbid = %sbid,
            artefacts = obs.artefacts().len(),
            "built observation from manifest"
        );
        Ok(obs)
    }
}
