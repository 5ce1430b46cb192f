//! # Identifier Newtypes
//!
//! Observations are keyed by their scheduling block id (SBID); level 7
//! collections by the collection id issued by the data access portal.
//! Both are positive integers, but they live in separate namespaces and
//! are kept apart at the type level.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Scheduling block identifier of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sbid(pub u32);

/// Identifier of a level 7 (derived data) collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u64);

impl Sbid {
    /// Validate and wrap a scheduling block id. Zero is reserved.
    pub fn new(value: u32) -> Result<Self, CoreError> {
        if value == 0 {
            return Err(CoreError::InvalidIdentifier(
                "sbid must be a positive integer".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The raw numeric value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl CollectionId {
    /// Validate and wrap a collection id. Zero is reserved.
    pub fn new(value: u64) -> Result<Self, CoreError> {
        if value == 0 {
            return Err(CoreError::InvalidIdentifier(
                "collection id must be a positive integer".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for Sbid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|e| CoreError::InvalidIdentifier(format!("sbid {s:?}: {e}")))?;
        Self::new(value)
    }
}

impl FromStr for CollectionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|e| CoreError::InvalidIdentifier(format!("collection id {s:?}: {e}")))?;
        Self::new(value)
    }
}

impl std::fmt::Display for Sbid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sbid:{}", self.0)
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "collection:{}", self.0)
    }
}
