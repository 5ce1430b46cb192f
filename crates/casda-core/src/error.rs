//! # Core Error Type
//!
//! Errors raised while constructing core primitives. Domain crates wrap
//! these in their own `thiserror` enums.

use thiserror::Error;

/// Error constructing a core primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A timestamp could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
