//! # casda-core: Foundational Types for the Deposit Stack
//!
//! Leaf crate of the workspace. Defines the identifier newtypes and the
//! timestamp type shared by the deposit state machine and its drivers.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `Sbid` (scheduling block id of an
//!    observation) and `CollectionId` (level 7 collection id) are distinct
//!    types. You cannot look up an observation with a collection id.
//!
//! 2. **UTC-only timestamps.** Deposit start/completion dates are stored as
//!    `Timestamp`, always UTC with seconds precision, so completion-date range
//!    queries compare like with like.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `casda-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod temporal;

pub use error::CoreError;
pub use identity::{CollectionId, Sbid};
pub use temporal::Timestamp;
