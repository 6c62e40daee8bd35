//! Shared types and error definitions for macblock.
//!
//! This crate holds everything the other macblock crates agree on: the error
//! taxonomy, the persisted desired-state record, domain normalization, the
//! canonical on-disk paths, and small parsing utilities.

#![warn(missing_docs)]

pub mod domain;
pub mod duration;
pub mod error;
pub mod paths;
pub mod state;

pub use error::{Error, Result};
pub use state::{DesiredState, ServiceDns, SCHEMA_VERSION};
