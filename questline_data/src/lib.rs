//! Shared data model for questline content.

pub mod defs;
pub mod validate;

pub use defs::*;
pub use validate::{ValidationError, validate_quest};
