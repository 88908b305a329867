//! Shared data model, wire payloads, and error taxonomy for the mecctl workspace.
//!
//! No I/O lives here: this crate is the vocabulary every other `mecctl-*` crate talks
//! in, kept dependency-light so it can be used from tests without pulling in the bus
//! or the store.

pub mod error;
pub mod message;
pub mod model;

pub use error::{MecError, Result};
