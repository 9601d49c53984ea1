//! Test infrastructure for Dynamips device crates
//!
//! Provides:
//! - A recording hypervisor channel with scripted failures
//! - Fake NIOs with observable filter state
//! - A fake device manager
//! - Command log verification helpers

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
