//! dynamips-atmsw - Dynamips virtual ATM switch
//!
//! Keeps the port and virtual-circuit tables of an emulated ATM switch and
//! translates every change into `atmsw` hypervisor commands. Local tables
//! change only after the hypervisor acknowledged the command.

mod atm_switch;
mod commands;
mod config;
mod plan;
mod types;

pub use atm_switch::{AtmSwitch, ATM_SWITCH_KIND};
pub use commands::*;
pub use config::{AtmSwitchConfig, PortConfig};
pub use plan::{plan, RecordingChannel, DEFAULT_PLAN_ADDRESS};
pub use types::*;
