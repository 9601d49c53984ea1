//! Common infrastructure for Dynamips-backed emulated devices.
//!
//! This crate provides what every device driven by a Dynamips hypervisor
//! needs, independently of the device type:
//!
//! - [`hypervisor`]: The shared hypervisor session, its command channel
//!   trait and argument quoting
//! - [`Device`]: Base trait for devices (name, id, project, lifecycle)
//! - [`DeviceManager`]: Starts hypervisors and owns the identifier pool
//! - [`nio`]: The NIO capability devices bind their ports to
//! - [`error`]: Error types for device operations
//!
//! # Architecture
//!
//! Devices follow this pattern:
//!
//! 1. Validate the request against local state
//! 2. Send one or more commands to the hypervisor, awaiting each
//!    acknowledgement in order
//! 3. Update local state only after every command was acknowledged

pub mod device;
pub mod error;
pub mod hypervisor;
pub mod nio;
pub mod pool;

// Re-export commonly used items at crate root
pub use device::{Device, DeviceId, DeviceManager};
pub use error::{DeviceContext, DynamipsError, DynamipsResult};
pub use hypervisor::{quote, Hypervisor, HypervisorChannel};
pub use nio::{FilterDirection, HypervisorNio, Nio, NioHandle, CAPTURE_FILTER};
pub use pool::IdentifierPool;
