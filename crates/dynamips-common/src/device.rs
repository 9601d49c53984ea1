//! Device trait and common abstractions.
//!
//! Every Dynamips-backed device (ATM switch, Frame Relay switch, Ethernet
//! hub...) implements [`Device`]. Devices are constructed by a
//! [`DeviceManager`], which owns the identifier pool and can start new
//! hypervisor sessions on demand.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DeviceContext, DynamipsResult};
use crate::hypervisor::Hypervisor;
use crate::pool::IdentifierPool;

/// Immutable device identifier (the node id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Generates a new random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero identifier.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for DeviceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Base trait for Dynamips devices.
///
/// # Lifecycle
///
/// 1. Construction: the device reserves its id in the manager's pool
/// 2. `create()`: allocates the hypervisor-side object and registers the
///    device with the hypervisor session
/// 3. Mutation: device-specific port and mapping operations
/// 4. `delete()`: deallocates the hypervisor-side object, unregisters the
///    device and releases its id. The device must not be used afterwards.
///
/// All mutating operations take `&mut self`: a device has a single writer.
#[async_trait]
pub trait Device: Send + Sync {
    /// Returns the device type label used in log and error messages.
    fn kind(&self) -> &'static str;

    /// Returns the current device name.
    fn name(&self) -> &str;

    /// Returns the immutable device identifier.
    fn id(&self) -> DeviceId;

    /// Returns the project this device belongs to.
    fn project_id(&self) -> Uuid;

    /// Returns the error context describing this device.
    fn context(&self) -> DeviceContext {
        DeviceContext::new(self.kind(), self.name(), self.id())
    }

    /// Allocates the device on the hypervisor.
    async fn create(&mut self) -> DynamipsResult<()>;

    /// Renames the device on the hypervisor, then locally.
    async fn rename(&mut self, new_name: &str) -> DynamipsResult<()>;

    /// Deallocates the device on the hypervisor.
    async fn delete(&mut self) -> DynamipsResult<()>;
}

/// Owner of the device identifier pool and of hypervisor processes.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    /// Starts a new hypervisor and returns its session.
    async fn start_new_hypervisor(&self) -> DynamipsResult<Arc<Hypervisor>>;

    /// Returns the pool of identifiers currently in use.
    fn identifiers(&self) -> &IdentifierPool;
}
