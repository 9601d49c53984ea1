//! Pool of device identifiers currently in use.

use dashmap::DashSet;

use crate::device::DeviceId;

/// Thread-safe set of in-use device identifiers.
///
/// A device reserves its id when constructed and releases it on delete.
/// Reserving an id that is already taken fails instead of silently sharing
/// it between two devices.
#[derive(Debug, Default)]
pub struct IdentifierPool {
    inner: DashSet<DeviceId>,
}

impl IdentifierPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an id as in use. Returns false if it was already reserved.
    pub fn reserve(&self, id: DeviceId) -> bool {
        self.inner.insert(id)
    }

    /// Frees an id. Returns false if it was not reserved.
    pub fn release(&self, id: DeviceId) -> bool {
        self.inner.remove(&id).is_some()
    }

    /// Returns true if the id is in use.
    pub fn contains(&self, id: DeviceId) -> bool {
        self.inner.contains(&id)
    }

    /// Returns the number of ids in use.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no id is in use.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
