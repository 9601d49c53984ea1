//! Error types for Dynamips device operations.
//!
//! Every variant that concerns a device carries a [`DeviceContext`] so the
//! rendered message names the device type, name and id, followed by the
//! port or circuit involved. All errors implement `std::error::Error` via
//! `thiserror`.

use std::fmt;
use thiserror::Error;

use crate::device::DeviceId;

/// Result type alias for device operations.
pub type DynamipsResult<T> = Result<T, DynamipsError>;

/// Identifies the device an error belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    /// Device type label (e.g. "ATM switch").
    pub kind: &'static str,
    /// Device name at the time of the error.
    pub name: String,
    /// Device identifier.
    pub id: DeviceId,
}

impl DeviceContext {
    pub fn new(kind: &'static str, name: impl Into<String>, id: DeviceId) -> Self {
        Self {
            kind,
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" [{}]", self.kind, self.name, self.id)
    }
}

/// Errors that can occur while driving a Dynamips device.
#[derive(Debug, Error)]
pub enum DynamipsError {
    /// A NIO is already bound to the port.
    #[error("{device}: port {port} isn't free")]
    PortConflict {
        /// Device that owns the port.
        device: DeviceContext,
        /// The occupied port number.
        port: u32,
    },

    /// No NIO is bound to the port.
    #[error("{device}: port {port} is not allocated")]
    PortNotAllocated {
        /// Device that was asked about the port.
        device: DeviceContext,
        /// The unallocated port number.
        port: u32,
    },

    /// The circuit source key is not present in the mapping table.
    #[error("{device}: circuit {circuit} is not mapped")]
    CircuitNotMapped {
        /// Device that owns the mapping table.
        device: DeviceContext,
        /// Rendered source circuit key.
        circuit: String,
    },

    /// The port's NIO already has an input or output filter bound.
    #[error("{device}: port {port} has already a filter applied")]
    FilterAlreadyApplied {
        /// Device that owns the port.
        device: DeviceContext,
        /// The port number.
        port: u32,
    },

    /// The hypervisor rejected or failed to acknowledge a command.
    #[error("Hypervisor command failed: '{command}': {response}")]
    Protocol {
        /// The command that was sent.
        command: String,
        /// Raw response (or transport failure description).
        response: String,
    },

    /// No hypervisor session could be obtained.
    #[error("Hypervisor unavailable: {message}")]
    HypervisorUnavailable {
        /// Error message.
        message: String,
    },

    /// The device has no hypervisor session yet.
    #[error("{device}: device has not been created")]
    NotCreated {
        /// The device.
        device: DeviceContext,
    },

    /// The device has already been deleted.
    #[error("{device}: device has been deleted")]
    DeviceDeleted {
        /// The device.
        device: DeviceContext,
    },

    /// A hypervisor or NIO command issued on behalf of a device failed.
    #[error("{device}: {source}")]
    DeviceCommand {
        /// Device the command was issued for.
        device: DeviceContext,
        /// Underlying failure.
        source: Box<DynamipsError>,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },
}

impl DynamipsError {
    /// Creates a port conflict error.
    pub fn port_conflict(device: DeviceContext, port: u32) -> Self {
        Self::PortConflict { device, port }
    }

    /// Creates a port not allocated error.
    pub fn port_not_allocated(device: DeviceContext, port: u32) -> Self {
        Self::PortNotAllocated { device, port }
    }

    /// Creates a circuit not mapped error.
    pub fn circuit_not_mapped(device: DeviceContext, circuit: impl fmt::Display) -> Self {
        Self::CircuitNotMapped {
            device,
            circuit: circuit.to_string(),
        }
    }

    /// Creates a filter already applied error.
    pub fn filter_already_applied(device: DeviceContext, port: u32) -> Self {
        Self::FilterAlreadyApplied { device, port }
    }

    /// Creates a protocol error.
    pub fn protocol(command: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Protocol {
            command: command.into(),
            response: response.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attaches the device context to a command failure.
    ///
    /// Errors that already name their device are returned unchanged.
    pub fn for_device(device: DeviceContext, err: DynamipsError) -> Self {
        match err {
            DynamipsError::Protocol { .. } | DynamipsError::HypervisorUnavailable { .. } => {
                Self::DeviceCommand {
                    device,
                    source: Box::new(err),
                }
            }
            other => other,
        }
    }

    /// Returns the device an error belongs to, if any.
    pub fn device(&self) -> Option<&DeviceContext> {
        match self {
            DynamipsError::PortConflict { device, .. }
            | DynamipsError::PortNotAllocated { device, .. }
            | DynamipsError::CircuitNotMapped { device, .. }
            | DynamipsError::FilterAlreadyApplied { device, .. }
            | DynamipsError::NotCreated { device }
            | DynamipsError::DeviceDeleted { device }
            | DynamipsError::DeviceCommand { device, .. } => Some(device),
            _ => None,
        }
    }

    /// Returns true if the error came from the hypervisor command channel.
    pub fn is_protocol(&self) -> bool {
        match self {
            DynamipsError::Protocol { .. } => true,
            DynamipsError::DeviceCommand { source, .. } => source.is_protocol(),
            _ => false,
        }
    }

    /// Returns true if the error was raised by local validation, before
    /// anything was sent to the hypervisor.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DynamipsError::PortConflict { .. }
                | DynamipsError::PortNotAllocated { .. }
                | DynamipsError::CircuitNotMapped { .. }
                | DynamipsError::FilterAlreadyApplied { .. }
                | DynamipsError::NotCreated { .. }
                | DynamipsError::DeviceDeleted { .. }
                | DynamipsError::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DeviceContext {
        DeviceContext::new("ATM switch", "SW1", DeviceId::nil())
    }

    #[test]
    fn test_port_not_allocated_display() {
        let err = DynamipsError::port_not_allocated(ctx(), 3);
        assert_eq!(
            err.to_string(),
            "ATM switch \"SW1\" [00000000-0000-0000-0000-000000000000]: port 3 is not allocated"
        );
    }

    #[test]
    fn test_circuit_not_mapped_display() {
        let err = DynamipsError::circuit_not_mapped(ctx(), "1:5:100");
        assert!(err.to_string().contains("SW1"));
        assert!(err.to_string().contains("circuit 1:5:100 is not mapped"));
    }

    #[test]
    fn test_protocol_error() {
        let err = DynamipsError::protocol("atmsw create \"SW1\"", "209-Duplicate name");
        assert!(err.to_string().contains("atmsw create"));
        assert!(err.to_string().contains("209-Duplicate name"));
        assert!(err.is_protocol());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_for_device_wraps_command_failures() {
        let err = DynamipsError::for_device(
            ctx(),
            DynamipsError::protocol("atmsw create_vpc \"SW1\"", "209-unable to create VPC"),
        );
        assert!(err.is_protocol());
        assert!(!err.is_validation());
        assert_eq!(err.device(), Some(&ctx()));
        assert_eq!(
            err.to_string(),
            "ATM switch \"SW1\" [00000000-0000-0000-0000-000000000000]: \
             Hypervisor command failed: 'atmsw create_vpc \"SW1\"': 209-unable to create VPC"
        );
    }

    #[test]
    fn test_for_device_keeps_device_errors() {
        let err = DynamipsError::for_device(ctx(), DynamipsError::port_conflict(ctx(), 2));
        assert!(matches!(err, DynamipsError::PortConflict { port: 2, .. }));
        assert!(DynamipsError::protocol("x", "y").device().is_none());
    }

    #[test]
    fn test_classification() {
        assert!(DynamipsError::port_conflict(ctx(), 1).is_validation());
        assert!(DynamipsError::filter_already_applied(ctx(), 1).is_validation());
        assert!(!DynamipsError::invalid_config("mappings", "bad").is_protocol());
        assert!(DynamipsError::invalid_config("mappings", "bad").is_validation());
    }
}
