//! Hypervisor session and command channel.
//!
//! The Dynamips hypervisor is driven through a text protocol: one command
//! line per request, one acknowledgement (or error) per response. Framing
//! and transport belong to the [`HypervisorChannel`] implementation; this
//! module only deals with command strings.
//!
//! # Example
//!
//! ```ignore
//! use dynamips_common::hypervisor::{quote, Hypervisor};
//!
//! let cmd = format!("atmsw create {}", quote("SW1"));
//! hypervisor.send(&cmd).await?;
//! ```

use async_trait::async_trait;
use dashmap::DashSet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::device::DeviceId;
use crate::error::DynamipsResult;

/// Regex for characters that need escaping inside a quoted hypervisor
/// argument. Matches: `"` and `\`
static QUOTE_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(["\\])"#).expect("Invalid regex pattern"));

/// Quotes a string for use as a hypervisor command argument.
///
/// The string is wrapped in double quotes; embedded `"` and `\` are
/// backslash-escaped so a name can never terminate its argument early.
///
/// # Example
///
/// ```
/// use dynamips_common::hypervisor::quote;
///
/// assert_eq!(quote("SW1"), "\"SW1\"");
/// assert_eq!(quote("my \"sw\""), "\"my \\\"sw\\\"\"");
/// ```
pub fn quote(s: &str) -> String {
    let escaped = QUOTE_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Transport to a hypervisor process.
///
/// Implementations own framing, request/response correlation and
/// timeouts. A response that is not an acknowledgement must be returned as
/// [`DynamipsError::Protocol`](crate::DynamipsError::Protocol).
#[async_trait]
pub trait HypervisorChannel: Send + Sync {
    /// Sends one command and returns the acknowledged response lines.
    async fn send(&self, command: &str) -> DynamipsResult<Vec<String>>;
}

/// A hypervisor session shared by every device it hosts.
///
/// Devices hold an `Arc<Hypervisor>` but never close it; the session also
/// keeps the registry of device ids currently allocated on it.
pub struct Hypervisor {
    /// Human-readable address, for logging.
    address: String,
    /// The command transport.
    channel: Arc<dyn HypervisorChannel>,
    /// Devices created on this hypervisor.
    devices: DashSet<DeviceId>,
}

impl fmt::Debug for Hypervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypervisor")
            .field("address", &self.address)
            .field("device_count", &self.devices.len())
            .finish()
    }
}

impl Hypervisor {
    /// Creates a session over the given channel.
    pub fn new(address: impl Into<String>, channel: Arc<dyn HypervisorChannel>) -> Self {
        Self {
            address: address.into(),
            channel,
            devices: DashSet::new(),
        }
    }

    /// Returns the hypervisor address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends a command and waits for its acknowledgement.
    pub async fn send(&self, command: &str) -> DynamipsResult<Vec<String>> {
        tracing::debug!(hypervisor = %self.address, command = %command, "Sending hypervisor command");

        match self.channel.send(command).await {
            Ok(lines) => {
                tracing::trace!(hypervisor = %self.address, command = %command, "Command acknowledged");
                Ok(lines)
            }
            Err(e) => {
                tracing::warn!(
                    hypervisor = %self.address,
                    command = %command,
                    error = %e,
                    "Command failed"
                );
                Err(e)
            }
        }
    }

    /// Adds a device to the registry. Returns false if it was already there.
    pub fn register_device(&self, id: DeviceId) -> bool {
        self.devices.insert(id)
    }

    /// Removes a device from the registry. Returns false if it was absent.
    pub fn unregister_device(&self, id: DeviceId) -> bool {
        self.devices.remove(&id).is_some()
    }

    /// Returns true if the device is registered on this hypervisor.
    pub fn has_device(&self, id: DeviceId) -> bool {
        self.devices.contains(&id)
    }

    /// Returns the ids of all registered devices.
    pub fn devices(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|id| *id).collect()
    }

    /// Returns the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DynamipsError;
    use std::sync::Mutex;

    struct EchoChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HypervisorChannel for EchoChannel {
        async fn send(&self, command: &str) -> DynamipsResult<Vec<String>> {
            self.sent.lock().unwrap().push(command.to_string());
            if command.starts_with("bad") {
                return Err(DynamipsError::protocol(command, "200-unknown command"));
            }
            Ok(vec!["100-OK".to_string()])
        }
    }

    fn hypervisor() -> (Arc<EchoChannel>, Hypervisor) {
        let channel = Arc::new(EchoChannel {
            sent: Mutex::new(Vec::new()),
        });
        let hv = Hypervisor::new("127.0.0.1:7200", channel.clone());
        (channel, hv)
    }

    #[test]
    fn test_quote_simple() {
        assert_eq!(quote("SW1"), "\"SW1\"");
        assert_eq!(quote("ATM switch 1"), "\"ATM switch 1\"");
    }

    #[test]
    fn test_quote_special_chars() {
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_quote_empty() {
        assert_eq!(quote(""), "\"\"");
    }

    #[tokio::test]
    async fn test_send_forwards_to_channel() {
        let (channel, hv) = hypervisor();
        let lines = hv.send("atmsw create \"SW1\"").await.unwrap();
        assert_eq!(lines, vec!["100-OK".to_string()]);
        assert_eq!(
            *channel.sent.lock().unwrap(),
            vec!["atmsw create \"SW1\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_send_propagates_failure() {
        let (_channel, hv) = hypervisor();
        let err = hv.send("bad command").await.unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_device_registry() {
        let (_channel, hv) = hypervisor();
        let id = DeviceId::new_v4();

        assert!(hv.register_device(id));
        assert!(!hv.register_device(id));
        assert!(hv.has_device(id));
        assert_eq!(hv.devices(), vec![id]);

        assert!(hv.unregister_device(id));
        assert!(!hv.unregister_device(id));
        assert_eq!(hv.device_count(), 0);
    }
}
