//! Network I/O endpoint (NIO) capability.
//!
//! A NIO is one side of a virtual link. Devices only need its string
//! identity (rendered through `Display` into hypervisor commands) and its
//! packet-filter capability, which is used for traffic capture.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::DynamipsResult;
use crate::hypervisor::Hypervisor;

/// Filter name used for packet capture.
pub const CAPTURE_FILTER: &str = "capture";

/// Direction a NIO filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDirection {
    /// Incoming traffic.
    In,
    /// Outgoing traffic.
    Out,
    /// Both directions.
    Both,
}

impl FilterDirection {
    /// Returns the direction keyword used by the hypervisor.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDirection::In => "in",
            FilterDirection::Out => "out",
            FilterDirection::Both => "both",
        }
    }

    /// Returns the numeric direction code of the `nio` hypervisor commands.
    pub fn code(&self) -> u8 {
        match self {
            FilterDirection::In => 0,
            FilterDirection::Out => 1,
            FilterDirection::Both => 2,
        }
    }
}

impl fmt::Display for FilterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract of a NIO as seen by a device.
///
/// Filter operations take `&self`: a NIO handle is shared between the
/// device and whoever created it, so implementations keep their filter
/// state behind interior mutability.
#[async_trait]
pub trait Nio: fmt::Display + fmt::Debug + Send + Sync {
    /// Name of the filter bound on the input direction, if any.
    fn input_filter(&self) -> Option<String>;

    /// Name of the filter bound on the output direction, if any.
    fn output_filter(&self) -> Option<String>;

    /// Returns true if a filter is bound on either direction.
    fn has_filter(&self) -> bool {
        self.input_filter().is_some() || self.output_filter().is_some()
    }

    /// Binds a named filter.
    async fn bind_filter(&self, direction: FilterDirection, filter_name: &str) -> DynamipsResult<()>;

    /// Passes setup arguments to the bound filter.
    async fn setup_filter(&self, direction: FilterDirection, args: &str) -> DynamipsResult<()>;

    /// Unbinds the filter. Unbinding when nothing is bound succeeds.
    async fn unbind_filter(&self, direction: FilterDirection) -> DynamipsResult<()>;
}

/// Shared handle to a NIO.
pub type NioHandle = Arc<dyn Nio>;

#[derive(Debug, Default)]
struct FilterState {
    input: Option<String>,
    output: Option<String>,
    input_options: Option<String>,
    output_options: Option<String>,
}

/// A NIO already allocated on a hypervisor, addressed by name.
///
/// Filter operations are sent as `nio bind_filter`, `nio setup_filter` and
/// `nio unbind_filter` commands; the local filter state changes only after
/// the hypervisor acknowledged the command.
pub struct HypervisorNio {
    name: String,
    hypervisor: Arc<Hypervisor>,
    filters: Mutex<FilterState>,
}

impl fmt::Debug for HypervisorNio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypervisorNio")
            .field("name", &self.name)
            .field("hypervisor", &self.hypervisor.address())
            .finish()
    }
}

impl fmt::Display for HypervisorNio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl HypervisorNio {
    /// Wraps the NIO named `name` on `hypervisor`.
    pub fn new(name: impl Into<String>, hypervisor: Arc<Hypervisor>) -> Self {
        Self {
            name: name.into(),
            hypervisor,
            filters: Mutex::new(FilterState::default()),
        }
    }

    /// Returns the NIO name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the setup arguments of the input filter, if any.
    pub fn input_filter_options(&self) -> Option<String> {
        self.state().input_options.clone()
    }

    /// Returns the setup arguments of the output filter, if any.
    pub fn output_filter_options(&self) -> Option<String> {
        self.state().output_options.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FilterState> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Nio for HypervisorNio {
    fn input_filter(&self) -> Option<String> {
        self.state().input.clone()
    }

    fn output_filter(&self) -> Option<String> {
        self.state().output.clone()
    }

    async fn bind_filter(&self, direction: FilterDirection, filter_name: &str) -> DynamipsResult<()> {
        let cmd = format!(
            "nio bind_filter {} {} {}",
            self.name,
            direction.code(),
            filter_name
        );
        self.hypervisor.send(&cmd).await?;

        let mut state = self.state();
        if direction != FilterDirection::Out {
            state.input = Some(filter_name.to_string());
        }
        if direction != FilterDirection::In {
            state.output = Some(filter_name.to_string());
        }
        Ok(())
    }

    async fn setup_filter(&self, direction: FilterDirection, args: &str) -> DynamipsResult<()> {
        let cmd = format!("nio setup_filter {} {} {}", self.name, direction.code(), args);
        self.hypervisor.send(&cmd).await?;

        let mut state = self.state();
        if direction != FilterDirection::Out {
            state.input_options = Some(args.to_string());
        }
        if direction != FilterDirection::In {
            state.output_options = Some(args.to_string());
        }
        Ok(())
    }

    async fn unbind_filter(&self, direction: FilterDirection) -> DynamipsResult<()> {
        let cmd = format!("nio unbind_filter {} {}", self.name, direction.code());
        self.hypervisor.send(&cmd).await?;

        let mut state = self.state();
        if direction != FilterDirection::Out {
            state.input = None;
            state.input_options = None;
        }
        if direction != FilterDirection::In {
            state.output = None;
            state.output_options = None;
        }
        Ok(())
    }
}
