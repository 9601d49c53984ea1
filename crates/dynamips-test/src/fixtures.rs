//! Test fixtures for Dynamips device testing
//!
//! Provides in-memory stand-ins for the collaborators a device talks to:
//! the hypervisor command channel, NIOs and the device manager.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dynamips_common::{
    DeviceManager, DynamipsError, DynamipsResult, FilterDirection, Hypervisor, HypervisorChannel,
    IdentifierPool, Nio,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted rejection: any command starting with `prefix` fails
#[derive(Debug, Clone)]
struct ScriptedFailure {
    prefix: String,
    response: String,
}

/// Hypervisor channel that records every command and acknowledges it,
/// unless a scripted failure or a block matches
#[derive(Debug, Default)]
pub struct FakeChannel {
    sent: Mutex<Vec<String>>,
    failures: Mutex<Vec<ScriptedFailure>>,
    blocked: Mutex<Vec<String>>,
}

impl FakeChannel {
    /// Create a channel that acknowledges everything
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every later command starting with `prefix` with `response`
    pub fn fail_on(&self, prefix: impl Into<String>, response: impl Into<String>) {
        lock(&self.failures).push(ScriptedFailure {
            prefix: prefix.into(),
            response: response.into(),
        });
    }

    /// Remove all scripted failures
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Never answer later commands starting with `prefix`; the send stays
    /// pending until its future is dropped
    pub fn block_on(&self, prefix: impl Into<String>) {
        lock(&self.blocked).push(prefix.into());
    }

    /// Remove all blocks
    pub fn clear_blocks(&self) {
        lock(&self.blocked).clear();
    }

    /// Commands sent so far, in order (rejected ones included)
    pub fn commands(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Number of commands sent so far
    pub fn command_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Forget the recorded commands
    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

#[async_trait]
impl HypervisorChannel for FakeChannel {
    async fn send(&self, command: &str) -> DynamipsResult<Vec<String>> {
        lock(&self.sent).push(command.to_string());

        let blocked = lock(&self.blocked)
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()));
        if blocked {
            std::future::pending::<()>().await;
        }

        let failure = lock(&self.failures)
            .iter()
            .find(|f| command.starts_with(&f.prefix))
            .cloned();
        match failure {
            Some(f) => Err(DynamipsError::protocol(command, f.response)),
            None => Ok(vec!["100-OK".to_string()]),
        }
    }
}

/// Build a hypervisor session over a fake channel
pub fn fake_hypervisor(channel: &Arc<FakeChannel>) -> Arc<Hypervisor> {
    Arc::new(Hypervisor::new("fake:7200", channel.clone()))
}

/// A filter capability call observed on a [`FakeNio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NioCall {
    /// `bind_filter(direction, filter)`
    Bind {
        direction: FilterDirection,
        filter: String,
    },
    /// `setup_filter(direction, args)`
    Setup {
        direction: FilterDirection,
        args: String,
    },
    /// `unbind_filter(direction)`
    Unbind { direction: FilterDirection },
}

#[derive(Debug, Default)]
struct FakeNioState {
    input_filter: Option<String>,
    output_filter: Option<String>,
    calls: Vec<NioCall>,
    fail_bind: bool,
    fail_setup: bool,
    fail_unbind: bool,
}

/// NIO with in-memory filter state and a call log
#[derive(Debug)]
pub struct FakeNio {
    name: String,
    state: Mutex<FakeNioState>,
}

impl FakeNio {
    /// Create a NIO with no filter bound
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(FakeNioState::default()),
        })
    }

    /// Create a NIO that already has a filter bound on its input
    pub fn with_input_filter(name: impl Into<String>, filter: impl Into<String>) -> Arc<Self> {
        let nio = Self::new(name);
        lock(&nio.state).input_filter = Some(filter.into());
        nio
    }

    /// Create a NIO that already has a filter bound on its output
    pub fn with_output_filter(name: impl Into<String>, filter: impl Into<String>) -> Arc<Self> {
        let nio = Self::new(name);
        lock(&nio.state).output_filter = Some(filter.into());
        nio
    }

    /// Make every later `bind_filter` fail
    pub fn fail_bind(&self) {
        lock(&self.state).fail_bind = true;
    }

    /// Make every later `setup_filter` fail
    pub fn fail_setup(&self) {
        lock(&self.state).fail_setup = true;
    }

    /// Make every later `unbind_filter` fail
    pub fn fail_unbind(&self) {
        lock(&self.state).fail_unbind = true;
    }

    /// Filter calls observed so far
    pub fn calls(&self) -> Vec<NioCall> {
        lock(&self.state).calls.clone()
    }

    fn rejection(&self, operation: &str, direction: FilterDirection) -> DynamipsError {
        DynamipsError::protocol(
            format!("nio {} {} {}", operation, self.name, direction.code()),
            "206-unable to apply filter",
        )
    }
}

impl fmt::Display for FakeNio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[async_trait]
impl Nio for FakeNio {
    fn input_filter(&self) -> Option<String> {
        lock(&self.state).input_filter.clone()
    }

    fn output_filter(&self) -> Option<String> {
        lock(&self.state).output_filter.clone()
    }

    async fn bind_filter(&self, direction: FilterDirection, filter_name: &str) -> DynamipsResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(NioCall::Bind {
            direction,
            filter: filter_name.to_string(),
        });
        if state.fail_bind {
            return Err(self.rejection("bind_filter", direction));
        }
        if direction != FilterDirection::Out {
            state.input_filter = Some(filter_name.to_string());
        }
        if direction != FilterDirection::In {
            state.output_filter = Some(filter_name.to_string());
        }
        Ok(())
    }

    async fn setup_filter(&self, direction: FilterDirection, args: &str) -> DynamipsResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(NioCall::Setup {
            direction,
            args: args.to_string(),
        });
        if state.fail_setup {
            return Err(self.rejection("setup_filter", direction));
        }
        Ok(())
    }

    async fn unbind_filter(&self, direction: FilterDirection) -> DynamipsResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(NioCall::Unbind { direction });
        if state.fail_unbind {
            return Err(self.rejection("unbind_filter", direction));
        }
        if direction != FilterDirection::Out {
            state.input_filter = None;
        }
        if direction != FilterDirection::In {
            state.output_filter = None;
        }
        Ok(())
    }
}

/// Device manager whose hypervisors all share one fake channel
pub struct FakeManager {
    pool: IdentifierPool,
    channel: Arc<FakeChannel>,
    started: AtomicUsize,
    unavailable: bool,
}

impl FakeManager {
    /// Create a manager starting hypervisors over `channel`
    pub fn new(channel: Arc<FakeChannel>) -> Arc<Self> {
        Arc::new(Self {
            pool: IdentifierPool::new(),
            channel,
            started: AtomicUsize::new(0),
            unavailable: false,
        })
    }

    /// Create a manager that cannot start any hypervisor
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            pool: IdentifierPool::new(),
            channel: FakeChannel::new(),
            started: AtomicUsize::new(0),
            unavailable: true,
        })
    }

    /// Number of hypervisors started so far
    pub fn hypervisors_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceManager for FakeManager {
    async fn start_new_hypervisor(&self) -> DynamipsResult<Arc<Hypervisor>> {
        if self.unavailable {
            return Err(DynamipsError::HypervisorUnavailable {
                message: "no dynamips executable configured".to_string(),
            });
        }
        let n = self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Hypervisor::new(
            format!("fake:{}", 7200 + n),
            self.channel.clone(),
        )))
    }

    fn identifiers(&self) -> &IdentifierPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_channel_records_and_fails() {
        let channel = FakeChannel::new();
        channel.fail_on("atmsw delete", "200-unknown switch");

        assert!(channel.send("atmsw create \"SW1\"").await.is_ok());
        let err = channel.send("atmsw delete \"SW1\"").await.unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(channel.command_count(), 2);

        channel.clear_failures();
        assert!(channel.send("atmsw delete \"SW1\"").await.is_ok());
    }

    #[tokio::test]
    async fn test_fake_channel_block() {
        let channel = FakeChannel::new();
        channel.block_on("atmsw create_vpc");

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            channel.send("atmsw create_vpc \"SW1\" a 1 b 2"),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(channel.command_count(), 1);

        channel.clear_blocks();
        assert!(channel.send("atmsw create_vpc \"SW1\" a 1 b 2").await.is_ok());
    }

    #[tokio::test]
    async fn test_fake_nio_filter_state() {
        let nio = FakeNio::new("nio0");
        nio.bind_filter(FilterDirection::Both, "capture").await.unwrap();
        assert_eq!(nio.input_filter().as_deref(), Some("capture"));
        assert_eq!(nio.output_filter().as_deref(), Some("capture"));

        nio.unbind_filter(FilterDirection::Both).await.unwrap();
        assert!(!nio.has_filter());
        assert_eq!(nio.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fake_manager_starts_hypervisors() {
        let manager = FakeManager::new(FakeChannel::new());
        let hv = manager.start_new_hypervisor().await.unwrap();
        assert_eq!(hv.address(), "fake:7200");
        assert_eq!(manager.hypervisors_started(), 1);

        let err = FakeManager::unavailable()
            .start_new_hypervisor()
            .await
            .unwrap_err();
        assert!(matches!(err, DynamipsError::HypervisorUnavailable { .. }));
    }
}
