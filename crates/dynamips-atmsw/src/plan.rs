//! Dry-run planning
//!
//! Drives an [`AtmSwitch`] through `create` and `apply_config` against a
//! channel that acknowledges every command, and returns the commands a real
//! hypervisor would have received.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use dynamips_common::{
    Device, DeviceManager, DynamipsResult, Hypervisor, HypervisorChannel, HypervisorNio,
    IdentifierPool, NioHandle,
};

use crate::atm_switch::AtmSwitch;
use crate::config::AtmSwitchConfig;

/// Default address reported by the planning hypervisor
pub const DEFAULT_PLAN_ADDRESS: &str = "127.0.0.1:7200";

/// Channel that acknowledges and records every command
#[derive(Debug, Default)]
pub struct RecordingChannel {
    commands: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HypervisorChannel for RecordingChannel {
    async fn send(&self, command: &str) -> DynamipsResult<Vec<String>> {
        debug!(command, "plan: recorded");
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
        Ok(vec!["100-OK".to_string()])
    }
}

/// Manager handing out a single pre-built hypervisor
struct PlanManager {
    pool: IdentifierPool,
    hypervisor: Arc<Hypervisor>,
}

#[async_trait]
impl DeviceManager for PlanManager {
    async fn start_new_hypervisor(&self) -> DynamipsResult<Arc<Hypervisor>> {
        Ok(self.hypervisor.clone())
    }

    fn identifiers(&self) -> &IdentifierPool {
        &self.pool
    }
}

/// Returns the hypervisor commands that build the configured switch.
pub async fn plan(config: &AtmSwitchConfig, address: &str) -> DynamipsResult<Vec<String>> {
    let channel = Arc::new(RecordingChannel::new());
    let hypervisor = Arc::new(Hypervisor::new(address, channel.clone()));
    let manager = Arc::new(PlanManager {
        pool: IdentifierPool::new(),
        hypervisor: hypervisor.clone(),
    });

    let mut switch = AtmSwitch::from_config(config, manager, None)?;
    switch.create().await?;
    switch
        .apply_config(config, |_port, nio| {
            let nio: NioHandle = Arc::new(HypervisorNio::new(nio, hypervisor.clone()));
            Ok(nio)
        })
        .await?;

    let commands = channel.commands();
    info!(
        "ATM switch \"{}\": planned {} commands for {} ports and {} circuits",
        config.name,
        commands.len(),
        config.ports.len(),
        config.mappings.len()
    );
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_plan_sample() {
        let config = AtmSwitchConfig::from_json(
            r#"{
                "name": "SW1",
                "ports": [{ "port": 1, "nio": "nioA" }, { "port": 2, "nio": "nioB" }],
                "mappings": { "1:5:100": "2:7:200", "1:10": "2:20" }
            }"#,
        )
        .unwrap();

        let commands = plan(&config, DEFAULT_PLAN_ADDRESS).await.unwrap();
        assert_eq!(
            commands,
            vec![
                "atmsw create \"SW1\"".to_string(),
                "atmsw create_vpc \"SW1\" nioA 10 nioB 20".to_string(),
                "atmsw create_vcc \"SW1\" nioA 5 100 nioB 7 200".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_without_mappings() {
        let config = AtmSwitchConfig::new("Empty ATM");
        let commands = plan(&config, DEFAULT_PLAN_ADDRESS).await.unwrap();
        assert_eq!(commands, vec!["atmsw create \"Empty ATM\"".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_config() {
        let mut config = AtmSwitchConfig::new("SW1");
        config.mappings.insert(
            crate::types::CircuitKey::vp(1, 1),
            crate::types::CircuitKey::vp(2, 2),
        );
        let err = plan(&config, DEFAULT_PLAN_ADDRESS).await.unwrap_err();
        assert!(err.is_validation());
    }
}
