//! Configuration file support for the ATM switch
//!
//! A switch is described by a JSON document:
//!
//! ```json
//! {
//!   "name": "SW1",
//!   "ports": [{ "port": 1, "nio": "nio_udp_0" }, { "port": 2, "nio": "nio_udp_1" }],
//!   "mappings": { "1:10": "2:20", "1:5:100": "2:7:200" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use dynamips_common::{DeviceId, DynamipsError, DynamipsResult};

use crate::types::{CircuitKey, PortNumber};

/// A port and the name of the NIO bound to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Port number on the switch
    pub port: PortNumber,

    /// NIO name, as known to the hypervisor
    pub nio: String,
}

/// Complete ATM switch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtmSwitchConfig {
    /// Switch name
    pub name: String,

    /// Node identifier, generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<DeviceId>,

    /// Owning project
    #[serde(default)]
    pub project_id: Uuid,

    /// Ports to allocate
    #[serde(default)]
    pub ports: Vec<PortConfig>,

    /// Source circuit -> destination circuit
    #[serde(default)]
    pub mappings: BTreeMap<CircuitKey, CircuitKey>,
}

impl AtmSwitchConfig {
    /// Create an empty configuration for a named switch
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_id: None,
            project_id: Uuid::nil(),
            ports: Vec::new(),
            mappings: BTreeMap::new(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(content: &str) -> DynamipsResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| DynamipsError::invalid_config("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> DynamipsResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DynamipsError::invalid_config(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_json(&content).map_err(|e| match e {
            DynamipsError::InvalidConfig { field, message } => DynamipsError::InvalidConfig {
                field,
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> DynamipsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DynamipsError::invalid_config("config", e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> DynamipsResult<()> {
        if self.name.trim().is_empty() {
            return Err(DynamipsError::invalid_config(
                "name",
                "switch name must not be empty",
            ));
        }

        let mut ports = BTreeSet::new();
        for port in &self.ports {
            if !ports.insert(port.port) {
                return Err(DynamipsError::invalid_config(
                    "ports",
                    format!("port {} is listed more than once", port.port),
                ));
            }
            if port.nio.trim().is_empty() {
                return Err(DynamipsError::invalid_config(
                    "ports",
                    format!("port {} has an empty NIO name", port.port),
                ));
            }
        }

        for (source, dest) in &self.mappings {
            if !source.same_shape(dest) {
                return Err(DynamipsError::invalid_config(
                    "mappings",
                    format!("{} and {} are not the same circuit type", source, dest),
                ));
            }
            for key in [source, dest] {
                if !ports.contains(&key.port()) {
                    return Err(DynamipsError::invalid_config(
                        "mappings",
                        format!("{} references unconfigured port {}", key, key.port()),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "name": "SW1",
        "ports": [
            { "port": 1, "nio": "nio_udp_0" },
            { "port": 2, "nio": "nio_udp_1" }
        ],
        "mappings": { "1:10": "2:20", "1:5:100": "2:7:200" }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = AtmSwitchConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.name, "SW1");
        assert_eq!(config.node_id, None);
        assert!(config.project_id.is_nil());
        assert_eq!(config.ports.len(), 2);

        let mappings: Vec<_> = config.mappings.into_iter().collect();
        assert_eq!(
            mappings,
            vec![
                (CircuitKey::vp(1, 10), CircuitKey::vp(2, 20)),
                (CircuitKey::vc(1, 5, 100), CircuitKey::vc(2, 7, 200)),
            ]
        );
    }

    #[test]
    fn test_parse_node_id() {
        let json = r#"{ "name": "SW1", "node_id": "67e55044-10b1-426f-9247-bb680e5fe0c8" }"#;
        let config = AtmSwitchConfig::from_json(json).unwrap();
        assert_eq!(
            config.node_id.map(|id| id.to_string()).as_deref(),
            Some("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
    }

    #[test]
    fn test_rejects_mixed_shapes() {
        let json = r#"{
            "name": "SW1",
            "ports": [{ "port": 1, "nio": "a" }, { "port": 2, "nio": "b" }],
            "mappings": { "1:10": "2:20:30" }
        }"#;
        let err = AtmSwitchConfig::from_json(json).unwrap_err();
        assert!(matches!(err, DynamipsError::InvalidConfig { ref field, .. } if field == "mappings"));
    }

    #[test]
    fn test_rejects_unconfigured_port() {
        let json = r#"{
            "name": "SW1",
            "ports": [{ "port": 1, "nio": "a" }],
            "mappings": { "1:10": "3:20" }
        }"#;
        assert!(AtmSwitchConfig::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_duplicate_port_and_empty_name() {
        let json = r#"{
            "name": "SW1",
            "ports": [{ "port": 1, "nio": "a" }, { "port": 1, "nio": "b" }]
        }"#;
        assert!(AtmSwitchConfig::from_json(json).is_err());
        assert!(AtmSwitchConfig::from_json(r#"{ "name": " " }"#).is_err());
    }

    #[test]
    fn test_rejects_malformed_key() {
        let json = r#"{ "name": "SW1", "mappings": { "1": "2" } }"#;
        let err = AtmSwitchConfig::from_json(json).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_to_json_and_back() {
        let config = AtmSwitchConfig::from_json(SAMPLE).unwrap();
        let again = AtmSwitchConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AtmSwitchConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "SW1");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AtmSwitchConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
