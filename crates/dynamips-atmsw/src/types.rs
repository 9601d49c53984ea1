//! Type definitions for the ATM switch

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use dynamips_common::DynamipsError;

/// Switch port number
pub type PortNumber = u32;

/// Virtual Path Identifier
pub type Vpi = u32;

/// Virtual Channel Identifier
pub type Vci = u32;

/// Default PCAP data link type for captures
pub const DEFAULT_DATA_LINK_TYPE: &str = "DLT_ATM_RFC1483";

/// Key of the virtual-circuit table
///
/// VP and VC keys share one table. Since they are distinct variants, a VC
/// key `(1, 5, 100)` never compares equal to the VP key `(1, 5)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CircuitKey {
    /// Virtual Path: `(port, vpi)`
    Vp { port: PortNumber, vpi: Vpi },
    /// Virtual Channel: `(port, vpi, vci)`
    Vc { port: PortNumber, vpi: Vpi, vci: Vci },
}

impl CircuitKey {
    /// Create a Virtual Path key
    pub fn vp(port: PortNumber, vpi: Vpi) -> Self {
        CircuitKey::Vp { port, vpi }
    }

    /// Create a Virtual Channel key
    pub fn vc(port: PortNumber, vpi: Vpi, vci: Vci) -> Self {
        CircuitKey::Vc { port, vpi, vci }
    }

    /// Port component of the key
    pub fn port(&self) -> PortNumber {
        match self {
            CircuitKey::Vp { port, .. } | CircuitKey::Vc { port, .. } => *port,
        }
    }

    /// VPI component of the key
    pub fn vpi(&self) -> Vpi {
        match self {
            CircuitKey::Vp { vpi, .. } | CircuitKey::Vc { vpi, .. } => *vpi,
        }
    }

    /// VCI component, for VC keys only
    pub fn vci(&self) -> Option<Vci> {
        match self {
            CircuitKey::Vp { .. } => None,
            CircuitKey::Vc { vci, .. } => Some(*vci),
        }
    }

    /// Returns true for Virtual Path keys
    pub fn is_vp(&self) -> bool {
        matches!(self, CircuitKey::Vp { .. })
    }

    /// Returns true if both keys are VP keys or both are VC keys
    pub fn same_shape(&self, other: &CircuitKey) -> bool {
        self.is_vp() == other.is_vp()
    }

    /// Connection label used in logs ("VPC" or "VCC")
    pub fn connection_kind(&self) -> &'static str {
        match self {
            CircuitKey::Vp { .. } => "VPC",
            CircuitKey::Vc { .. } => "VCC",
        }
    }

    /// Human-readable endpoint description
    pub fn describe(&self) -> String {
        match self {
            CircuitKey::Vp { port, vpi } => format!("port {} VPI {}", port, vpi),
            CircuitKey::Vc { port, vpi, vci } => {
                format!("port {} VPI {} VCI {}", port, vpi, vci)
            }
        }
    }
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitKey::Vp { port, vpi } => write!(f, "{}:{}", port, vpi),
            CircuitKey::Vc { port, vpi, vci } => write!(f, "{}:{}:{}", port, vpi, vci),
        }
    }
}

impl FromStr for CircuitKey {
    type Err = DynamipsError;

    /// Parse `port:vpi` or `port:vpi:vci`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(':')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DynamipsError::invalid_config("circuit", format!("'{}': {}", s, e)))?;

        match parts.as_slice() {
            [port, vpi] => Ok(CircuitKey::vp(*port, *vpi)),
            [port, vpi, vci] => Ok(CircuitKey::vc(*port, *vpi, *vci)),
            _ => Err(DynamipsError::invalid_config(
                "circuit",
                format!("'{}': expected port:vpi or port:vpi:vci", s),
            )),
        }
    }
}

impl Serialize for CircuitKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CircuitKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Normalize a PCAP data link type tag
///
/// Lower-cases the tag and strips a leading `dlt_`, so `DLT_ATM_RFC1483`
/// becomes `atm_rfc1483`.
pub fn normalize_data_link_type(data_link_type: &str) -> String {
    let lower = data_link_type.to_lowercase();
    match lower.strip_prefix("dlt_") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vp_and_vc_keys_never_collide() {
        let vp = CircuitKey::vp(1, 5);
        let vc = CircuitKey::vc(1, 5, 100);
        assert_ne!(vp, vc);
        assert!(!vp.same_shape(&vc));
        assert_eq!(vp.port(), vc.port());
        assert_eq!(vp.vpi(), vc.vpi());
    }

    #[test]
    fn test_accessors() {
        let vc = CircuitKey::vc(2, 7, 200);
        assert_eq!(vc.vci(), Some(200));
        assert_eq!(vc.connection_kind(), "VCC");
        assert_eq!(vc.describe(), "port 2 VPI 7 VCI 200");

        let vp = CircuitKey::vp(2, 7);
        assert_eq!(vp.vci(), None);
        assert_eq!(vp.connection_kind(), "VPC");
        assert_eq!(vp.describe(), "port 2 VPI 7");
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(CircuitKey::vp(1, 5).to_string(), "1:5");
        assert_eq!(CircuitKey::vc(1, 5, 100).to_string(), "1:5:100");
        assert_eq!("1:5".parse::<CircuitKey>().unwrap(), CircuitKey::vp(1, 5));
        assert_eq!(
            "1:5:100".parse::<CircuitKey>().unwrap(),
            CircuitKey::vc(1, 5, 100)
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("1".parse::<CircuitKey>().is_err());
        assert!("1:2:3:4".parse::<CircuitKey>().is_err());
        assert!("a:2".parse::<CircuitKey>().is_err());
        assert!("1:-2".parse::<CircuitKey>().is_err());
    }

    #[test]
    fn test_ordering_groups_by_port() {
        let mut keys = vec![
            CircuitKey::vp(2, 1),
            CircuitKey::vp(1, 9),
            CircuitKey::vp(1, 3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![CircuitKey::vp(1, 3), CircuitKey::vp(1, 9), CircuitKey::vp(2, 1)]
        );
    }

    #[test]
    fn test_normalize_data_link_type() {
        assert_eq!(normalize_data_link_type("DLT_ATM_RFC1483"), "atm_rfc1483");
        assert_eq!(normalize_data_link_type("dlt_en10mb"), "en10mb");
        assert_eq!(normalize_data_link_type("ATM_RFC1483"), "atm_rfc1483");
        assert_eq!(normalize_data_link_type("DLT_"), "");
    }
}
