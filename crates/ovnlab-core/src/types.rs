//! Switch and port addressing enums shared by the configuration model and
//! the derived topology.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a logical switch inside the lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchType {
    /// Regular tenant switch.
    Normal,
    /// Management network switch.
    Mgmt,
    /// Point-to-point link, typically a /31 subnet (RFC 3021).
    P2p,
}

impl SwitchType {
    /// Wire value recorded in the switch's `external_ids`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Mgmt => "mgmt",
            Self::P2p => "p2p",
        }
    }
}

impl fmt::Display for SwitchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a logical switch port obtains its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingMode {
    /// Address assigned by OVN's DHCP implementation.
    Dynamic,
    /// Fixed address supplied in the specification.
    Static,
    /// No address managed by OVN; traffic from unknown addresses allowed.
    Unknown,
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dynamic => "dynamic",
            Self::Static => "static",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_type_wire_values() {
        assert_eq!(
            serde_json::from_str::<SwitchType>("\"normal\"").unwrap(),
            SwitchType::Normal
        );
        assert_eq!(
            serde_json::from_str::<SwitchType>("\"mgmt\"").unwrap(),
            SwitchType::Mgmt
        );
        assert_eq!(
            serde_json::from_str::<SwitchType>("\"p2p\"").unwrap(),
            SwitchType::P2p
        );
        assert!(serde_json::from_str::<SwitchType>("\"bogus\"").is_err());
    }

    #[test]
    fn test_switch_type_display_matches_wire() {
        for kind in [SwitchType::Normal, SwitchType::Mgmt, SwitchType::P2p] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn test_addressing_mode_wire_values() {
        assert_eq!(
            serde_json::from_str::<AddressingMode>("\"dynamic\"").unwrap(),
            AddressingMode::Dynamic
        );
        assert_eq!(
            serde_json::from_str::<AddressingMode>("\"static\"").unwrap(),
            AddressingMode::Static
        );
        assert_eq!(
            serde_json::from_str::<AddressingMode>("\"unknown\"").unwrap(),
            AddressingMode::Unknown
        );
    }

    #[test]
    fn test_addressing_mode_display() {
        assert_eq!(AddressingMode::Dynamic.to_string(), "dynamic");
        assert_eq!(AddressingMode::Static.to_string(), "static");
        assert_eq!(AddressingMode::Unknown.to_string(), "unknown");
    }
}
