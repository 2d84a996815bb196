//! The derived object graph.
//!
//! These types are the output of [`derive`](crate::derive): fully named and
//! addressed logical objects, owned by a single build or destroy invocation
//! and reconstructed from the specification on every run.

use ipnetwork::Ipv4Network;
use ovnlab_core::types::SwitchType;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// How a derived port's address is rendered on the wire.
///
/// The three render rules live here, at the single point where addresses
/// are serialized into control-plane calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortAddressing {
    /// OVN assigns an address from the switch's DHCP range.
    Dynamic,
    /// The specification pinned an address.
    Static(String),
    /// No OVN-managed address.
    Unknown,
}

impl PortAddressing {
    /// Render the `addresses` column for a switch port.
    #[must_use]
    pub fn addresses(&self, mac: &str) -> Vec<String> {
        match self {
            Self::Dynamic => vec![format!("{mac} dynamic")],
            Self::Static(ip) => vec![format!("{mac} {ip}")],
            Self::Unknown => vec!["unknown".to_string()],
        }
    }

    /// Render the port-security allow-list for a switch port.
    ///
    /// Static ports are pinned to their MAC/IP pair; everything else is
    /// restricted to the derived MAC alone.
    #[must_use]
    pub fn port_security(&self, mac: &str) -> Vec<String> {
        match self {
            Self::Static(ip) => vec![format!("{mac} {ip}")],
            Self::Dynamic | Self::Unknown => vec![mac.to_string()],
        }
    }
}

/// A derived logical switch port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSwitchPort {
    /// Namespaced name: `{vpc}-{switch}-{port}`.
    pub name: String,
    /// 1-based index within the switch; index 0 is reserved for the
    /// switch's router/DHCP-server address.
    pub index: u8,
    /// MAC derived from the lab-wide formula.
    pub mac: String,
    /// Addressing variant.
    pub addressing: PortAddressing,
}

/// DHCP parameters attached to a switch when `dhcp_enable` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOptions {
    /// Subnet the options serve.
    pub cidr: Ipv4Network,
    /// DHCP server address (the subnet's first usable host).
    pub server_id: Ipv4Addr,
    /// DHCP server MAC (the switch's index-0 MAC).
    pub server_mac: String,
    /// Default gateway handed to clients.
    pub router: Ipv4Addr,
    /// DNS server handed to clients.
    pub dns_server: Ipv4Addr,
    /// Lease time in seconds.
    pub lease_time: u32,
}

impl DhcpOptions {
    /// Render the options as the string map stored in the control plane.
    #[must_use]
    pub fn to_option_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("server_id".to_string(), self.server_id.to_string()),
            ("server_mac".to_string(), self.server_mac.clone()),
            ("router".to_string(), self.router.to_string()),
            ("dns_server".to_string(), self.dns_server.to_string()),
            ("lease_time".to_string(), self.lease_time.to_string()),
        ])
    }
}

/// A derived logical switch with its ports and optional DHCP record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSwitch {
    /// Namespaced name: `{vpc}-{switch}`.
    pub name: String,
    /// The switch name from the specification, without the VPC prefix.
    pub short_name: String,
    /// Subnet served by this switch.
    pub subnet: Ipv4Network,
    /// Switch role.
    pub kind: SwitchType,
    /// Whether DHCP options are derived for this switch.
    pub dhcp_enable: bool,
    /// Whether this switch attaches to the lab router.
    pub routed: bool,
    /// Ports in derivation order.
    pub ports: Vec<LogicalSwitchPort>,
    /// DHCP record, present only when `dhcp_enable` is set and the subnet
    /// has a usable server address.
    pub dhcp_options: Option<DhcpOptions>,
}

/// One router/switch attachment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAttachment {
    /// Short name of the attached switch.
    pub switch: String,
    /// Namespaced name of the attached switch.
    pub switch_name: String,
    /// Router-side interface name: `{router}-{switch-short}`.
    pub router_port: String,
    /// Switch-side interface name: `{switch}-{router}`.
    pub switch_port: String,
    /// Gateway address with prefix length, e.g. `192.168.1.1/24`.
    pub gateway_cidr: String,
    /// Gateway MAC (the switch's index-0 MAC).
    pub gateway_mac: String,
}

/// The lab router, present iff at least one switch is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRouter {
    /// Namespaced name: `{vpc}-lr`.
    pub name: String,
    /// Attachments in switch declaration order, one per routed switch with
    /// a resolvable gateway.
    pub attachments: Vec<RouterAttachment>,
}

impl LogicalRouter {
    /// Look up the attachment for a switch by its short name.
    #[must_use]
    pub fn attachment_for(&self, switch_short_name: &str) -> Option<&RouterAttachment> {
        self.attachments
            .iter()
            .find(|att| att.switch == switch_short_name)
    }
}

/// The complete derived topology for one lab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// VPC name, the namespace prefix of every object.
    pub vpc: String,
    /// Switches in declaration order.
    pub switches: Vec<LogicalSwitch>,
    /// The lab router, if any switch is routed.
    pub router: Option<LogicalRouter>,
}
