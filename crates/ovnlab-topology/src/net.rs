//! Addressing policy.
//!
//! Every naming and numbering convention lives here as a named constant or
//! policy function so the rest of the workspace never hard-codes an octet
//! or an offset.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Port index reserved on every switch for the router gateway / DHCP
/// server address. User ports number from 1.
pub const GATEWAY_PORT_INDEX: u8 = 0;

/// Host addresses reserved at the start of a DHCP-enabled subnet's pool.
pub const DHCP_RESERVED_HOSTS: usize = 4;

/// DNS server handed out when a subnet enables DHCP.
pub const DEFAULT_DNS_SERVER: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

/// DHCP lease time in seconds.
pub const DEFAULT_LEASE_TIME_SECS: u32 = 3600;

/// Highest assignable port index; the MAC formula encodes the index as a
/// single octet.
pub const MAX_PORT_INDEX: u8 = u8::MAX;

/// Derive the MAC address for a port.
///
/// Format: `{prefix}:{vpc_id:02x}:{switch_id:02x}:{index:02x}`. The prefix
/// is expected to be lowercase-normalized already.
#[must_use]
pub fn port_mac(mac_prefix: &str, vpc_id: u8, switch_id: u8, index: u8) -> String {
    format!("{mac_prefix}:{vpc_id:02x}:{switch_id:02x}:{index:02x}")
}

/// First usable host address of a subnet.
///
/// For a /31 the network address itself is usable (RFC 3021); a /32 has
/// exactly its own address. Returns `None` only when the subnet yields no
/// usable host at all.
#[must_use]
pub fn first_host(subnet: Ipv4Network) -> Option<Ipv4Addr> {
    match subnet.prefix() {
        31 | 32 => Some(subnet.network()),
        _ => subnet.nth(1),
    }
}

/// First usable host expressed with the subnet's prefix length, as used
/// for router-port network configuration.
#[must_use]
pub fn gateway_cidr(subnet: Ipv4Network) -> Option<String> {
    first_host(subnet).map(|ip| format!("{ip}/{}", subnet.prefix()))
}

/// Usable host pool for autogenerated ports.
///
/// A /31 offers both of its addresses; any other subnet offers everything
/// except the network and broadcast addresses. When DHCP is enabled and
/// the pool holds more than [`DHCP_RESERVED_HOSTS`] entries, the first
/// four are held back for DHCP infrastructure.
#[must_use]
pub fn usable_hosts(subnet: Ipv4Network, dhcp_enabled: bool) -> Vec<Ipv4Addr> {
    let hosts: Vec<Ipv4Addr> = match subnet.prefix() {
        31 => subnet.iter().collect(),
        32 => vec![subnet.network()],
        _ => {
            let size = subnet.size() as usize;
            subnet.iter().skip(1).take(size.saturating_sub(2)).collect()
        }
    };

    if dhcp_enabled && subnet.prefix() < 31 && hosts.len() > DHCP_RESERVED_HOSTS {
        hosts[DHCP_RESERVED_HOSTS..].to_vec()
    } else {
        hosts
    }
}
