//! Expansion of a validated specification into a [`Topology`].
//!
//! Derivation is deterministic: switches are expanded in declaration
//! order, ports number from 1 in list order, and every MAC and address
//! follows the policy in [`net`](crate::net). No network access happens
//! here.

use ovnlab_core::{AddressingMode, LabConfig, SwitchConfig, VpcConfig};
use tracing::warn;

use crate::model::{
    DhcpOptions, LogicalRouter, LogicalSwitch, LogicalSwitchPort, PortAddressing,
    RouterAttachment, Topology,
};
use crate::net;

impl Topology {
    /// Derive the complete object graph for a lab.
    ///
    /// Expects a specification that already passed
    /// [`LabConfig::validate_spec`](ovnlab_core::LabConfig::validate_spec);
    /// the few residual inconsistencies (oversized port counts, subnets
    /// with no usable server address) degrade with a warning instead of
    /// failing.
    #[must_use]
    pub fn derive(config: &LabConfig) -> Self {
        let mac_prefix = config.vpc.mac_prefix_normalized();

        let switches: Vec<LogicalSwitch> = config
            .switches
            .iter()
            .map(|spec| derive_switch(&config.vpc, &mac_prefix, spec))
            .collect();

        let router = derive_router(config, &mac_prefix);

        Self {
            vpc: config.vpc.name.clone(),
            switches,
            router,
        }
    }

    /// Look up a derived switch by its namespaced name.
    #[must_use]
    pub fn switch(&self, name: &str) -> Option<&LogicalSwitch> {
        self.switches.iter().find(|sw| sw.name == name)
    }
}

fn derive_switch(vpc: &VpcConfig, mac_prefix: &str, spec: &SwitchConfig) -> LogicalSwitch {
    let name = format!("{}-{}", vpc.name, spec.name);

    let ports = if let Some(list) = &spec.ports {
        explicit_ports(vpc, mac_prefix, spec, &name, list)
    } else {
        autogenerated_ports(vpc, mac_prefix, spec, &name)
    };

    let dhcp_options = if spec.dhcp_enable {
        derive_dhcp_options(vpc, mac_prefix, spec, &name)
    } else {
        None
    };

    LogicalSwitch {
        name,
        short_name: spec.name.clone(),
        subnet: spec.subnet,
        kind: spec.kind,
        dhcp_enable: spec.dhcp_enable,
        routed: spec.routed,
        ports,
        dhcp_options,
    }
}

fn explicit_ports(
    vpc: &VpcConfig,
    mac_prefix: &str,
    spec: &SwitchConfig,
    switch_name: &str,
    list: &[ovnlab_core::PortConfig],
) -> Vec<LogicalSwitchPort> {
    let mut ports = Vec::with_capacity(list.len());

    for (position, port) in list.iter().enumerate() {
        // Index 0 is reserved; user ports number from 1.
        let Ok(index) = u8::try_from(position + 1) else {
            warn!(
                switch = switch_name,
                dropped = list.len() - position,
                "port index space exhausted, dropping remaining explicit ports"
            );
            break;
        };

        let addressing = match port.addressing {
            AddressingMode::Dynamic => PortAddressing::Dynamic,
            AddressingMode::Unknown => PortAddressing::Unknown,
            AddressingMode::Static => match &port.ip {
                Some(ip) => PortAddressing::Static(ip.clone()),
                None => {
                    warn!(
                        switch = switch_name,
                        port = %port.name,
                        "static port without an address, falling back to unknown"
                    );
                    PortAddressing::Unknown
                }
            },
        };

        ports.push(LogicalSwitchPort {
            name: format!("{switch_name}-{}", port.name),
            index,
            mac: net::port_mac(mac_prefix, vpc.id, spec.id, index),
            addressing,
        });
    }

    ports
}

fn autogenerated_ports(
    vpc: &VpcConfig,
    mac_prefix: &str,
    spec: &SwitchConfig,
    switch_name: &str,
) -> Vec<LogicalSwitchPort> {
    let Some(requested) = spec.resolved_port_count(vpc) else {
        warn!(
            switch = switch_name,
            "no port count resolvable, creating no ports"
        );
        return Vec::new();
    };

    let pool = net::usable_hosts(spec.subnet, spec.dhcp_enable);
    let pool_len = u32::try_from(pool.len()).unwrap_or(u32::MAX);
    let effective = requested
        .min(pool_len)
        .min(u32::from(net::MAX_PORT_INDEX));

    if effective < requested {
        warn!(
            switch = switch_name,
            requested,
            effective,
            subnet = %spec.subnet,
            "subnet cannot accommodate the requested port count, clamping"
        );
    }

    let addressing = if spec.dhcp_enable {
        PortAddressing::Dynamic
    } else {
        PortAddressing::Unknown
    };

    (1..=effective)
        .map(|i| {
            // Bounded by MAX_PORT_INDEX above.
            let index = i as u8;
            LogicalSwitchPort {
                name: format!("{switch_name}-lsp{i}"),
                index,
                mac: net::port_mac(mac_prefix, vpc.id, spec.id, index),
                addressing: addressing.clone(),
            }
        })
        .collect()
}

fn derive_dhcp_options(
    vpc: &VpcConfig,
    mac_prefix: &str,
    spec: &SwitchConfig,
    switch_name: &str,
) -> Option<DhcpOptions> {
    let Some(server_id) = net::first_host(spec.subnet) else {
        warn!(
            switch = switch_name,
            subnet = %spec.subnet,
            "subnet has no usable server address, skipping DHCP options"
        );
        return None;
    };

    Some(DhcpOptions {
        cidr: spec.subnet,
        server_id,
        server_mac: net::port_mac(mac_prefix, vpc.id, spec.id, net::GATEWAY_PORT_INDEX),
        router: server_id,
        dns_server: net::DEFAULT_DNS_SERVER,
        lease_time: net::DEFAULT_LEASE_TIME_SECS,
    })
}

fn derive_router(config: &LabConfig, mac_prefix: &str) -> Option<LogicalRouter> {
    if !config.switches.iter().any(|spec| spec.routed) {
        return None;
    }

    let router_name = format!("{}-lr", config.vpc.name);
    let mut attachments = Vec::new();

    for spec in config.switches.iter().filter(|spec| spec.routed) {
        let switch_name = format!("{}-{}", config.vpc.name, spec.name);
        let Some(gateway_cidr) = net::gateway_cidr(spec.subnet) else {
            warn!(
                switch = %switch_name,
                subnet = %spec.subnet,
                "routed switch has no resolvable gateway, skipping attachment"
            );
            continue;
        };

        attachments.push(RouterAttachment {
            switch: spec.name.clone(),
            switch_name: switch_name.clone(),
            router_port: format!("{router_name}-{}", spec.name),
            switch_port: format!("{switch_name}-{router_name}"),
            gateway_cidr,
            // Routed switches always use the reserved index-0 MAC as the
            // gateway MAC, with or without DHCP.
            gateway_mac: net::port_mac(
                mac_prefix,
                config.vpc.id,
                spec.id,
                net::GATEWAY_PORT_INDEX,
            ),
        });
    }

    Some(LogicalRouter {
        name: router_name,
        attachments,
    })
}
