//! Idempotent build and destroy walks.
//!
//! The reconciler compares a derived [`Topology`] against what the
//! northbound database already holds and issues only the missing (or, on
//! destroy, only the present) changes. Every object travels in its own
//! transaction, so a failure mid-walk leaves prior objects committed and
//! the run safely restartable. Existence checks happen outside the
//! transaction; a commit failure is fatal and surfaces to the caller.

use crate::northbound::{NbOp, Northbound, StringMap, Transaction};
use ovnlab_core::Result;
use ovnlab_topology::model::{DhcpOptions, LogicalSwitch, LogicalSwitchPort, RouterAttachment};
use ovnlab_topology::{net, Topology};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// `external_ids` key marking rows created by this tool.
pub const OWNER_KEY: &str = "ovn-lab-builder";

fn owner_tags() -> StringMap {
    BTreeMap::from([(OWNER_KEY.to_string(), "true".to_string())])
}

/// Reconciles derived topologies against the northbound database.
pub struct LabReconciler<N> {
    nb: N,
}

impl<N: Northbound> LabReconciler<N> {
    /// Wrap a northbound client.
    pub fn new(nb: N) -> Self {
        Self { nb }
    }

    /// Create every object the topology calls for that does not already
    /// exist.
    ///
    /// Safe to re-run: objects already present are skipped with a debug
    /// log and no transaction is committed for them.
    ///
    /// # Errors
    ///
    /// Propagates the first connection or commit failure; objects created
    /// before the failure remain in place.
    pub async fn build(&self, topology: &Topology) -> Result<()> {
        info!(vpc = %topology.vpc, "building topology");

        if let Some(router) = &topology.router {
            self.ensure_router(&router.name).await?;
        }

        for switch in &topology.switches {
            self.ensure_switch(switch).await?;

            if switch.dhcp_enable {
                if let Some(dhcp) = &switch.dhcp_options {
                    self.ensure_dhcp_options(switch, dhcp).await?;
                } else {
                    warn!(switch = %switch.name, "DHCP enabled but no options derived, skipping");
                }
            }

            for port in &switch.ports {
                self.ensure_switch_port(switch, port).await?;
            }

            if switch.routed {
                if let Some(router) = &topology.router {
                    if let Some(att) = router.attachment_for(&switch.short_name) {
                        self.ensure_attachment(&router.name, att).await?;
                    }
                }
            }
        }

        info!(vpc = %topology.vpc, "topology built");
        Ok(())
    }

    /// Remove every object the topology calls for that is still present.
    ///
    /// Detaches routed switches first, then removes the router, then each
    /// switch's ports, DHCP options, and finally the switch itself.
    /// Objects already absent are skipped; destroying a lab that was never
    /// built succeeds without committing anything.
    ///
    /// # Errors
    ///
    /// Propagates the first connection or commit failure.
    pub async fn destroy(&self, topology: &Topology) -> Result<()> {
        info!(vpc = %topology.vpc, "destroying topology");

        if let Some(router) = &topology.router {
            for switch in &topology.switches {
                if !switch.routed {
                    continue;
                }
                if let Some(att) = router.attachment_for(&switch.short_name) {
                    self.remove_attachment(&router.name, att).await?;
                }
            }
            self.remove_router(&router.name).await?;
        }

        for switch in &topology.switches {
            for port in &switch.ports {
                self.remove_switch_port(&switch.name, &port.name).await?;
            }

            if switch.dhcp_enable {
                self.remove_dhcp_options(switch).await?;
            }

            self.remove_switch(&switch.name).await?;
        }

        info!(vpc = %topology.vpc, "topology destroyed");
        Ok(())
    }

    async fn ensure_router(&self, name: &str) -> Result<()> {
        if self.nb.get_router(name).await?.is_some() {
            debug!(router = name, "logical router already exists");
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::LrAdd {
            name: name.to_string(),
            external_ids: owner_tags(),
            options: BTreeMap::from([
                (
                    "always_learn_from_arp_request".to_string(),
                    "false".to_string(),
                ),
                ("dynamic_neigh_routers".to_string(), "true".to_string()),
            ]),
        });
        self.nb.commit(txn).await?;

        info!(router = name, "created logical router");
        Ok(())
    }

    async fn ensure_switch(&self, switch: &LogicalSwitch) -> Result<()> {
        if self.nb.get_switch(&switch.name).await?.is_some() {
            debug!(switch = %switch.name, "logical switch already exists");
            return Ok(());
        }

        let mut external_ids = owner_tags();
        external_ids.insert("switch-type".to_string(), switch.kind.as_str().to_string());

        let mut txn = Transaction::new();
        txn.add(NbOp::LsAdd {
            name: switch.name.clone(),
            external_ids,
            other_config: BTreeMap::from([(
                "subnet".to_string(),
                switch.subnet.to_string(),
            )]),
        });
        self.nb.commit(txn).await?;

        info!(switch = %switch.name, "created logical switch");
        Ok(())
    }

    async fn ensure_dhcp_options(
        &self,
        switch: &LogicalSwitch,
        dhcp: &DhcpOptions,
    ) -> Result<()> {
        let cidr = switch.subnet.to_string();

        // DHCP options rows carry no name, so presence is determined by
        // scanning for the subnet's CIDR.
        let existing = self.nb.list_dhcp_options().await?;
        if existing.iter().any(|row| row.cidr == cidr) {
            debug!(switch = %switch.name, cidr, "DHCP options already exist");
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::DhcpOptionsAdd {
            cidr: cidr.clone(),
            options: dhcp.to_option_map(),
            external_ids: owner_tags(),
        });
        txn.add(NbOp::LsSetDhcpv4Options {
            switch: switch.name.clone(),
        });

        // Hold the infrastructure addresses out of the dynamic pool. A /31
        // has no room to reserve anything.
        if switch.subnet.prefix() < 31 {
            let hosts = net::usable_hosts(switch.subnet, false);
            if hosts.len() >= net::DHCP_RESERVED_HOSTS {
                let excluded: Vec<String> = hosts[..net::DHCP_RESERVED_HOSTS]
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                txn.add(NbOp::LsSetOtherConfig {
                    switch: switch.name.clone(),
                    config: BTreeMap::from([(
                        "exclude_ips".to_string(),
                        excluded.join(","),
                    )]),
                });
            }
        }

        self.nb.commit(txn).await?;

        info!(switch = %switch.name, cidr, "created DHCP options");
        Ok(())
    }

    async fn ensure_switch_port(
        &self,
        switch: &LogicalSwitch,
        port: &LogicalSwitchPort,
    ) -> Result<()> {
        if self.nb.get_switch_port(&port.name).await?.is_some() {
            debug!(port = %port.name, "logical switch port already exists");
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::LspAdd {
            switch: switch.name.clone(),
            port: port.name.clone(),
            external_ids: owner_tags(),
        });
        txn.add(NbOp::LspSetAddresses {
            port: port.name.clone(),
            addresses: port.addressing.addresses(&port.mac),
        });
        txn.add(NbOp::LspSetPortSecurity {
            port: port.name.clone(),
            rules: port.addressing.port_security(&port.mac),
        });
        self.nb.commit(txn).await?;

        info!(port = %port.name, "created logical switch port");
        Ok(())
    }

    async fn ensure_attachment(&self, router: &str, att: &RouterAttachment) -> Result<()> {
        let router_port = self.nb.get_router_port(&att.router_port).await?;
        let switch_port = self.nb.get_switch_port(&att.switch_port).await?;

        // A half-built attachment is left alone rather than patched; the
        // operator resolves it by destroying and rebuilding.
        if router_port.is_some() || switch_port.is_some() {
            debug!(
                switch = %att.switch_name,
                router,
                "switch already attached to router"
            );
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::LrpAdd {
            router: router.to_string(),
            port: att.router_port.clone(),
            mac: att.gateway_mac.clone(),
            networks: vec![att.gateway_cidr.clone()],
            external_ids: owner_tags(),
        });
        txn.add(NbOp::LspAdd {
            switch: att.switch_name.clone(),
            port: att.switch_port.clone(),
            external_ids: owner_tags(),
        });
        txn.add(NbOp::LspSetType {
            port: att.switch_port.clone(),
            port_type: "router".to_string(),
        });
        txn.add(NbOp::LspSetOptions {
            port: att.switch_port.clone(),
            options: BTreeMap::from([("router-port".to_string(), att.router_port.clone())]),
        });
        txn.add(NbOp::LspSetAddresses {
            port: att.switch_port.clone(),
            addresses: vec!["router".to_string()],
        });
        self.nb.commit(txn).await?;

        info!(switch = %att.switch_name, router, "attached switch to router");
        Ok(())
    }

    async fn remove_attachment(&self, router: &str, att: &RouterAttachment) -> Result<()> {
        let router_port = self.nb.get_router_port(&att.router_port).await?;
        let switch_port = self.nb.get_switch_port(&att.switch_port).await?;

        let mut txn = Transaction::new();
        if router_port.is_some() {
            txn.add(NbOp::LrpDel {
                router: router.to_string(),
                port: att.router_port.clone(),
            });
        }
        if switch_port.is_some() {
            txn.add(NbOp::LspDel {
                switch: att.switch_name.clone(),
                port: att.switch_port.clone(),
            });
        }

        if txn.is_empty() {
            debug!(switch = %att.switch_name, router, "switch not attached to router");
            return Ok(());
        }

        self.nb.commit(txn).await?;
        info!(switch = %att.switch_name, router, "detached switch from router");
        Ok(())
    }

    async fn remove_router(&self, name: &str) -> Result<()> {
        if self.nb.get_router(name).await?.is_none() {
            debug!(router = name, "logical router does not exist");
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::LrDel {
            name: name.to_string(),
        });
        self.nb.commit(txn).await?;

        info!(router = name, "deleted logical router");
        Ok(())
    }

    async fn remove_switch(&self, name: &str) -> Result<()> {
        if self.nb.get_switch(name).await?.is_none() {
            debug!(switch = name, "logical switch does not exist");
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::LsDel {
            name: name.to_string(),
        });
        self.nb.commit(txn).await?;

        info!(switch = name, "deleted logical switch");
        Ok(())
    }

    async fn remove_switch_port(&self, switch: &str, port: &str) -> Result<()> {
        if self.nb.get_switch_port(port).await?.is_none() {
            debug!(port, "logical switch port does not exist");
            return Ok(());
        }

        let mut txn = Transaction::new();
        txn.add(NbOp::LspDel {
            switch: switch.to_string(),
            port: port.to_string(),
        });
        self.nb.commit(txn).await?;

        info!(port, "deleted logical switch port");
        Ok(())
    }

    async fn remove_dhcp_options(&self, switch: &LogicalSwitch) -> Result<()> {
        let cidr = switch.subnet.to_string();

        let existing = self.nb.list_dhcp_options().await?;
        let Some(row) = existing.iter().find(|row| row.cidr == cidr) else {
            debug!(switch = %switch.name, cidr, "no DHCP options to delete");
            return Ok(());
        };

        let mut txn = Transaction::new();
        txn.add(NbOp::DhcpOptionsDel(row.uuid));
        self.nb.commit(txn).await?;

        info!(switch = %switch.name, cidr, "deleted DHCP options");
        Ok(())
    }
}
