//! Reconciliation scenarios driven through the public API only: a JSON
//! specification is validated, derived, and reconciled against an
//! in-memory northbound database implementing the `Northbound` trait.

use async_trait::async_trait;
use ovnlab_builder::northbound::{
    DhcpOptionsRow, NbOp, Northbound, RouterPortRow, RouterRow, SwitchPortRow, SwitchRow,
    Transaction,
};
use ovnlab_builder::LabReconciler;
use ovnlab_core::{LabConfig, Result};
use ovnlab_topology::Topology;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Shared-state fake; clones observe the same database, so a test can keep
/// one handle for assertions while the reconciler owns the other.
#[derive(Clone, Default)]
struct MemoryNorthbound {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    routers: BTreeMap<String, Uuid>,
    switches: BTreeMap<String, Uuid>,
    switch_ports: BTreeMap<String, Uuid>,
    router_ports: BTreeMap<String, Uuid>,
    dhcp_options: Vec<DhcpOptionsRow>,
    committed: Vec<Vec<NbOp>>,
}

impl MemoryNorthbound {
    fn with_state<T>(&self, read: impl FnOnce(&State) -> T) -> T {
        read(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl Northbound for MemoryNorthbound {
    async fn get_router(&self, name: &str) -> Result<Option<RouterRow>> {
        Ok(self
            .with_state(|s| s.routers.get(name).copied())
            .map(|uuid| RouterRow {
                uuid,
                name: name.to_string(),
            }))
    }

    async fn get_switch(&self, name: &str) -> Result<Option<SwitchRow>> {
        Ok(self
            .with_state(|s| s.switches.get(name).copied())
            .map(|uuid| SwitchRow {
                uuid,
                name: name.to_string(),
            }))
    }

    async fn get_switch_port(&self, name: &str) -> Result<Option<SwitchPortRow>> {
        Ok(self
            .with_state(|s| s.switch_ports.get(name).copied())
            .map(|uuid| SwitchPortRow {
                uuid,
                name: name.to_string(),
            }))
    }

    async fn get_router_port(&self, name: &str) -> Result<Option<RouterPortRow>> {
        Ok(self
            .with_state(|s| s.router_ports.get(name).copied())
            .map(|uuid| RouterPortRow {
                uuid,
                name: name.to_string(),
            }))
    }

    async fn list_dhcp_options(&self) -> Result<Vec<DhcpOptionsRow>> {
        Ok(self.with_state(|s| s.dhcp_options.clone()))
    }

    async fn commit(&self, txn: Transaction) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let ops = txn.into_ops();
        for op in &ops {
            match op {
                NbOp::LrAdd { name, .. } => {
                    state.routers.insert(name.clone(), Uuid::new_v4());
                }
                NbOp::LrDel { name } => {
                    state.routers.remove(name);
                }
                NbOp::LsAdd { name, .. } => {
                    state.switches.insert(name.clone(), Uuid::new_v4());
                }
                NbOp::LsDel { name } => {
                    state.switches.remove(name);
                }
                NbOp::DhcpOptionsAdd { cidr, .. } => {
                    state.dhcp_options.push(DhcpOptionsRow {
                        uuid: Uuid::new_v4(),
                        cidr: cidr.clone(),
                    });
                }
                NbOp::DhcpOptionsDel(uuid) => {
                    state.dhcp_options.retain(|row| row.uuid != *uuid);
                }
                NbOp::LspAdd { port, .. } => {
                    state.switch_ports.insert(port.clone(), Uuid::new_v4());
                }
                NbOp::LspDel { port, .. } => {
                    state.switch_ports.remove(port);
                }
                NbOp::LrpAdd { port, .. } => {
                    state.router_ports.insert(port.clone(), Uuid::new_v4());
                }
                NbOp::LrpDel { port, .. } => {
                    state.router_ports.remove(port);
                }
                _ => {}
            }
        }
        state.committed.push(ops);
        Ok(())
    }
}

fn two_switch_lab() -> Topology {
    let raw = r#"{
        "vpc": {"name": "lab9", "mac_prefix": "aa:bb:cc", "id": 9, "port_count": 2},
        "switches": [
            {
                "name": "tenant", "id": 1, "type": "normal",
                "subnet": "10.9.1.0/24", "dhcp_enable": true, "routed": true
            },
            {
                "name": "mgmt", "id": 2, "type": "mgmt",
                "subnet": "10.9.200.0/24",
                "ports": [
                    {"name": "console", "addressing": "static", "ip": "10.9.200.10"}
                ]
            }
        ]
    }"#;
    let config: LabConfig = serde_json::from_str(raw).expect("valid JSON spec");
    config.validate_spec().expect("valid lab spec");
    Topology::derive(&config)
}

#[tokio::test]
async fn build_creates_expected_objects() {
    let topology = two_switch_lab();
    let nb = MemoryNorthbound::default();
    let reconciler = LabReconciler::new(nb.clone());

    reconciler.build(&topology).await.unwrap();

    assert!(nb.with_state(|s| s.routers.contains_key("lab9-lr")));
    assert!(nb.with_state(|s| s.switches.contains_key("lab9-tenant")));
    assert!(nb.with_state(|s| s.switches.contains_key("lab9-mgmt")));

    // Autogenerated tenant ports plus the explicit mgmt port.
    assert!(nb.with_state(|s| s.switch_ports.contains_key("lab9-tenant-lsp1")));
    assert!(nb.with_state(|s| s.switch_ports.contains_key("lab9-tenant-lsp2")));
    assert!(nb.with_state(|s| s.switch_ports.contains_key("lab9-mgmt-console")));

    // Only the routed switch attaches.
    assert!(nb.with_state(|s| s.router_ports.contains_key("lab9-lr-tenant")));
    assert!(nb.with_state(|s| s.switch_ports.contains_key("lab9-tenant-lab9-lr")));
    assert!(!nb.with_state(|s| s.router_ports.contains_key("lab9-lr-mgmt")));

    // DHCP options only for the DHCP-enabled subnet.
    let cidrs =
        nb.with_state(|s| s.dhcp_options.iter().map(|r| r.cidr.clone()).collect::<Vec<_>>());
    assert_eq!(cidrs, vec!["10.9.1.0/24".to_string()]);
}

#[tokio::test]
async fn dhcp_transaction_bundles_bind_and_exclusions() {
    let topology = two_switch_lab();
    let nb = MemoryNorthbound::default();
    let reconciler = LabReconciler::new(nb.clone());

    reconciler.build(&topology).await.unwrap();

    let dhcp_txn = nb.with_state(|s| {
        s.committed
            .iter()
            .find(|ops| {
                ops.iter()
                    .any(|op| matches!(op, NbOp::DhcpOptionsAdd { .. }))
            })
            .cloned()
            .expect("a DHCP transaction was committed")
    });

    assert!(dhcp_txn
        .iter()
        .any(|op| matches!(op, NbOp::LsSetDhcpv4Options { switch } if switch == "lab9-tenant")));
    let Some(NbOp::LsSetOtherConfig { config, .. }) = dhcp_txn
        .iter()
        .find(|op| matches!(op, NbOp::LsSetOtherConfig { .. }))
    else {
        panic!("exclude_ips op missing from the DHCP transaction");
    };
    assert_eq!(
        config.get("exclude_ips").map(String::as_str),
        Some("10.9.1.1,10.9.1.2,10.9.1.3,10.9.1.4")
    );
}

#[tokio::test]
async fn attachment_travels_in_one_transaction() {
    let topology = two_switch_lab();
    let nb = MemoryNorthbound::default();
    let reconciler = LabReconciler::new(nb.clone());

    reconciler.build(&topology).await.unwrap();

    let attachment_txn = nb.with_state(|s| {
        s.committed
            .iter()
            .find(|ops| ops.iter().any(|op| matches!(op, NbOp::LrpAdd { .. })))
            .cloned()
            .expect("an attachment transaction was committed")
    });

    // Router port, switch port, type, options, addresses: one batch.
    assert_eq!(attachment_txn.len(), 5);
    let Some(NbOp::LrpAdd { mac, networks, .. }) = attachment_txn
        .iter()
        .find(|op| matches!(op, NbOp::LrpAdd { .. }))
    else {
        panic!("router port op missing");
    };
    assert_eq!(mac, "aa:bb:cc:09:01:00");
    assert_eq!(networks, &vec!["10.9.1.1/24".to_string()]);
}

#[tokio::test]
async fn rebuild_commits_nothing_new() {
    let topology = two_switch_lab();
    let nb = MemoryNorthbound::default();
    let reconciler = LabReconciler::new(nb.clone());

    reconciler.build(&topology).await.unwrap();
    let transactions = nb.with_state(|s| s.committed.len());

    reconciler.build(&topology).await.unwrap();
    assert_eq!(nb.with_state(|s| s.committed.len()), transactions);
}

#[tokio::test]
async fn build_then_destroy_leaves_database_empty() {
    let topology = two_switch_lab();
    let nb = MemoryNorthbound::default();
    let reconciler = LabReconciler::new(nb.clone());

    reconciler.build(&topology).await.unwrap();
    reconciler.destroy(&topology).await.unwrap();

    assert!(nb.with_state(|s| s.routers.is_empty()));
    assert!(nb.with_state(|s| s.switches.is_empty()));
    assert!(nb.with_state(|s| s.switch_ports.is_empty()));
    assert!(nb.with_state(|s| s.router_ports.is_empty()));
    assert!(nb.with_state(|s| s.dhcp_options.is_empty()));
}

#[tokio::test]
async fn destroy_of_unbuilt_lab_is_a_noop() {
    let topology = two_switch_lab();
    let nb = MemoryNorthbound::default();
    let reconciler = LabReconciler::new(nb.clone());

    reconciler.destroy(&topology).await.unwrap();
    assert_eq!(nb.with_state(|s| s.committed.len()), 0);
}
