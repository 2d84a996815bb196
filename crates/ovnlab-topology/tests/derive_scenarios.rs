//! End-to-end derivation scenarios.
//!
//! These tests feed complete JSON lab specifications through validation
//! and derivation, checking the fully resolved names, MACs, and addresses.

use ovnlab_core::LabConfig;
use ovnlab_topology::{PortAddressing, Topology};

fn load(raw: &str) -> LabConfig {
    let config: LabConfig = serde_json::from_str(raw).expect("valid JSON spec");
    config.validate_spec().expect("valid lab spec");
    config
}

#[test]
fn single_routed_dhcp_switch_scenario() {
    let config = load(
        r#"{
            "vpc": {"name": "vlab", "mac_prefix": "e1:cc:ff", "id": 1},
            "switches": [{
                "name": "ls1", "id": 1, "type": "normal",
                "subnet": "192.168.1.0/24",
                "dhcp_enable": true, "routed": true, "port_count": 1
            }]
        }"#,
    );

    let topology = Topology::derive(&config);

    let sw = topology.switch("vlab-ls1").expect("switch derived");
    assert_eq!(sw.ports.len(), 1);
    assert_eq!(sw.ports[0].name, "vlab-ls1-lsp1");
    assert_eq!(sw.ports[0].mac, "e1:cc:ff:01:01:01");
    assert_eq!(sw.ports[0].addressing, PortAddressing::Dynamic);

    let dhcp = sw.dhcp_options.as_ref().expect("dhcp derived");
    assert_eq!(dhcp.server_id.to_string(), "192.168.1.1");
    assert_eq!(dhcp.server_mac, "e1:cc:ff:01:01:00");

    let router = topology.router.as_ref().expect("router derived");
    assert_eq!(router.name, "vlab-lr");
    let att = router.attachment_for("ls1").expect("attachment derived");
    assert_eq!(att.router_port, "vlab-lr-ls1");
    assert_eq!(att.switch_port, "vlab-ls1-vlab-lr");
    assert_eq!(att.gateway_cidr, "192.168.1.1/24");
    assert_eq!(att.gateway_mac, "e1:cc:ff:01:01:00");
}

#[test]
fn mixed_lab_with_p2p_link() {
    let config = load(
        r#"{
            "vpc": {"name": "lab2", "mac_prefix": "aa:bb:cc", "id": 2, "port_count": 2},
            "switches": [
                {
                    "name": "tenant", "id": 1, "type": "normal",
                    "subnet": "10.1.0.0/24", "dhcp_enable": true, "routed": true
                },
                {
                    "name": "uplink", "id": 2, "type": "p2p",
                    "subnet": "10.9.0.0/31", "routed": true, "port_count": 5
                },
                {
                    "name": "mgmt", "id": 3, "type": "mgmt",
                    "subnet": "10.200.0.0/24",
                    "ports": [
                        {"name": "console", "addressing": "static", "ip": "10.200.0.10"},
                        {"name": "probe", "addressing": "unknown"}
                    ]
                }
            ]
        }"#,
    );

    let topology = Topology::derive(&config);
    assert_eq!(topology.switches.len(), 3);

    // Inherited VPC default port count.
    let tenant = topology.switch("lab2-tenant").unwrap();
    assert_eq!(tenant.ports.len(), 2);
    assert_eq!(tenant.ports[0].mac, "aa:bb:cc:02:01:01");

    // /31 clamps the requested 5 ports to the two usable addresses.
    let uplink = topology.switch("lab2-uplink").unwrap();
    assert_eq!(uplink.ports.len(), 2);
    assert!(uplink.dhcp_options.is_none());

    // Explicit ports copied verbatim, indexed in list order.
    let mgmt = topology.switch("lab2-mgmt").unwrap();
    assert_eq!(mgmt.ports[0].name, "lab2-mgmt-console");
    assert_eq!(
        mgmt.ports[0].addressing,
        PortAddressing::Static("10.200.0.10".to_string())
    );
    assert_eq!(mgmt.ports[1].addressing, PortAddressing::Unknown);
    assert!(!mgmt.routed);

    // Both routed switches attach, in declaration order.
    let router = topology.router.as_ref().unwrap();
    assert_eq!(router.attachments.len(), 2);
    assert_eq!(router.attachments[0].switch, "tenant");
    assert_eq!(router.attachments[1].switch, "uplink");
    assert_eq!(router.attachments[1].gateway_cidr, "10.9.0.0/31");
    assert!(router.attachment_for("mgmt").is_none());
}

#[test]
fn duplicate_switch_ids_rejected_before_derivation() {
    let raw = r#"{
        "vpc": {"name": "vlab", "mac_prefix": "e1:cc:ff", "id": 1},
        "switches": [
            {"name": "a", "id": 1, "type": "normal", "subnet": "10.0.0.0/24", "port_count": 1},
            {"name": "b", "id": 1, "type": "normal", "subnet": "10.0.1.0/24", "port_count": 1}
        ]
    }"#;

    let config: LabConfig = serde_json::from_str(raw).unwrap();
    let err = config.validate_spec().unwrap_err();
    assert!(err.to_string().contains("unique"), "{err}");
}
