//! The northbound control-plane seam.
//!
//! Everything the reconciler needs from the OVN northbound database:
//! existence queries per object kind, a list call for DHCP options (which
//! are located by CIDR, not by name), and an atomic transaction of typed
//! operations. The concrete OVSDB wiring lives in
//! [`ovsdb`](crate::ovsdb); tests substitute in-memory implementations.

use async_trait::async_trait;
use ovnlab_core::Result;
use std::collections::BTreeMap;
use uuid::Uuid;

/// String-to-string column value (`external_ids`, `options`, ...).
pub type StringMap = BTreeMap<String, String>;

/// A logical router row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterRow {
    /// Database row id.
    pub uuid: Uuid,
    /// Router name.
    pub name: String,
}

/// A logical switch row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRow {
    /// Database row id.
    pub uuid: Uuid,
    /// Switch name.
    pub name: String,
}

/// A logical switch port row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPortRow {
    /// Database row id.
    pub uuid: Uuid,
    /// Port name.
    pub name: String,
}

/// A logical router port row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterPortRow {
    /// Database row id.
    pub uuid: Uuid,
    /// Port name.
    pub name: String,
}

/// A DHCP options row. DHCP options carry no name; they are identified by
/// the CIDR they serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOptionsRow {
    /// Database row id.
    pub uuid: Uuid,
    /// Subnet the options serve, in CIDR notation.
    pub cidr: String,
}

/// One typed northbound operation.
///
/// Operations are accumulated into a [`Transaction`] and committed
/// atomically; a transaction is the unit of atomicity, never the whole
/// build or destroy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NbOp {
    /// Create a logical router.
    LrAdd {
        /// Router name.
        name: String,
        /// Ownership and bookkeeping tags.
        external_ids: StringMap,
        /// Router options.
        options: StringMap,
    },
    /// Delete a logical router by name.
    LrDel {
        /// Router name.
        name: String,
    },
    /// Create a logical switch.
    LsAdd {
        /// Switch name.
        name: String,
        /// Ownership and bookkeeping tags.
        external_ids: StringMap,
        /// Switch configuration (subnet and friends).
        other_config: StringMap,
    },
    /// Delete a logical switch by name.
    LsDel {
        /// Switch name.
        name: String,
    },
    /// Merge keys into a switch's `other_config`.
    LsSetOtherConfig {
        /// Switch name.
        switch: String,
        /// Keys to set.
        config: StringMap,
    },
    /// Insert a DHCP options row.
    DhcpOptionsAdd {
        /// Subnet the options serve.
        cidr: String,
        /// Option key/value pairs.
        options: StringMap,
        /// Ownership tags.
        external_ids: StringMap,
    },
    /// Bind the DHCP options row inserted earlier in the same transaction
    /// to a switch.
    LsSetDhcpv4Options {
        /// Switch name.
        switch: String,
    },
    /// Delete a DHCP options row by id.
    DhcpOptionsDel(
        /// Row id, obtained from a prior CIDR scan.
        Uuid,
    ),
    /// Create a switch port on a switch.
    LspAdd {
        /// Owning switch name.
        switch: String,
        /// Port name.
        port: String,
        /// Ownership tags.
        external_ids: StringMap,
    },
    /// Set a switch port's addresses column.
    LspSetAddresses {
        /// Port name.
        port: String,
        /// Rendered address strings.
        addresses: Vec<String>,
    },
    /// Set a switch port's port-security allow-list.
    LspSetPortSecurity {
        /// Port name.
        port: String,
        /// Rendered MAC/IP rules.
        rules: Vec<String>,
    },
    /// Set a switch port's type.
    LspSetType {
        /// Port name.
        port: String,
        /// Port type, e.g. `router`.
        port_type: String,
    },
    /// Merge keys into a switch port's options.
    LspSetOptions {
        /// Port name.
        port: String,
        /// Keys to set.
        options: StringMap,
    },
    /// Delete a switch port, detaching it from its owning switch.
    LspDel {
        /// Owning switch name.
        switch: String,
        /// Port name.
        port: String,
    },
    /// Create a router port on a router.
    LrpAdd {
        /// Owning router name.
        router: String,
        /// Port name.
        port: String,
        /// Gateway MAC.
        mac: String,
        /// Gateway networks with prefix length.
        networks: Vec<String>,
        /// Ownership tags.
        external_ids: StringMap,
    },
    /// Delete a router port, detaching it from its owning router.
    LrpDel {
        /// Owning router name.
        router: String,
        /// Port name.
        port: String,
    },
}

/// An accumulate-then-commit batch of operations.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<NbOp>,
}

impl Transaction {
    /// Create an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    pub fn add(&mut self, op: NbOp) {
        self.ops.push(op);
    }

    /// Operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[NbOp] {
        &self.ops
    }

    /// True when nothing was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consume the transaction, yielding its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<NbOp> {
        self.ops
    }
}

/// Client interface to the northbound database.
///
/// Existence checks happen outside transactions; every mutation to a
/// single object travels in one [`Transaction`] committed atomically.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Northbound: Send + Sync {
    /// Fetch a logical router by name, `None` when absent.
    async fn get_router(&self, name: &str) -> Result<Option<RouterRow>>;

    /// Fetch a logical switch by name, `None` when absent.
    async fn get_switch(&self, name: &str) -> Result<Option<SwitchRow>>;

    /// Fetch a logical switch port by name, `None` when absent.
    async fn get_switch_port(&self, name: &str) -> Result<Option<SwitchPortRow>>;

    /// Fetch a logical router port by name, `None` when absent.
    async fn get_router_port(&self, name: &str) -> Result<Option<RouterPortRow>>;

    /// List every DHCP options row. Callers filter by CIDR; the control
    /// plane offers no direct handle from a switch to its options.
    async fn list_dhcp_options(&self) -> Result<Vec<DhcpOptionsRow>>;

    /// Commit a transaction atomically.
    async fn commit(&self, txn: Transaction) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_accumulates_in_order() {
        let mut txn = Transaction::new();
        assert!(txn.is_empty());

        txn.add(NbOp::LrDel {
            name: "vlab-lr".to_string(),
        });
        txn.add(NbOp::LsDel {
            name: "vlab-ls1".to_string(),
        });

        assert!(!txn.is_empty());
        assert_eq!(txn.ops().len(), 2);
        assert!(matches!(txn.ops()[0], NbOp::LrDel { .. }));
        assert!(matches!(txn.into_ops()[1], NbOp::LsDel { .. }));
    }
}
