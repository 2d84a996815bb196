//! OVSDB JSON-RPC client for the OVN databases.
//!
//! Speaks the OVSDB management protocol over a unix-domain socket:
//! `transact` requests carrying `select`/`insert`/`update`/`mutate`/
//! `delete` operations, with inbound `echo` keepalives answered in place.
//! Typed [`NbOp`] sequences are lowered onto wire operations here, so the
//! reconciler never sees a table name.

use crate::northbound::{
    DhcpOptionsRow, NbOp, Northbound, RouterPortRow, RouterRow, StringMap, SwitchPortRow,
    SwitchRow, Transaction,
};
use async_trait::async_trait;
use ovnlab_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Northbound database name.
pub const OVN_NB_DB: &str = "OVN_Northbound";

/// Southbound database name.
pub const OVN_SB_DB: &str = "OVN_Southbound";

/// Connection and per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const TABLE_ROUTER: &str = "Logical_Router";
const TABLE_SWITCH: &str = "Logical_Switch";
const TABLE_SWITCH_PORT: &str = "Logical_Switch_Port";
const TABLE_ROUTER_PORT: &str = "Logical_Router_Port";
const TABLE_DHCP_OPTIONS: &str = "DHCP_Options";

/// Northbound/southbound endpoint pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Intent database endpoint.
    pub northbound: String,
    /// Realized-state database endpoint.
    pub southbound: String,
}

impl Endpoints {
    /// Compute endpoints from a socket directory, falling back to the
    /// platform default when none is given.
    #[must_use]
    pub fn from_socket_dir(socket_dir: Option<&Path>) -> Self {
        let dir = socket_dir.map_or_else(default_socket_dir, Path::to_path_buf);
        Self {
            northbound: format!("unix:{}/ovnnb_db.sock", dir.display()),
            southbound: format!("unix:{}/ovnsb_db.sock", dir.display()),
        }
    }
}

#[cfg(target_os = "macos")]
fn default_socket_dir() -> PathBuf {
    PathBuf::from("/opt/local/var/run/ovn")
}

#[cfg(not(target_os = "macos"))]
fn default_socket_dir() -> PathBuf {
    PathBuf::from("/var/run/ovn")
}

#[derive(Debug)]
struct Inner {
    stream: UnixStream,
    buf: Vec<u8>,
    next_id: u64,
}

/// Asynchronous OVSDB client bound to one database.
#[derive(Debug)]
pub struct OvsdbClient {
    inner: Mutex<Inner>,
    db: String,
    timeout: Duration,
}

impl OvsdbClient {
    /// Connect to an OVSDB server.
    ///
    /// Only `unix:{path}` endpoints are supported. The timeout bounds both
    /// the connection attempt and every subsequent request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] for malformed endpoints,
    /// [`Error::Timeout`] when the connection attempt exceeds the timeout,
    /// and [`Error::ConnectionFailed`] otherwise.
    pub async fn connect(endpoint: &str, db: &str, timeout: Duration) -> Result<Self> {
        let Some(path) = endpoint.strip_prefix("unix:") else {
            return Err(Error::InvalidEndpoint(format!(
                "unsupported endpoint `{endpoint}`: only unix:{{path}} is supported"
            )));
        };

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| Error::Timeout(format!("connecting to {endpoint}")))?
            .map_err(|err| {
                Error::ConnectionFailed(format!("failed to connect to {endpoint}: {err}"))
            })?;

        debug!(endpoint, db, "connected to OVSDB");
        Ok(Self {
            inner: Mutex::new(Inner {
                stream,
                buf: Vec::new(),
                next_id: 0,
            }),
            db: db.to_string(),
            timeout,
        })
    }

    /// Database this client is bound to.
    #[must_use]
    pub fn db(&self) -> &str {
        &self.db
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let mut inner = self.inner.lock().await;
        tokio::time::timeout(self.timeout, inner.call(method, params))
            .await
            .map_err(|_| Error::Timeout(format!("waiting for `{method}` response")))?
    }

    async fn transact(&self, wire_ops: Vec<Value>) -> Result<Vec<Value>> {
        let mut params = vec![Value::String(self.db.clone())];
        params.extend(wire_ops);

        let result = self.rpc("transact", Value::Array(params)).await?;
        let Value::Array(results) = result else {
            return Err(Error::ProtocolError(format!(
                "transact result is not an array: {result}"
            )));
        };

        for entry in &results {
            if let Some(error) = entry.get("error").and_then(Value::as_str) {
                let details = entry
                    .get("details")
                    .and_then(Value::as_str)
                    .unwrap_or("no details");
                return Err(Error::TransactionFailed(format!("{error}: {details}")));
            }
        }

        Ok(results)
    }

    async fn select(&self, table: &str, conditions: Value, columns: &[&str]) -> Result<Vec<Value>> {
        let op = json!({
            "op": "select",
            "table": table,
            "where": conditions,
            "columns": columns,
        });
        let mut results = self.transact(vec![op]).await?;
        if results.is_empty() {
            return Err(Error::ProtocolError("empty select result".to_string()));
        }
        let rows = results.remove(0);
        match rows.get("rows") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            _ => Err(Error::ProtocolError(format!(
                "select result without rows: {rows}"
            ))),
        }
    }

    async fn get_named_row(&self, table: &str, name: &str) -> Result<Option<(uuid::Uuid, String)>> {
        let rows = self
            .select(table, json!([["name", "==", name]]), &["_uuid", "name"])
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let uuid = row_uuid(row)?;
        let name = row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();
        Ok(Some((uuid, name)))
    }

    async fn resolve_port_uuid(&self, table: &str, name: &str) -> Result<Option<uuid::Uuid>> {
        Ok(self.get_named_row(table, name).await?.map(|(uuid, _)| uuid))
    }
}

impl Inner {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({"method": method, "params": params, "id": id});
        let payload = serde_json::to_vec(&request)
            .map_err(|err| Error::InternalError(format!("failed to encode request: {err}")))?;
        self.stream.write_all(&payload).await?;
        trace!(method, id, "OVSDB request sent");

        loop {
            let message = self.read_message().await?;

            // The server sends echo keepalives on its own schedule; answer
            // them and keep waiting for our reply.
            if message.get("method").and_then(Value::as_str) == Some("echo") {
                let reply = json!({
                    "result": message.get("params").cloned().unwrap_or(Value::Array(vec![])),
                    "error": Value::Null,
                    "id": message.get("id").cloned().unwrap_or(Value::Null),
                });
                let payload = serde_json::to_vec(&reply).map_err(|err| {
                    Error::InternalError(format!("failed to encode echo reply: {err}"))
                })?;
                self.stream.write_all(&payload).await?;
                continue;
            }

            if message.get("method").is_some() {
                trace!("ignoring unsolicited OVSDB message");
                continue;
            }

            if message.get("id").and_then(Value::as_u64) != Some(id) {
                trace!("ignoring reply for unknown request id");
                continue;
            }

            if let Some(error) = message.get("error") {
                if !error.is_null() {
                    return Err(Error::TransactionFailed(format!(
                        "server rejected `{method}`: {error}"
                    )));
                }
            }

            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    async fn read_message(&mut self) -> Result<Value> {
        loop {
            if !self.buf.is_empty() {
                let mut stream =
                    serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
                match stream.next() {
                    Some(Ok(value)) => {
                        let consumed = stream.byte_offset();
                        self.buf.drain(..consumed);
                        return Ok(value);
                    }
                    Some(Err(err)) if err.is_eof() => {}
                    Some(Err(err)) => {
                        return Err(Error::ProtocolError(format!(
                            "malformed OVSDB message: {err}"
                        )));
                    }
                    None => {}
                }
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::ConnectionFailed(
                    "OVSDB connection closed by server".to_string(),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Names already resolved to row ids before lowering a transaction.
#[derive(Debug, Default)]
pub(crate) struct ResolvedPorts {
    pub(crate) switch_ports: BTreeMap<String, uuid::Uuid>,
    pub(crate) router_ports: BTreeMap<String, uuid::Uuid>,
}

/// Lower typed operations onto OVSDB wire operations.
///
/// Port deletions whose row could not be resolved produce no wire
/// operations: the row is already gone and the transaction stays
/// idempotent. Inserted rows receive `named-uuid` handles so parent sets
/// and same-transaction DHCP binding can reference them.
pub(crate) fn lower_ops(ops: &[NbOp], resolved: &ResolvedPorts) -> Result<Vec<Value>> {
    let mut wire = Vec::new();
    let mut named = 0_u32;
    let mut last_dhcp_row: Option<String> = None;

    let mut fresh = |named: &mut u32| {
        let handle = format!("row{named}");
        *named += 1;
        handle
    };

    for op in ops {
        match op {
            NbOp::LrAdd {
                name,
                external_ids,
                options,
            } => wire.push(json!({
                "op": "insert",
                "table": TABLE_ROUTER,
                "row": {
                    "name": name,
                    "external_ids": map_value(external_ids),
                    "options": map_value(options),
                },
            })),
            NbOp::LrDel { name } => wire.push(delete_by_name(TABLE_ROUTER, name)),
            NbOp::LsAdd {
                name,
                external_ids,
                other_config,
            } => wire.push(json!({
                "op": "insert",
                "table": TABLE_SWITCH,
                "row": {
                    "name": name,
                    "external_ids": map_value(external_ids),
                    "other_config": map_value(other_config),
                },
            })),
            NbOp::LsDel { name } => wire.push(delete_by_name(TABLE_SWITCH, name)),
            NbOp::LsSetOtherConfig { switch, config } => {
                wire.push(merge_map(TABLE_SWITCH, switch, "other_config", config));
            }
            NbOp::DhcpOptionsAdd {
                cidr,
                options,
                external_ids,
            } => {
                let handle = fresh(&mut named);
                wire.push(json!({
                    "op": "insert",
                    "table": TABLE_DHCP_OPTIONS,
                    "row": {
                        "cidr": cidr,
                        "options": map_value(options),
                        "external_ids": map_value(external_ids),
                    },
                    "uuid-name": handle,
                }));
                last_dhcp_row = Some(handle);
            }
            NbOp::LsSetDhcpv4Options { switch } => {
                let Some(handle) = &last_dhcp_row else {
                    return Err(Error::InternalError(format!(
                        "binding DHCP options to `{switch}` requires an insert \
                         earlier in the same transaction"
                    )));
                };
                wire.push(json!({
                    "op": "update",
                    "table": TABLE_SWITCH,
                    "where": [["name", "==", switch]],
                    "row": {
                        "dhcpv4_options": json!(["set", [["named-uuid", handle]]]),
                    },
                }));
            }
            NbOp::DhcpOptionsDel(uuid) => wire.push(json!({
                "op": "delete",
                "table": TABLE_DHCP_OPTIONS,
                "where": [["_uuid", "==", ["uuid", uuid.to_string()]]],
            })),
            NbOp::LspAdd {
                switch,
                port,
                external_ids,
            } => {
                let handle = fresh(&mut named);
                wire.push(json!({
                    "op": "insert",
                    "table": TABLE_SWITCH_PORT,
                    "row": {
                        "name": port,
                        "external_ids": map_value(external_ids),
                    },
                    "uuid-name": handle,
                }));
                wire.push(mutate_ports(TABLE_SWITCH, switch, "insert", named_ref(&handle)));
            }
            NbOp::LspSetAddresses { port, addresses } => wire.push(json!({
                "op": "update",
                "table": TABLE_SWITCH_PORT,
                "where": [["name", "==", port]],
                "row": {"addresses": string_set(addresses)},
            })),
            NbOp::LspSetPortSecurity { port, rules } => wire.push(json!({
                "op": "update",
                "table": TABLE_SWITCH_PORT,
                "where": [["name", "==", port]],
                "row": {"port_security": string_set(rules)},
            })),
            NbOp::LspSetType { port, port_type } => wire.push(json!({
                "op": "update",
                "table": TABLE_SWITCH_PORT,
                "where": [["name", "==", port]],
                "row": {"type": port_type},
            })),
            NbOp::LspSetOptions { port, options } => {
                wire.push(merge_map(TABLE_SWITCH_PORT, port, "options", options));
            }
            NbOp::LspDel { switch, port } => {
                let Some(uuid) = resolved.switch_ports.get(port) else {
                    debug!(port, "switch port already absent, nothing to delete");
                    continue;
                };
                wire.push(mutate_ports(TABLE_SWITCH, switch, "delete", uuid_ref(*uuid)));
                wire.push(json!({
                    "op": "delete",
                    "table": TABLE_SWITCH_PORT,
                    "where": [["_uuid", "==", ["uuid", uuid.to_string()]]],
                }));
            }
            NbOp::LrpAdd {
                router,
                port,
                mac,
                networks,
                external_ids,
            } => {
                let handle = fresh(&mut named);
                wire.push(json!({
                    "op": "insert",
                    "table": TABLE_ROUTER_PORT,
                    "row": {
                        "name": port,
                        "mac": mac,
                        "networks": string_set(networks),
                        "external_ids": map_value(external_ids),
                    },
                    "uuid-name": handle,
                }));
                wire.push(mutate_ports(TABLE_ROUTER, router, "insert", named_ref(&handle)));
            }
            NbOp::LrpDel { router, port } => {
                let Some(uuid) = resolved.router_ports.get(port) else {
                    debug!(port, "router port already absent, nothing to delete");
                    continue;
                };
                wire.push(mutate_ports(TABLE_ROUTER, router, "delete", uuid_ref(*uuid)));
                wire.push(json!({
                    "op": "delete",
                    "table": TABLE_ROUTER_PORT,
                    "where": [["_uuid", "==", ["uuid", uuid.to_string()]]],
                }));
            }
        }
    }

    Ok(wire)
}

fn map_value(map: &StringMap) -> Value {
    let pairs: Vec<Value> = map.iter().map(|(k, v)| json!([k, v])).collect();
    json!(["map", pairs])
}

fn string_set(values: &[String]) -> Value {
    json!(["set", values])
}

fn named_ref(handle: &str) -> Value {
    json!(["named-uuid", handle])
}

fn uuid_ref(uuid: uuid::Uuid) -> Value {
    json!(["uuid", uuid.to_string()])
}

fn delete_by_name(table: &str, name: &str) -> Value {
    json!({
        "op": "delete",
        "table": table,
        "where": [["name", "==", name]],
    })
}

fn mutate_ports(table: &str, parent: &str, mutator: &str, member: Value) -> Value {
    json!({
        "op": "mutate",
        "table": table,
        "where": [["name", "==", parent]],
        "mutations": [["ports", mutator, ["set", [member]]]],
    })
}

/// Overwrite keys inside a map column: delete the keys first, then insert
/// the new pairs, so re-runs converge instead of conflicting.
fn merge_map(table: &str, name: &str, column: &str, config: &StringMap) -> Value {
    let keys: Vec<&String> = config.keys().collect();
    let pairs: Vec<Value> = config.iter().map(|(k, v)| json!([k, v])).collect();
    json!({
        "op": "mutate",
        "table": table,
        "where": [["name", "==", name]],
        "mutations": [
            [column, "delete", ["set", keys]],
            [column, "insert", ["map", pairs]],
        ],
    })
}

fn row_uuid(row: &Value) -> Result<uuid::Uuid> {
    let text = row
        .get("_uuid")
        .and_then(|atom| atom.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ProtocolError(format!("row without _uuid: {row}")))?;
    uuid::Uuid::parse_str(text)
        .map_err(|err| Error::ProtocolError(format!("bad row uuid `{text}`: {err}")))
}

#[async_trait]
impl Northbound for OvsdbClient {
    async fn get_router(&self, name: &str) -> Result<Option<RouterRow>> {
        Ok(self
            .get_named_row(TABLE_ROUTER, name)
            .await?
            .map(|(uuid, name)| RouterRow { uuid, name }))
    }

    async fn get_switch(&self, name: &str) -> Result<Option<SwitchRow>> {
        Ok(self
            .get_named_row(TABLE_SWITCH, name)
            .await?
            .map(|(uuid, name)| SwitchRow { uuid, name }))
    }

    async fn get_switch_port(&self, name: &str) -> Result<Option<SwitchPortRow>> {
        Ok(self
            .get_named_row(TABLE_SWITCH_PORT, name)
            .await?
            .map(|(uuid, name)| SwitchPortRow { uuid, name }))
    }

    async fn get_router_port(&self, name: &str) -> Result<Option<RouterPortRow>> {
        Ok(self
            .get_named_row(TABLE_ROUTER_PORT, name)
            .await?
            .map(|(uuid, name)| RouterPortRow { uuid, name }))
    }

    async fn list_dhcp_options(&self) -> Result<Vec<DhcpOptionsRow>> {
        let rows = self
            .select(TABLE_DHCP_OPTIONS, json!([]), &["_uuid", "cidr"])
            .await?;
        rows.iter()
            .map(|row| {
                let uuid = row_uuid(row)?;
                let cidr = row
                    .get("cidr")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::ProtocolError(format!("DHCP options row without cidr: {row}"))
                    })?
                    .to_string();
                Ok(DhcpOptionsRow { uuid, cidr })
            })
            .collect()
    }

    async fn commit(&self, txn: Transaction) -> Result<()> {
        if txn.is_empty() {
            return Ok(());
        }

        // Port deletions must reference row ids; resolve names first, so
        // lowering itself stays pure.
        let mut resolved = ResolvedPorts::default();
        for op in txn.ops() {
            match op {
                NbOp::LspDel { port, .. } => {
                    if let Some(uuid) = self.resolve_port_uuid(TABLE_SWITCH_PORT, port).await? {
                        resolved.switch_ports.insert(port.clone(), uuid);
                    }
                }
                NbOp::LrpDel { port, .. } => {
                    if let Some(uuid) = self.resolve_port_uuid(TABLE_ROUTER_PORT, port).await? {
                        resolved.router_ports.insert(port.clone(), uuid);
                    }
                }
                _ => {}
            }
        }

        let wire = lower_ops(txn.ops(), &resolved)?;
        if wire.is_empty() {
            return Ok(());
        }

        self.transact(wire).await?;
        Ok(())
    }
}
