//! Reconciliation of derived lab topologies against the OVN northbound
//! database.
//!
//! The [`Northbound`](northbound::Northbound) trait is the seam to the
//! control plane: per-object existence queries plus an atomic,
//! accumulate-then-commit [`Transaction`](northbound::Transaction).
//! [`OvsdbClient`](ovsdb::OvsdbClient) implements it over OVSDB JSON-RPC
//! on a unix socket, and [`LabReconciler`](reconciler::LabReconciler)
//! drives idempotent build and destroy walks over a derived
//! [`Topology`](ovnlab_topology::Topology).
//!
//! ## Modules
//!
//! - [`northbound`] - Typed operations, row types, and the client trait
//! - [`ovsdb`] - OVSDB JSON-RPC client and endpoint discovery
//! - [`reconciler`] - Idempotent build/destroy walks

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod northbound;
pub mod ovsdb;
pub mod reconciler;

pub use northbound::{Northbound, Transaction};
pub use ovsdb::{Endpoints, OvsdbClient, OVN_NB_DB, OVN_SB_DB};
pub use reconciler::LabReconciler;

/// Convenient result alias sharing the `ovnlab-core` error type.
pub type Result<T> = ovnlab_core::Result<T>;
