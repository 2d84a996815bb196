//! Topology derivation for the OVN virtual lab builder.
//!
//! Expands a validated [`LabConfig`](ovnlab_core::LabConfig) into a fully
//! resolved object graph: every logical switch, every port with its derived
//! MAC address, DHCP parameters, and the lab router with its gateway
//! assignments. Derivation is a pure function of the specification; the
//! same input always produces the same names, MACs, and addresses.
//!
//! ## Modules
//!
//! - [`net`] - Addressing policy (MAC formula, usable-host pools, gateways)
//! - [`model`] - The derived object graph
//! - [`derive`] - Expansion of a specification into a [`Topology`]

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod derive;
pub mod model;
pub mod net;

pub use model::{
    DhcpOptions, LogicalRouter, LogicalSwitch, LogicalSwitchPort, PortAddressing,
    RouterAttachment, Topology,
};

/// Convenient result alias sharing the `ovnlab-core` error type.
pub type Result<T> = ovnlab_core::Result<T>;
