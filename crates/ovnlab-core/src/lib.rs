//! # ovnlab-core
//!
//! Core types for the OVN virtual lab builder.
//!
//! This crate provides the validated configuration model (the "lab
//! specification") and the shared error taxonomy used by the topology
//! deriver, the reconciler, and the CLI.
//!
//! ## Modules
//!
//! - [`error`] - Error types shared across the workspace
//! - [`types`] - Switch and port addressing enums
//! - [`config`] - The declarative lab specification and its validation

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{LabConfig, PortConfig, SwitchConfig, VpcConfig};
pub use error::{Error, Result};
pub use types::{AddressingMode, SwitchType};
