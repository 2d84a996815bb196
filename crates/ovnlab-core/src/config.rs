//! The declarative lab specification.
//!
//! This module defines the JSON configuration model for a virtual lab (one
//! VPC plus its switches) and every constraint the specification must
//! satisfy before any topology is derived. Validation is all-or-nothing:
//! either the whole specification is accepted or a descriptive error names
//! the offending field.

use crate::error::{Error, Result};
use crate::types::{AddressingMode, SwitchType};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use validator::{Validate, ValidationError};

/// Top-level lab specification: one VPC and its switches.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LabConfig {
    /// The VPC grouping every object in this lab.
    #[validate(nested)]
    pub vpc: VpcConfig,

    /// Switch descriptors, in declaration order.
    #[validate(nested)]
    pub switches: Vec<SwitchConfig>,
}

/// VPC descriptor: the namespace shared by all lab objects.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VpcConfig {
    /// Name used as the prefix of every derived object name.
    #[validate(length(min = 1, message = "VPC name must not be empty"))]
    pub name: String,

    /// First three octets of every derived MAC address, e.g. `e1:cc:ff`.
    #[validate(custom(function = validate_mac_prefix))]
    pub mac_prefix: String,

    /// Numeric VPC id, encoded as the fourth MAC octet.
    pub id: u8,

    /// Default port count inherited by switches that specify neither
    /// `ports` nor `port_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_count: Option<u32>,
}

impl VpcConfig {
    /// MAC prefix normalized to lowercase.
    #[must_use]
    pub fn mac_prefix_normalized(&self) -> String {
        self.mac_prefix.to_ascii_lowercase()
    }
}

/// Switch descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SwitchConfig {
    /// Switch name, unique within the lab by convention.
    #[validate(length(min = 1, message = "switch name must not be empty"))]
    pub name: String,

    /// Numeric switch id, encoded as the fifth MAC octet. Must be unique
    /// within the lab.
    pub id: u8,

    /// Switch role.
    #[serde(rename = "type")]
    pub kind: SwitchType,

    /// IPv4 subnet served by this switch.
    pub subnet: Ipv4Network,

    /// Whether OVN DHCP options are configured for this subnet.
    #[serde(default)]
    pub dhcp_enable: bool,

    /// Whether this switch is attached to the lab router.
    #[serde(default)]
    pub routed: bool,

    /// Number of ports to autogenerate. Mutually exclusive with `ports`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_count: Option<u32>,

    /// Explicit ordered port list. Mutually exclusive with `port_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub ports: Option<Vec<PortConfig>>,
}

impl SwitchConfig {
    /// Port count for autogeneration, falling back to the VPC default.
    ///
    /// Only meaningful when `ports` is absent; validation guarantees the
    /// result is `Some` in that case.
    #[must_use]
    pub fn resolved_port_count(&self, vpc: &VpcConfig) -> Option<u32> {
        self.port_count.or(vpc.port_count)
    }
}

/// Explicit port descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PortConfig {
    /// Port name, unique within its switch by convention.
    #[validate(length(min = 1, message = "port name must not be empty"))]
    pub name: String,

    /// How the port obtains its address.
    pub addressing: AddressingMode,

    /// Address for `static` ports. Ignored for other modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

fn validate_mac_prefix(value: &str) -> std::result::Result<(), ValidationError> {
    let lower = value.to_ascii_lowercase();
    if !lower.chars().all(|c| c.is_ascii_hexdigit() || c == ':') {
        return Err(field_error(
            "mac_prefix",
            format!("invalid MAC prefix `{value}`: only hex digits and colons are allowed"),
        ));
    }
    let parts: Vec<&str> = lower.split(':').collect();
    if parts.len() != 3 {
        return Err(field_error(
            "mac_prefix",
            format!("MAC prefix `{value}` must have exactly 3 octets"),
        ));
    }
    if parts.iter().any(|part| part.len() != 2) {
        return Err(field_error(
            "mac_prefix",
            format!("every octet of MAC prefix `{value}` must be exactly 2 hex digits"),
        ));
    }
    Ok(())
}

fn field_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

impl LabConfig {
    /// Load a specification from a JSON file and validate it fully.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the file cannot be read or is
    /// not valid JSON for this model, and [`Error::ValidationError`] when
    /// the parsed specification violates a constraint.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read config file {}: {err}",
                path.display()
            ))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            Error::ConfigError(format!("invalid config file {}: {err}", path.display()))
        })?;
        config.validate_spec()?;
        Ok(config)
    }

    /// Validate the full specification.
    ///
    /// Runs the field-level validators plus every cross-field constraint:
    /// port selection (exactly one of `ports`/`port_count`, directly or via
    /// the VPC default), the static-address requirement, and switch id
    /// uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] naming the first violated
    /// constraint. Never partially validates.
    pub fn validate_spec(&self) -> Result<()> {
        self.validate().map_err(flatten_validation_errors)?;

        let mut seen_ids = HashSet::new();
        for switch in &self.switches {
            if !seen_ids.insert(switch.id) {
                return Err(Error::ValidationError(format!(
                    "switch ids must be unique: id {} appears more than once",
                    switch.id
                )));
            }

            match (&switch.ports, switch.port_count) {
                (Some(_), Some(_)) => {
                    return Err(Error::ValidationError(format!(
                        "switch `{}`: cannot specify both `ports` and `port_count`",
                        switch.name
                    )));
                }
                (None, None) if self.vpc.port_count.is_none() => {
                    return Err(Error::ValidationError(format!(
                        "switch `{}`: must specify either `ports` or `port_count` \
                         (and the VPC declares no default port_count)",
                        switch.name
                    )));
                }
                _ => {}
            }

            if let Some(ports) = &switch.ports {
                for port in ports {
                    let missing_ip = port
                        .ip
                        .as_ref()
                        .map_or(true, |ip| ip.trim().is_empty());
                    if port.addressing == AddressingMode::Static && missing_ip {
                        return Err(Error::ValidationError(format!(
                            "switch `{}` port `{}`: an IP address is required when \
                             addressing mode is `static`",
                            switch.name, port.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Collapse validator's nested error map into one specific message.
fn flatten_validation_errors(errors: validator::ValidationErrors) -> Error {
    let mut messages = Vec::new();
    collect_messages(&errors, &mut messages);
    if messages.is_empty() {
        messages.push(errors.to_string());
    }
    Error::ValidationError(messages.join("; "))
}

fn collect_messages(errors: &validator::ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for kind in errors.errors().values() {
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    out.push(
                        err.message
                            .as_ref()
                            .map_or_else(|| err.code.to_string(), ToString::to_string),
                    );
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(nested, out),
            ValidationErrorsKind::List(items) => {
                for nested in items.values() {
                    collect_messages(nested, out);
                }
            }
        }
    }
}
