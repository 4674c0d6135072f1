//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, timeouts)
//! - Check the entrypoint reference is well formed
//! - Check the selected package backend is usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BootstrapConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{BackendKind, BootstrapConfig};
use crate::launch::EntrypointRef;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &BootstrapConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.launch.host.trim().is_empty() {
        errors.push(ValidationError::new("launch.host", "must not be empty"));
    }
    if config.launch.port == 0 {
        errors.push(ValidationError::new("launch.port", "must be in 1..=65535"));
    }
    if let Err(e) = config.launch.entrypoint.parse::<EntrypointRef>() {
        errors.push(ValidationError::new("launch.entrypoint", e.to_string()));
    }

    if config.provision.target.file_name().is_none() {
        errors.push(ValidationError::new(
            "provision.target",
            "must name a directory",
        ));
    }
    match config.provision.backend {
        BackendKind::Index => {
            if config.provision.index_dir.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "provision.index_dir",
                    "required when backend = \"index\"",
                ));
            }
        }
        BackendKind::Command => {
            if config.provision.command.program.trim().is_empty() {
                errors.push(ValidationError::new(
                    "provision.command.program",
                    "required when backend = \"command\"",
                ));
            }
            // Without an upgrade command the installer is never refreshed.
            if config.provision.command.upgrade_args.is_empty() {
                errors.push(ValidationError::new(
                    "provision.command.upgrade_args",
                    "required when backend = \"command\"",
                ));
            }
            if config.provision.command.timeout_secs == 0 {
                errors.push(ValidationError::new(
                    "provision.command.timeout_secs",
                    "must be greater than 0",
                ));
            }
        }
    }

    if config.gateway.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "gateway.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    if let Err(e) = url::Url::parse(&config.gateway.service_ping_url) {
        errors.push(ValidationError::new(
            "gateway.service_ping_url",
            format!("invalid URL: {e}"),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address like 0.0.0.0:9090",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
