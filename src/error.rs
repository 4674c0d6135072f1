//! Top-level bootstrap error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::launch::{BindError, EntrypointError, LaunchError, LaunchSpecError};
use crate::provision::environment::EnvironmentError;
use crate::provision::{InstallError, ManifestError};
use crate::stage::StageError;

/// Any failure that aborts the pipeline. Every variant is fatal.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("install stage failed: {0}")]
    Install(#[from] InstallError),

    #[error("install stage failed: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("staging failed: {0}")]
    Stage(#[from] StageError),

    #[error("entrypoint resolution failed: {0}")]
    Entrypoint(#[from] EntrypointError),

    #[error("bind failed: {0}")]
    Bind(#[from] BindError),

    #[error("illegal pipeline transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

impl BootstrapError {
    /// Name of the stage that failed, for operator diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            BootstrapError::Config(_) => "config",
            BootstrapError::Install(_) | BootstrapError::Environment(_) => "install",
            BootstrapError::Stage(_) => "stage",
            BootstrapError::Entrypoint(_) => "entrypoint",
            BootstrapError::Bind(_) => "bind",
            BootstrapError::IllegalTransition { .. } => "pipeline",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::IllegalTransition { .. } => 1,
            BootstrapError::Config(_) => 2,
            BootstrapError::Install(_) | BootstrapError::Environment(_) => 3,
            BootstrapError::Stage(_) => 4,
            BootstrapError::Entrypoint(_) => 5,
            BootstrapError::Bind(_) => 6,
        }
    }
}

impl From<ManifestError> for BootstrapError {
    fn from(e: ManifestError) -> Self {
        BootstrapError::Install(InstallError::Manifest(e))
    }
}

impl From<LaunchError> for BootstrapError {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Entrypoint(e) => BootstrapError::Entrypoint(e),
            LaunchError::Bind(e) => BootstrapError::Bind(e),
        }
    }
}

impl From<LaunchSpecError> for BootstrapError {
    fn from(e: LaunchSpecError) -> Self {
        match e {
            LaunchSpecError::Entrypoint(e) => BootstrapError::Entrypoint(e),
            LaunchSpecError::Bind(e) => BootstrapError::Bind(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn test_stages_have_distinct_exit_codes() {
        let addr: SocketAddr = "0.0.0.0:8000".parse().unwrap();
        let errors = [
            BootstrapError::Install(InstallError::CacheNotEvicted { path: "c".into() }),
            BootstrapError::Entrypoint(EntrypointError::Malformed {
                reference: "x".into(),
                reason: "y".into(),
            }),
            BootstrapError::Bind(BindError::AddressInUse { addr }),
        ];

        let codes: Vec<u8> = errors.iter().map(BootstrapError::exit_code).collect();
        assert_eq!(codes, vec![3, 5, 6]);
        assert!(errors[2].to_string().starts_with("bind failed"));
        assert_eq!(errors[0].stage(), "install");
    }
}
