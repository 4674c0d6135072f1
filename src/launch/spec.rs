//! Launch specification: what to bind and what to serve.

use std::fmt;
use std::str::FromStr;

use crate::config::LaunchConfig;
use crate::launch::entrypoint::EntrypointError;
use crate::launch::listener::BindError;

/// Reference to a server application: `module.path:object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntrypointRef {
    module: String,
    object: String,
}

impl EntrypointRef {
    /// Dotted module path, e.g. `app.main`.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Object name within the module, e.g. `app`.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// Module path segments, e.g. `["app", "main"]`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.module.split('.')
    }
}

impl fmt::Display for EntrypointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.object)
    }
}

impl FromStr for EntrypointRef {
    type Err = EntrypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| EntrypointError::Malformed {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (module, object) = s
            .split_once(':')
            .ok_or_else(|| malformed("expected module.path:object"))?;

        if module.is_empty() || !module.split('.').all(is_identifier) {
            return Err(malformed("invalid module path"));
        }
        if !is_identifier(object) {
            return Err(malformed("invalid object name"));
        }

        Ok(Self {
            module: module.to_string(),
            object: object.to_string(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Host/port binding plus entrypoint. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    host: String,
    port: u16,
    entrypoint: EntrypointRef,
}

/// Why a [`LaunchSpec`] could not be built.
#[derive(Debug, thiserror::Error)]
pub enum LaunchSpecError {
    #[error(transparent)]
    Entrypoint(#[from] EntrypointError),
    #[error(transparent)]
    Bind(#[from] BindError),
}

impl LaunchSpec {
    pub fn new(host: impl Into<String>, port: u16, entrypoint: EntrypointRef) -> Result<Self, BindError> {
        let host = host.into();
        if port == 0 {
            return Err(BindError::InvalidPort { port });
        }
        if host.trim().is_empty() {
            return Err(BindError::InvalidAddress {
                host,
                port,
                reason: "empty host".to_string(),
            });
        }
        Ok(Self {
            host,
            port,
            entrypoint,
        })
    }

    pub fn from_config(config: &LaunchConfig) -> Result<Self, LaunchSpecError> {
        let entrypoint = config.entrypoint.parse()?;
        Ok(Self::new(config.host.clone(), config.port, entrypoint)?)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn entrypoint(&self) -> &EntrypointRef {
        &self.entrypoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entrypoint() {
        let entry: EntrypointRef = "app.main:app".parse().unwrap();
        assert_eq!(entry.module(), "app.main");
        assert_eq!(entry.object(), "app");
        assert_eq!(entry.segments().collect::<Vec<_>>(), vec!["app", "main"]);
        assert_eq!(entry.to_string(), "app.main:app");
    }

    #[test]
    fn test_reject_malformed_entrypoints() {
        for bad in ["app.main", ":app", "app..main:app", "app.main:", "app/main:app", "1app:app"] {
            assert!(
                matches!(bad.parse::<EntrypointRef>(), Err(EntrypointError::Malformed { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_port_zero_rejected() {
        let entry: EntrypointRef = "app.main:app".parse().unwrap();
        assert!(matches!(
            LaunchSpec::new("0.0.0.0", 0, entry),
            Err(BindError::InvalidPort { port: 0 })
        ));
    }

    #[test]
    fn test_from_default_config() {
        let spec = LaunchSpec::from_config(&LaunchConfig::default()).unwrap();
        assert_eq!(spec.host(), "0.0.0.0");
        assert_eq!(spec.port(), 8000);
        assert_eq!(spec.entrypoint().to_string(), "app.main:app");
    }
}
