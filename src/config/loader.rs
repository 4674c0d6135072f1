//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::BootstrapConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_HOST: &str = "BOOTSTRAP_HOST";
pub const ENV_PORT: &str = "BOOTSTRAP_PORT";
pub const ENV_ENTRYPOINT: &str = "BOOTSTRAP_ENTRYPOINT";
pub const ENV_UNBUFFERED: &str = "BOOTSTRAP_UNBUFFERED";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then the TOML file (if any), then
/// `BOOTSTRAP_*` and `SUPABASE_*` environment overrides.
///
/// The result is not validated yet; callers apply command-line overrides
/// first and then call [`finish`].
pub fn load_config(path: Option<&Path>) -> Result<BootstrapConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => BootstrapConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Validate a fully assembled configuration.
pub fn finish(config: BootstrapConfig) -> Result<BootstrapConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply host/port/entrypoint/buffering and Supabase overrides from `lookup`.
pub fn apply_env_overrides<F>(config: &mut BootstrapConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_HOST) {
        config.launch.host = host;
    }
    if let Some(port) = lookup(ENV_PORT) {
        config.launch.port = port.trim().parse().map_err(|_| ConfigError::Env {
            var: ENV_PORT,
            value: port.clone(),
        })?;
    }
    if let Some(entrypoint) = lookup(ENV_ENTRYPOINT) {
        config.launch.entrypoint = entrypoint;
    }
    if let Some(value) = lookup(ENV_UNBUFFERED) {
        config.output.unbuffered = parse_flag(&value).ok_or(ConfigError::Env {
            var: ENV_UNBUFFERED,
            value,
        })?;
    }
    // Empty values count as unset.
    if let Some(url) = lookup(ENV_SUPABASE_URL).filter(|v| !v.trim().is_empty()) {
        config.gateway.supabase_url = Some(url);
    }
    if let Some(key) = lookup(ENV_SUPABASE_ANON_KEY).filter(|v| !v.trim().is_empty()) {
        config.gateway.supabase_anon_key = Some(key);
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BootstrapConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                (ENV_HOST, "127.0.0.1"),
                (ENV_PORT, "9000"),
                (ENV_ENTRYPOINT, "svc.main:app"),
                (ENV_UNBUFFERED, "0"),
            ]),
        )
        .unwrap();

        assert_eq!(config.launch.host, "127.0.0.1");
        assert_eq!(config.launch.port, 9000);
        assert_eq!(config.launch.entrypoint, "svc.main:app");
        assert!(!config.output.unbuffered);
    }

    #[test]
    fn test_supabase_settings_from_env() {
        let mut config = BootstrapConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                (ENV_SUPABASE_URL, "https://project.supabase.co"),
                (ENV_SUPABASE_ANON_KEY, ""),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.gateway.supabase_url.as_deref(),
            Some("https://project.supabase.co")
        );
        assert_eq!(config.gateway.supabase_anon_key, None);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = BootstrapConfig::default();
        let err = apply_env_overrides(&mut config, lookup(&[(ENV_PORT, "70000")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_PORT, .. }));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.toml");
        fs::write(
            &path,
            "[launch]\nport = 8080\n\n[provision]\nbackend = \"command\"\n\n[provision.command]\nprogram = \"installer\"\nupgrade_args = [\"self-update\"]\n",
        )
        .unwrap();

        let config = finish(load_config(Some(&path)).unwrap()).unwrap();

        assert_eq!(config.launch.port, 8080);
        assert_eq!(config.launch.host, "0.0.0.0");
        assert_eq!(config.provision.command.program, "installer");
        assert_eq!(config.provision.command.upgrade_args, vec!["self-update".to_string()]);
        assert_eq!(config.provision.command.timeout_secs, 300);
    }

    #[test]
    fn test_validation_errors_surface() {
        let mut config = BootstrapConfig::default();
        config.launch.port = 0;
        let err = finish(config).unwrap_err();
        assert!(err.to_string().contains("launch.port"));
    }
}
