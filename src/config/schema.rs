//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bootstrap
//! pipeline. All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the bootstrap unit.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Dependency installation.
    pub provision: ProvisionConfig,

    /// Source tree staging.
    pub stage: StageConfig,

    /// Listener binding and entrypoint.
    pub launch: LaunchConfig,

    /// Output stream policy.
    pub output: OutputConfig,

    /// Settings for the built-in gateway application.
    pub gateway: GatewayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Which package backend the provisioner drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local directory index (`<index>/<name>/<version>/`).
    #[default]
    Index,
    /// External installer command.
    Command,
}

/// Provisioner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Path to the dependency manifest.
    pub manifest: PathBuf,

    /// Directory the runtime environment is installed into.
    pub target: PathBuf,

    /// Package backend.
    pub backend: BackendKind,

    /// Package index root (backend = "index").
    pub index_dir: PathBuf,

    /// External installer settings (backend = "command").
    pub command: CommandBackendConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("requirements.txt"),
            target: PathBuf::from("runtime"),
            backend: BackendKind::Index,
            index_dir: PathBuf::from("package-index"),
            command: CommandBackendConfig::default(),
        }
    }
}

/// External installer command.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandBackendConfig {
    /// Installer executable.
    pub program: String,

    /// Arguments that upgrade the installer itself. Required for this backend.
    pub upgrade_args: Vec<String>,

    /// Per-requirement install arguments (supports placeholders).
    pub install_args: Vec<String>,

    /// Per-command timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CommandBackendConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            upgrade_args: Vec::new(),
            install_args: vec![
                "--target".to_string(),
                "{packages}".to_string(),
                "--cache-dir".to_string(),
                "{cache}".to_string(),
                "{requirement}".to_string(),
            ],
            timeout_secs: 300,
        }
    }
}

/// Staging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StageConfig {
    /// Application source tree.
    pub source: PathBuf,

    /// Working location the source is copied into.
    pub workdir: PathBuf,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            workdir: PathBuf::from("app-root"),
        }
    }
}

/// Launcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Host to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port to bind, 1-65535.
    pub port: u16,

    /// Entrypoint reference, `module.path:object`.
    pub entrypoint: String,

    /// Maximum time to drain connections after a termination signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            entrypoint: "app.main:app".to_string(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Output stream policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Flush standard output after every write.
    pub unbuffered: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { unbuffered: true }
    }
}

/// Built-in gateway application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upstream probed by `GET /service/ping`.
    pub service_ping_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Allowed CORS origins; `"*"` allows any.
    pub cors_allow_origins: Vec<String>,

    /// Supabase project URL backing the `/users` routes.
    pub supabase_url: Option<String>,

    /// Supabase anon API key.
    pub supabase_anon_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_ping_url: "http://service:8000/ping".to_string(),
            request_timeout_secs: 30,
            cors_allow_origins: vec!["*".to_string()],
            supabase_url: None,
            supabase_anon_key: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
