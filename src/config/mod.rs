//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → bootstrap.toml (loader.rs, optional)
//!     → BOOTSTRAP_* environment overrides (loader.rs)
//!     → command-line flags (main / start-server)
//!     → validation.rs (semantic checks)
//!     → BootstrapConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, finish, ConfigError};
pub use schema::{
    BackendKind, BootstrapConfig, CommandBackendConfig, GatewayConfig, LaunchConfig, LogFormat,
    ObservabilityConfig, OutputConfig, ProvisionConfig, StageConfig,
};
pub use validation::ValidationError;
