//! Container bootstrap for a Python-style web gateway service.
//!
//! Provisions a runtime environment from a dependency manifest, stages the
//! application source into its working directory, and serves the configured
//! entrypoint over HTTP until a termination signal arrives.

pub mod config;
pub mod error;
pub mod gateway;
pub mod launch;
pub mod lifecycle;
pub mod observability;
pub mod provision;
pub mod stage;
pub mod tree;

pub use config::BootstrapConfig;
pub use error::BootstrapError;
pub use launch::{AppRegistry, Launcher, ProcessExit, ServedProcess};
pub use lifecycle::{Pipeline, PipelineStage, Shutdown};
pub use provision::{Provisioner, RuntimeEnvironment};
