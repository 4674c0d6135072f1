//! gateway-bootstrap
//!
//! Brings a web gateway service from a fresh container to a listening
//! HTTP server.
//!
//! # Architecture Overview
//!
//! ```text
//!   requirements.txt          source tree                 host:port
//!          │                       │                          │
//!          ▼                       ▼                          ▼
//!   ┌─────────────┐         ┌─────────────┐          ┌──────────────┐
//!   │  provision  │────────▶│    stage    │─────────▶│    launch    │
//!   │ (atomic env)│  env    │ (copy tree) │  staged  │ (entrypoint, │
//!   └─────────────┘         └─────────────┘          │  bind, serve)│
//!                                                    └──────┬───────┘
//!                                                           │
//!                                       SIGTERM/SIGINT ────▶│ drain → exit
//!
//!   Cross-cutting: config (TOML + BOOTSTRAP_* env), logging, metrics
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use gateway_bootstrap::config::{self, BootstrapConfig};
use gateway_bootstrap::error::BootstrapError;
use gateway_bootstrap::launch::AppRegistry;
use gateway_bootstrap::lifecycle::startup;
use gateway_bootstrap::observability::{logging, metrics};
use gateway_bootstrap::provision::RuntimeEnvironment;

#[derive(Parser)]
#[command(name = "gateway-bootstrap")]
#[command(about = "Provision, stage and serve the gateway application", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "BOOTSTRAP_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the dependency manifest into the runtime environment
    Provision {
        /// Manifest to install
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Runtime environment location
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// Copy the application source into its working directory
    Stage {
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Runtime environment provisioned earlier
        #[arg(long)]
        runtime: Option<PathBuf>,
    },
    /// Serve an already provisioned and staged application
    Serve(LaunchArgs),
    /// Provision, stage and serve in order
    Run(LaunchArgs),
}

#[derive(clap::Args)]
struct LaunchArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Application reference, `module.path:object`
    entrypoint: Option<String>,
}

impl LaunchArgs {
    fn apply(&self, config: &mut BootstrapConfig) {
        if let Some(host) = &self.host {
            config.launch.host = host.clone();
        }
        if let Some(port) = self.port {
            config.launch.port = port;
        }
        if let Some(entrypoint) = &self.entrypoint {
            config.launch.entrypoint = entrypoint.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match prepare(&cli) {
        Ok(config) => config,
        Err(e) => return startup::failure(&e),
    };

    match cli.command {
        Command::Provision { .. } => {
            init_observability(&config, config.output.unbuffered);
            match startup::provision(&config).await {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => startup::failure(&e),
            }
        }
        Command::Stage { .. } => {
            init_observability(&config, config.output.unbuffered);
            match startup::stage_only(&config).await {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => startup::failure(&e),
            }
        }
        Command::Serve(_) => {
            // The environment records the buffering policy it was provisioned with.
            let unbuffered = RuntimeEnvironment::open(&config.provision.target)
                .map(|env| env.flags().unbuffered)
                .unwrap_or(config.output.unbuffered);
            init_observability(&config, unbuffered);

            let outcome = startup::serve(&config, Arc::new(AppRegistry::with_defaults())).await;
            startup::exit_code(&outcome)
        }
        Command::Run(_) => {
            init_observability(&config, config.output.unbuffered);

            let outcome = startup::run(config).await;
            startup::exit_code(&outcome)
        }
    }
}

/// Defaults, file, environment, then command-line flags; validated last.
fn prepare(cli: &Cli) -> Result<BootstrapConfig, BootstrapError> {
    let mut config = config::load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Provision { manifest, target } => {
            if let Some(manifest) = manifest {
                config.provision.manifest = manifest.clone();
            }
            if let Some(target) = target {
                config.provision.target = target.clone();
            }
        }
        Command::Stage {
            source,
            workdir,
            runtime,
        } => {
            if let Some(source) = source {
                config.stage.source = source.clone();
            }
            if let Some(workdir) = workdir {
                config.stage.workdir = workdir.clone();
            }
            if let Some(runtime) = runtime {
                config.provision.target = runtime.clone();
            }
        }
        Command::Serve(args) | Command::Run(args) => args.apply(&mut config),
    }

    Ok(config::finish(config)?)
}

fn init_observability(config: &BootstrapConfig, unbuffered: bool) {
    logging::init_logging(&config.observability, unbuffered);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.launch.host,
        port = config.launch.port,
        entrypoint = %config.launch.entrypoint,
        "gateway-bootstrap starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}
