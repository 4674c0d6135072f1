//! Launch command: serve an entrypoint from an already staged tree.
//!
//! `start-server --host 0.0.0.0 --port 8000 app.main:app`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use gateway_bootstrap::config::{self, BootstrapConfig};
use gateway_bootstrap::error::BootstrapError;
use gateway_bootstrap::launch::AppRegistry;
use gateway_bootstrap::lifecycle::startup;
use gateway_bootstrap::observability::logging;
use gateway_bootstrap::provision::RuntimeEnvironment;

#[derive(Parser)]
#[command(name = "start-server")]
#[command(about = "Serve an application entrypoint over HTTP", long_about = None)]
struct Cli {
    #[arg(long, env = "BOOTSTRAP_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "BOOTSTRAP_PORT", default_value_t = 8000)]
    port: u16,

    /// Application reference, `module.path:object`
    #[arg(env = "BOOTSTRAP_ENTRYPOINT")]
    entrypoint: String,

    /// TOML configuration file.
    #[arg(short, long, env = "BOOTSTRAP_CONFIG")]
    config: Option<PathBuf>,

    /// Provisioned runtime environment
    #[arg(long)]
    runtime: Option<PathBuf>,

    /// Staged application tree
    #[arg(long)]
    workdir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match prepare(cli) {
        Ok(config) => config,
        Err(e) => return startup::failure(&e),
    };

    let unbuffered = RuntimeEnvironment::open(&config.provision.target)
        .map(|env| env.flags().unbuffered)
        .unwrap_or(config.output.unbuffered);
    logging::init_logging(&config.observability, unbuffered);

    tracing::info!(
        host = %config.launch.host,
        port = config.launch.port,
        entrypoint = %config.launch.entrypoint,
        "start-server starting"
    );

    let outcome = startup::serve(&config, Arc::new(AppRegistry::with_defaults())).await;
    startup::exit_code(&outcome)
}

fn prepare(cli: Cli) -> Result<BootstrapConfig, BootstrapError> {
    let mut config = config::load_config(cli.config.as_deref())?;

    config.launch.host = cli.host;
    config.launch.port = cli.port;
    config.launch.entrypoint = cli.entrypoint;
    if let Some(runtime) = cli.runtime {
        config.provision.target = runtime;
    }
    if let Some(workdir) = cli.workdir {
        config.stage.workdir = workdir;
    }

    Ok(config::finish(config)?)
}
