//! Startup orchestration for each command.
//!
//! # Responsibilities
//! - Run a single stage (`provision`, `stage`) against existing state
//! - Serve an already provisioned and staged unit
//! - Run the whole pipeline
//! - Turn the outcome into an exit status and an operator diagnostic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Single stages reuse what earlier stages left on disk

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::launch::{AppContext, AppRegistry, LaunchSpec, Launcher, ProcessExit};
use crate::lifecycle::{signals, Pipeline};
use crate::provision::{self, DependencyManifest, Provisioner, RuntimeEnvironment, RuntimeFlags};
use crate::stage::{self, StagedTree};

/// Install the manifest into the configured target.
pub async fn provision(config: &BootstrapConfig) -> Result<RuntimeEnvironment, BootstrapError> {
    let manifest = DependencyManifest::load(&config.provision.manifest)?;
    let provisioner = Provisioner::new(
        provision::package_manager(&config.provision),
        &config.provision.target,
    )
    .with_flags(RuntimeFlags {
        unbuffered: config.output.unbuffered,
    });
    let env = provisioner.install(&manifest).await?;
    tracing::info!(
        target = %env.root().display(),
        packages = env.packages().len(),
        digest = env.digest(),
        "Runtime environment ready"
    );
    Ok(env)
}

/// Stage the source tree against an environment provisioned earlier.
pub async fn stage_only(config: &BootstrapConfig) -> Result<StagedTree, BootstrapError> {
    let env = RuntimeEnvironment::open(&config.provision.target)?;
    let staged = stage::stage(&config.stage.source, &config.stage.workdir, &env).await?;
    tracing::info!(
        workdir = %staged.root().display(),
        files = staged.files(),
        "Application staged"
    );
    Ok(staged)
}

/// Launch an already provisioned and staged unit and wait for it to stop.
pub async fn serve(
    config: &BootstrapConfig,
    registry: Arc<AppRegistry>,
) -> Result<ProcessExit, BootstrapError> {
    let env = RuntimeEnvironment::open(&config.provision.target)?;
    let staged = StagedTree::open(&config.stage.workdir)?;
    let spec = LaunchSpec::from_config(&config.launch)?;

    let termination = signals::termination();
    let process = Launcher::new(spec, registry)
        .with_shutdown_timeout(Duration::from_secs(config.launch.shutdown_timeout_secs))
        .start(AppContext::new(env, staged).with_gateway(config.gateway.clone()))
        .await?;

    Ok(process.run_until(termination).await)
}

/// Provision, stage and launch in order, then serve until a signal.
pub async fn run(config: BootstrapConfig) -> Result<ProcessExit, BootstrapError> {
    Pipeline::from_config(config).run().await
}

/// Map an outcome to the process exit status, reporting failures.
pub fn exit_code(outcome: &Result<ProcessExit, BootstrapError>) -> ExitCode {
    match outcome {
        Ok(exit) => {
            match exit {
                ProcessExit::Terminated(signal) => {
                    tracing::info!(signal = %signal, "Shutdown complete")
                }
                ProcessExit::Crashed(reason) => {
                    tracing::error!(reason = %reason, "Application crashed")
                }
            }
            ExitCode::from(exit.exit_code())
        }
        Err(e) => failure(e),
    }
}

/// Report a fatal error and return its exit status.
pub fn failure(error: &BootstrapError) -> ExitCode {
    tracing::error!(stage = error.stage(), error = %error, "Bootstrap failed");
    eprintln!("gateway-bootstrap: {error}");
    ExitCode::from(error.exit_code())
}
