//! The bootstrap pipeline as an explicit state machine.
//!
//! ```text
//! Pending → Provisioning → Staging → Launching → Listening → Terminated
//!                │             │          │           └──────→ Crashed
//!                └─────────────┴──────────┴──→ Failed
//! ```
//!
//! Each transition happens only after the previous stage reported success.
//! There is no rollback and no retry: the first error ends the pipeline.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::launch::{AppContext, AppRegistry, LaunchSpec, Launcher, ProcessExit, ServedProcess};
use crate::lifecycle::{signals, TerminationSignal};
use crate::provision::{self, DependencyManifest, PackageManager, Provisioner, RuntimeFlags};
use crate::stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Pending,
    Provisioning,
    Staging,
    Launching,
    Listening,
    Terminated(TerminationSignal),
    Crashed(String),
    /// A stage failed; carries the failing stage's name.
    Failed(&'static str),
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Terminated(_) | PipelineStage::Crashed(_) | PipelineStage::Failed(_)
        )
    }

    pub fn can_advance_to(&self, next: &PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Pending, Provisioning)
                | (Provisioning, Staging)
                | (Staging, Launching)
                | (Launching, Listening)
                | (Listening, Terminated(_))
                | (Listening, Crashed(_))
                | (Provisioning | Staging | Launching, Failed(_))
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Pending => write!(f, "pending"),
            PipelineStage::Provisioning => write!(f, "provisioning"),
            PipelineStage::Staging => write!(f, "staging"),
            PipelineStage::Launching => write!(f, "launching"),
            PipelineStage::Listening => write!(f, "listening"),
            PipelineStage::Terminated(signal) => write!(f, "terminated ({signal})"),
            PipelineStage::Crashed(reason) => write!(f, "crashed ({reason})"),
            PipelineStage::Failed(stage) => write!(f, "failed ({stage})"),
        }
    }
}

/// Provision → stage → launch for one deployable unit.
pub struct Pipeline {
    config: BootstrapConfig,
    manager: Arc<dyn PackageManager>,
    registry: Arc<AppRegistry>,
    stage: watch::Sender<PipelineStage>,
}

impl Pipeline {
    pub fn new(
        config: BootstrapConfig,
        manager: Arc<dyn PackageManager>,
        registry: Arc<AppRegistry>,
    ) -> Self {
        let (stage, _) = watch::channel(PipelineStage::Pending);
        Self {
            config,
            manager,
            registry,
            stage,
        }
    }

    /// Pipeline using the configured package backend and built-in apps.
    pub fn from_config(config: BootstrapConfig) -> Self {
        let manager = provision::package_manager(&config.provision);
        Self::new(config, manager, Arc::new(AppRegistry::with_defaults()))
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStage> {
        self.stage.subscribe()
    }

    /// Run every stage up to `Listening`.
    pub async fn launch(&mut self) -> Result<ServedProcess, BootstrapError> {
        self.advance(PipelineStage::Provisioning)?;
        let env = match self.provision().await {
            Ok(env) => env,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(PipelineStage::Staging)?;
        let staged = match stage::stage(&self.config.stage.source, &self.config.stage.workdir, &env).await {
            Ok(staged) => staged,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.advance(PipelineStage::Launching)?;
        let ctx = AppContext::new(env, staged).with_gateway(self.config.gateway.clone());
        let process = match self.start(ctx).await {
            Ok(process) => process,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(PipelineStage::Listening)?;
        Ok(process)
    }

    /// Drive a listening process to its end and record the terminal stage.
    pub async fn supervise<F>(&mut self, process: ServedProcess, termination: F) -> ProcessExit
    where
        F: Future<Output = TerminationSignal>,
    {
        let exit = process.run_until(termination).await;
        let next = match &exit {
            ProcessExit::Terminated(signal) => PipelineStage::Terminated(*signal),
            ProcessExit::Crashed(reason) => PipelineStage::Crashed(reason.clone()),
        };
        if let Err(e) = self.advance(next) {
            tracing::error!(error = %e, "Pipeline state out of sync");
        }
        exit
    }

    /// Whole pipeline, stopping on `termination`.
    pub async fn run_until<F>(mut self, termination: F) -> Result<ProcessExit, BootstrapError>
    where
        F: Future<Output = TerminationSignal>,
    {
        let process = self.launch().await?;
        Ok(self.supervise(process, termination).await)
    }

    /// Whole pipeline, stopping on SIGTERM/SIGINT.
    pub async fn run(self) -> Result<ProcessExit, BootstrapError> {
        self.run_until(signals::termination()).await
    }

    async fn provision(&self) -> Result<provision::RuntimeEnvironment, BootstrapError> {
        let manifest = DependencyManifest::load(&self.config.provision.manifest)?;
        let provisioner = Provisioner::new(self.manager.clone(), &self.config.provision.target)
            .with_flags(RuntimeFlags {
                unbuffered: self.config.output.unbuffered,
            });
        Ok(provisioner.install(&manifest).await?)
    }

    async fn start(&self, ctx: AppContext) -> Result<ServedProcess, BootstrapError> {
        let spec = LaunchSpec::from_config(&self.config.launch)?;
        let launcher = Launcher::new(spec, self.registry.clone()).with_shutdown_timeout(
            Duration::from_secs(self.config.launch.shutdown_timeout_secs),
        );
        Ok(launcher.start(ctx).await?)
    }

    fn advance(&self, next: PipelineStage) -> Result<(), BootstrapError> {
        let current = self.stage();
        if !current.can_advance_to(&next) {
            return Err(BootstrapError::IllegalTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %current, to = %next, "Pipeline transition");
        self.stage.send_replace(next);
        Ok(())
    }

    fn fail(&self, error: BootstrapError) -> BootstrapError {
        tracing::error!(stage = error.stage(), error = %error, "Pipeline aborted");
        if let Err(e) = self.advance(PipelineStage::Failed(error.stage())) {
            tracing::error!(error = %e, "Pipeline state out of sync");
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_transitions_only() {
        use PipelineStage::*;
        assert!(Pending.can_advance_to(&Provisioning));
        assert!(Provisioning.can_advance_to(&Staging));
        assert!(Staging.can_advance_to(&Launching));
        assert!(Launching.can_advance_to(&Listening));
        assert!(Listening.can_advance_to(&Terminated(TerminationSignal::Terminate)));

        assert!(!Pending.can_advance_to(&Staging));
        assert!(!Provisioning.can_advance_to(&Launching));
        assert!(!Listening.can_advance_to(&Failed("bind")));
        assert!(!Failed("install").can_advance_to(&Provisioning));
        assert!(!Terminated(TerminationSignal::Interrupt).can_advance_to(&Listening));
    }

    #[test]
    fn test_failure_allowed_from_working_stages() {
        use PipelineStage::*;
        for stage in [Provisioning, Staging, Launching] {
            assert!(stage.can_advance_to(&Failed("x")), "{stage}");
        }
        assert!(Failed("x").is_terminal());
        assert!(!Listening.is_terminal());
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_in_provisioning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BootstrapConfig::default();
        config.provision.manifest = dir.path().join("missing.txt");
        config.provision.index_dir = dir.path().to_path_buf();
        config.provision.target = dir.path().join("runtime");

        let mut pipeline = Pipeline::from_config(config);
        let err = pipeline.launch().await.err().unwrap();

        assert_eq!(err.stage(), "install");
        assert_eq!(pipeline.stage(), PipelineStage::Failed("install"));
    }
}
