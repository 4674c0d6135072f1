//! Launcher subsystem.
//!
//! # Data Flow
//! ```text
//! LaunchSpec + AppContext
//!     → entrypoint.rs (module in staged tree, object in registry)
//!     → listener.rs (bind host:port, once)
//!     → process.rs (serve loop in a task, state machine, stop handle)
//!     → ServedProcess (Listening)
//! ```
//!
//! # Design Decisions
//! - The entrypoint is resolved before any socket is bound
//! - Bind failures are returned, never retried
//! - Shutdown is a transition on the process, driven by a signal or a
//!   stop handle

pub mod entrypoint;
pub mod listener;
pub mod process;
pub mod spec;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;

pub use entrypoint::{AppContext, AppFactory, AppRegistry, EntrypointError};
pub use listener::BindError;
pub use process::{ProcessExit, ProcessState, ServedProcess, StopHandle};
pub use spec::{EntrypointRef, LaunchSpec, LaunchSpecError};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Entrypoint(#[from] EntrypointError),
    #[error(transparent)]
    Bind(#[from] BindError),
}

/// Starts the served process for one [`LaunchSpec`].
pub struct Launcher {
    spec: LaunchSpec,
    registry: Arc<AppRegistry>,
    shutdown_timeout: Duration,
}

impl Launcher {
    pub fn new(spec: LaunchSpec, registry: Arc<AppRegistry>) -> Self {
        Self {
            spec,
            registry,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Upper bound on connection draining after a stop request.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Resolve the entrypoint, bind, and start serving.
    ///
    /// Returns once the process is `Listening`; the serve loop runs in a
    /// background task owned by the returned [`ServedProcess`].
    pub async fn start(self, ctx: AppContext) -> Result<ServedProcess, LaunchError> {
        let started = Instant::now();
        let (state, _) = watch::channel(ProcessState::Starting);

        tracing::info!(
            entrypoint = %self.spec.entrypoint(),
            host = %self.spec.host(),
            port = self.spec.port(),
            unbuffered = ctx.env.flags().unbuffered,
            "Starting server"
        );

        let app = self.registry.resolve(self.spec.entrypoint(), &ctx)?;
        let listener = listener::bind(&self.spec).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BindError::Io {
                addr: SocketAddr::from(([0, 0, 0, 0], self.spec.port())),
                source,
            })?;

        let shutdown = Shutdown::new();
        let stopped = shutdown.wait();
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(stopped)
            .await
        });

        state.send_replace(ProcessState::Listening);
        metrics::record_stage("launching", started);
        tracing::info!(
            address = %local_addr,
            entrypoint = %self.spec.entrypoint(),
            "Listening for connections"
        );

        Ok(ServedProcess::new(
            local_addr,
            state,
            server,
            shutdown,
            self.shutdown_timeout,
        ))
    }
}
