//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGTERM and SIGINT
//! - Translate the first one received into a [`TerminationSignal`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - If the SIGTERM handler cannot be installed, Ctrl+C still works

use std::fmt;
use std::future::Future;

/// Why the served process was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// Stopped through a [`StopHandle`](crate::launch::StopHandle).
    Requested,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => write!(f, "SIGINT"),
            TerminationSignal::Terminate => write!(f, "SIGTERM"),
            TerminationSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// The SIGTERM handler is registered when this is called, not when the
/// future is first polled, so a signal sent during startup is not lost.
pub fn termination() -> impl Future<Output = TerminationSignal> + Send + 'static {
    #[cfg(unix)]
    let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        #[cfg(unix)]
        {
            match sigterm {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => TerminationSignal::Terminate,
                        _ = interrupt() => TerminationSignal::Interrupt,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    interrupt().await;
                    TerminationSignal::Interrupt
                }
            }
        }

        #[cfg(not(unix))]
        {
            interrupt().await;
            TerminationSignal::Interrupt
        }
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
