//! The served process and its state machine.
//!
//! ```text
//! Starting ──bind ok──▶ Listening ──signal──▶ Terminated(signal)
//!                           │
//!                           └──serve loop exits──▶ Crashed(error)
//! ```
//!
//! `Listening` is the only non-terminal steady state. There is no restart:
//! a crash ends the unit.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::lifecycle::{signals, Shutdown, TerminationSignal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Listening,
    Terminated(TerminationSignal),
    Crashed(String),
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Terminated(_) | ProcessState::Crashed(_))
    }

    pub fn can_transition_to(&self, next: &ProcessState) -> bool {
        matches!(
            (self, next),
            (ProcessState::Starting, ProcessState::Listening)
                | (ProcessState::Starting, ProcessState::Crashed(_))
                | (ProcessState::Listening, ProcessState::Terminated(_))
                | (ProcessState::Listening, ProcessState::Crashed(_))
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Listening => write!(f, "listening"),
            ProcessState::Terminated(signal) => write!(f, "terminated ({signal})"),
            ProcessState::Crashed(reason) => write!(f, "crashed ({reason})"),
        }
    }
}

/// How the served process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Terminated(TerminationSignal),
    Crashed(String),
}

impl ProcessExit {
    /// 0 for a deliberate stop, 1 for a crash.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProcessExit::Terminated(_) => 0,
            ProcessExit::Crashed(_) => 1,
        }
    }

    fn state(&self) -> ProcessState {
        match self {
            ProcessExit::Terminated(signal) => ProcessState::Terminated(*signal),
            ProcessExit::Crashed(reason) => ProcessState::Crashed(reason.clone()),
        }
    }
}

/// Cancellation channel into a running [`ServedProcess`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::UnboundedSender<TerminationSignal>,
}

impl StopHandle {
    /// Ask the process to stop as if it had received a termination signal.
    pub fn stop(&self) {
        let _ = self.tx.send(TerminationSignal::Requested);
    }
}

/// The single running server instance.
pub struct ServedProcess {
    local_addr: SocketAddr,
    state: watch::Sender<ProcessState>,
    server: JoinHandle<std::io::Result<()>>,
    shutdown: Shutdown,
    stop_tx: mpsc::UnboundedSender<TerminationSignal>,
    stop_rx: mpsc::UnboundedReceiver<TerminationSignal>,
    shutdown_timeout: Duration,
}

impl ServedProcess {
    pub(crate) fn new(
        local_addr: SocketAddr,
        state: watch::Sender<ProcessState>,
        server: JoinHandle<std::io::Result<()>>,
        shutdown: Shutdown,
        shutdown_timeout: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        Self {
            local_addr,
            state,
            server,
            shutdown,
            stop_tx,
            stop_rx,
            shutdown_timeout,
        }
    }

    /// Address actually bound (useful when the host resolved to several).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Observe state transitions, including the terminal one.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Serve until SIGTERM/SIGINT, a stop request, or a crash.
    pub async fn wait(self) -> ProcessExit {
        self.run_until(signals::termination()).await
    }

    /// Serve until `termination` resolves, a stop request, or a crash.
    pub async fn run_until<F>(mut self, termination: F) -> ProcessExit
    where
        F: Future<Output = TerminationSignal>,
    {
        tokio::pin!(termination);

        let event = tokio::select! {
            signal = &mut termination => Event::Signal(signal),
            Some(signal) = self.stop_rx.recv() => Event::Signal(signal),
            result = &mut self.server => Event::Exited(result),
        };
        let exit = match event {
            Event::Signal(signal) => self.drain(signal).await,
            Event::Exited(result) => crashed(result),
        };

        match &exit {
            ProcessExit::Terminated(signal) => {
                tracing::info!(signal = %signal, "Server terminated");
            }
            ProcessExit::Crashed(reason) => {
                tracing::error!(reason = %reason, "Server crashed");
            }
        }
        self.transition(exit.state());
        exit
    }

    async fn drain(&mut self, signal: TerminationSignal) -> ProcessExit {
        tracing::info!(signal = %signal, "Termination requested, draining connections");
        self.shutdown.trigger();

        match tokio::time::timeout(self.shutdown_timeout, &mut self.server).await {
            Ok(Ok(Ok(()))) => ProcessExit::Terminated(signal),
            Ok(result) => crashed(result),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Drain timed out, aborting open connections"
                );
                self.server.abort();
                ProcessExit::Terminated(signal)
            }
        }
    }

    fn transition(&self, next: ProcessState) {
        let current = self.state();
        if current.can_transition_to(&next) {
            self.state.send_replace(next);
        } else {
            tracing::error!(from = %current, to = %next, "Ignoring illegal process transition");
        }
    }
}

enum Event {
    Signal(TerminationSignal),
    Exited(Result<std::io::Result<()>, tokio::task::JoinError>),
}

fn crashed(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> ProcessExit {
    match result {
        Ok(Ok(())) => ProcessExit::Crashed("serve loop exited unexpectedly".to_string()),
        Ok(Err(e)) => ProcessExit::Crashed(e.to_string()),
        Err(e) => ProcessExit::Crashed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ProcessState::*;
        assert!(Starting.can_transition_to(&Listening));
        assert!(Listening.can_transition_to(&Terminated(TerminationSignal::Terminate)));
        assert!(Listening.can_transition_to(&Crashed("x".into())));
        assert!(!Listening.can_transition_to(&Starting));
        assert!(!Terminated(TerminationSignal::Interrupt).can_transition_to(&Listening));
        assert!(!Crashed("x".into()).can_transition_to(&Terminated(TerminationSignal::Requested)));
        assert!(!Listening.is_terminal());
        assert!(Crashed("x".into()).is_terminal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessExit::Terminated(TerminationSignal::Terminate).exit_code(), 0);
        assert_eq!(ProcessExit::Crashed("boom".into()).exit_code(), 1);
    }

    #[tokio::test]
    async fn test_server_exit_is_a_crash() {
        let (state, _) = watch::channel(ProcessState::Listening);
        let server = tokio::spawn(async { Err(std::io::Error::other("accept failed")) });
        let process = ServedProcess::new(
            "127.0.0.1:1".parse().unwrap(),
            state,
            server,
            Shutdown::new(),
            Duration::from_secs(1),
        );
        let observer = process.subscribe();

        let exit = process.run_until(std::future::pending()).await;

        assert_eq!(exit, ProcessExit::Crashed("accept failed".into()));
        assert_eq!(*observer.borrow(), ProcessState::Crashed("accept failed".into()));
    }

    #[tokio::test]
    async fn test_stop_handle_terminates() {
        let (state, _) = watch::channel(ProcessState::Listening);
        let shutdown = Shutdown::new();
        let stopped = shutdown.wait();
        let server = tokio::spawn(async move {
            stopped.await;
            Ok(())
        });
        let process = ServedProcess::new(
            "127.0.0.1:1".parse().unwrap(),
            state,
            server,
            shutdown,
            Duration::from_secs(1),
        );
        process.stop_handle().stop();

        let exit = process.run_until(std::future::pending()).await;

        assert_eq!(exit, ProcessExit::Terminated(TerminationSignal::Requested));
    }
}
