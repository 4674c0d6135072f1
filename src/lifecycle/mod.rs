//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline (pipeline.rs):
//!     Pending → Provisioning → Staging → Launching → Listening → Terminated | Crashed
//!
//! Startup (startup.rs):
//!     Command → single stage or whole pipeline → exit status
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Terminate the served process
//! ```
//!
//! # Design Decisions
//! - Stages run strictly in order; the first failure ends the pipeline
//! - Shutdown has timeout: forced exit after deadline
//! - No restart after a crash

pub mod pipeline;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use pipeline::{Pipeline, PipelineStage};
pub use shutdown::Shutdown;
pub use signals::TerminationSignal;
