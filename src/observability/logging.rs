//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Apply the output-stream policy to the log writer
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON format for production, pretty format for development
//! - Unbuffered mode flushes stdout after every write so collected logs keep
//!   real-time order

use std::io::{self, Write};

use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Makes stdout writers that follow the buffering policy.
#[derive(Debug, Clone, Copy)]
pub struct StdoutPolicy {
    unbuffered: bool,
}

impl StdoutPolicy {
    pub fn new(unbuffered: bool) -> Self {
        Self { unbuffered }
    }

    pub fn is_unbuffered(&self) -> bool {
        self.unbuffered
    }
}

impl<'a> MakeWriter<'a> for StdoutPolicy {
    type Writer = PolicyWriter<io::Stdout>;

    fn make_writer(&'a self) -> Self::Writer {
        PolicyWriter {
            inner: io::stdout(),
            unbuffered: self.unbuffered,
        }
    }
}

/// Writer that optionally flushes after each write.
pub struct PolicyWriter<W> {
    inner: W,
    unbuffered: bool,
}

impl<W: Write> PolicyWriter<W> {
    pub fn new(inner: W, unbuffered: bool) -> Self {
        Self { inner, unbuffered }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for PolicyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if self.unbuffered {
            self.inner.flush()?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &ObservabilityConfig, unbuffered: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "gateway_bootstrap={level},start_server={level},tower_http={level}",
            level = config.log_level
        ))
    });
    let writer = StdoutPolicy::new(unbuffered);

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer().with_writer(writer)), None),
        LogFormat::Json => (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(writer)),
        ),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init();
}
