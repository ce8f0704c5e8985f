//! Errors surfaced by the demonstration programs.

use std::io;
use std::sync::Arc;

use rosbridge_client::ClientError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Failures that end a demo run.
#[derive(Debug, Error)]
pub enum DemoError {
    /// Command-line arguments were rejected, or help was requested.
    #[error("{0}")]
    Usage(clap::Error),
    /// Layered configuration could not be resolved.
    #[error("failed to load configuration: {0}")]
    Configuration(Arc<ortho_config::OrthoError>),
    /// The tracing subscriber could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The client reported a failure.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Program output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
