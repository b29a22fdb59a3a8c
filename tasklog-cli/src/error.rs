//! Error types for the `todo` client.
//!
//! `main` wraps [`CliError`] in `anyhow::Result` and adds context per command.

use thiserror::Error;

/// Unified error type for all client operations.
#[derive(Debug, Error)]
pub enum CliError {
    /// The server answered with a non-OK status.
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// The channel could not be configured or connected.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A command-line value is rejected before any request is sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading the CA certificate failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
