//! gRPC client wrapper for talking to a tasklog server.
//!
//! Maps wire `Task` messages to [`tasklog::Task`] so callers never see proto
//! types.

use std::path::Path;

use tasklog::Task;
use tasklog::proto::tasks_client::TasksClient;
use tasklog::proto::{AddRequest, TaskId, Void};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::error::CliError;

/// Server-certificate settings for a TLS connection.
#[derive(Debug, Clone)]
pub struct TlsOptions<'a> {
    /// PEM file of the CA that signed the server certificate.
    pub ca_cert: &'a Path,
    /// Name the server certificate must be issued for.
    pub domain: &'a str,
}

/// A wrapper around the generated `TasksClient`.
#[derive(Debug, Clone)]
pub struct Client {
    inner: TasksClient<Channel>,
}

impl Client {
    /// Connect to a tasklog server at `addr` (e.g. `http://[::1]:8888`).
    ///
    /// When `tls` is given the CA certificate is read from disk and the server
    /// is verified against `tls.domain`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Io`] if the CA file cannot be read, or
    /// [`CliError::ConnectionFailed`] if the address is invalid or the
    /// connection cannot be established.
    pub async fn connect(addr: &str, tls: Option<TlsOptions<'_>>) -> Result<Self, CliError> {
        let mut endpoint = Endpoint::from_shared(addr.to_string())
            .map_err(|e| CliError::ConnectionFailed(format!("invalid address {addr}: {e}")))?;

        if let Some(tls) = tls {
            let ca = tokio::fs::read(tls.ca_cert).await?;
            let config = ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(ca))
                .domain_name(tls.domain);
            endpoint = endpoint
                .tls_config(config)
                .map_err(|e| CliError::ConnectionFailed(e.to_string()))?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| CliError::ConnectionFailed(e.to_string()))?;
        tracing::debug!(addr, "connected");
        Ok(Self {
            inner: TasksClient::new(channel),
        })
    }

    /// Add a task with the given text.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Grpc`] on server or transport errors.
    pub async fn add(&mut self, text: String) -> Result<Task, CliError> {
        let task = self
            .inner
            .add(AddRequest { text, done: false })
            .await?
            .into_inner();
        proto_to_task(task)
    }

    /// Fetch every task in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Grpc`] on server or transport errors.
    pub async fn list(&mut self) -> Result<Vec<Task>, CliError> {
        let list = self.inner.list(Void {}).await?.into_inner();
        list.tasks.into_iter().map(proto_to_task).collect()
    }

    /// Mark the task with `id` as done.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidArgument`] for an id of 0 or below without
    /// contacting the server, or [`CliError::Grpc`] on server or transport
    /// errors, including `NOT_FOUND` for an unknown id.
    pub async fn complete(&mut self, id: i32) -> Result<Task, CliError> {
        if id <= 0 {
            return Err(CliError::InvalidArgument(format!(
                "task id must be positive, got {id}"
            )));
        }
        let task = self.inner.complete(TaskId { id }).await?.into_inner();
        proto_to_task(task)
    }
}

fn proto_to_task(task: tasklog::proto::Task) -> Result<Task, CliError> {
    Ok(tasklog::service::proto_to_task(task)?)
}
