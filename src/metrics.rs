//! Prometheus metrics for tasklog.
//!
//! The writer task records one counter, one histogram sample and (on success)
//! the gauges below for every operation it executes. When the server is started
//! with a metrics address, a global Prometheus recorder is installed and the
//! rendered snapshot is served at `GET /metrics`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

/// Counter of operations executed by the writer, labelled by `op`.
pub const OPERATIONS_TOTAL: &str = "tasklog_operations_total";
/// Counter of operations that returned an error, labelled by `op`.
pub const OPERATION_ERRORS_TOTAL: &str = "tasklog_operation_errors_total";
/// Histogram of operation latency in seconds, labelled by `op`.
pub const OPERATION_DURATION_SECONDS: &str = "tasklog_operation_duration_seconds";
/// Gauge of tasks in the log as of the last successful operation.
pub const TASKS: &str = "tasklog_tasks";
/// Gauge of the log file size in bytes as of the last successful write.
pub const LOG_BYTES: &str = "tasklog_log_bytes";

/// Error type for metrics installation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The global metrics recorder has already been installed.
    #[error("metrics recorder already installed")]
    AlreadyInstalled,

    /// The Prometheus recorder could not be built.
    #[error("could not build metrics recorder: {0}")]
    Build(String),
}

/// Cheaply cloneable handle to the installed Prometheus recorder.
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    inner: Arc<PrometheusHandle>,
}

impl MetricsHandle {
    /// Render the current snapshot in Prometheus exposition format.
    pub fn render(&self) -> String {
        self.inner.render()
    }
}

static RECORDER_HANDLE: OnceLock<MetricsHandle> = OnceLock::new();

/// Serializes installation so concurrent callers never both reach the
/// global recorder setter.
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Install the global Prometheus recorder.
///
/// Must run before the first metric is recorded for that metric to be captured.
///
/// # Errors
///
/// Returns [`MetricsError::AlreadyInstalled`] on a second call in the same
/// process, or [`MetricsError::Build`] if the recorder cannot be installed
/// (for example because another global recorder is already set).
pub fn install_recorder() -> Result<MetricsHandle, MetricsError> {
    let _guard = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if RECORDER_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInstalled);
    }
    let prom = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Build(e.to_string()))?;
    let handle = MetricsHandle {
        inner: Arc::new(prom),
    };
    let _ = RECORDER_HANDLE.set(handle.clone());
    Ok(handle)
}

/// The previously installed handle, if any.
pub fn installed_handle() -> Option<MetricsHandle> {
    RECORDER_HANDLE.get().cloned()
}

/// Record the outcome of one writer operation.
pub fn record_operation(op: &'static str, elapsed: Duration, ok: bool) {
    counter!(OPERATIONS_TOTAL, "op" => op).increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "op" => op).record(elapsed.as_secs_f64());
    if !ok {
        counter!(OPERATION_ERRORS_TOTAL, "op" => op).increment(1);
    }
}

/// Record the number of tasks observed in the log.
pub fn record_task_count(count: usize) {
    gauge!(TASKS).set(count as f64);
}

/// Record the size of the log file.
pub fn record_log_bytes(bytes: u64) {
    gauge!(LOG_BYTES).set(bytes as f64);
}

fn metrics_router(handle: MetricsHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move {
                (
                    [(
                        axum::http::header::CONTENT_TYPE,
                        "text/plain; version=0.0.4",
                    )],
                    handle.render(),
                )
            }
        }),
    )
}

/// Bind `addr` and serve `GET /metrics` on a spawned task.
///
/// On bind failure, logs the error and returns a handle that resolves
/// immediately.
pub fn serve_metrics(handle: MetricsHandle, addr: SocketAddr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Failed to bind metrics listener");
                return;
            }
        };
        run_metrics_server(handle, listener).await;
    })
}

/// Serve `GET /metrics` on an already-bound listener.
///
/// Lets tests learn the ephemeral port before the server starts.
pub fn serve_metrics_on_listener(
    handle: MetricsHandle,
    listener: tokio::net::TcpListener,
) -> JoinHandle<()> {
    tokio::spawn(run_metrics_server(handle, listener))
}

async fn run_metrics_server(handle: MetricsHandle, listener: tokio::net::TcpListener) {
    match listener.local_addr() {
        Ok(addr) => tracing::info!(addr = %addr, "Metrics server listening"),
        Err(e) => tracing::warn!(error = %e, "Metrics listener has no local address"),
    }
    if let Err(e) = axum::serve(listener, metrics_router(handle)).await {
        tracing::error!(error = %e, "Metrics server error");
    }
}
