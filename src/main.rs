use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use tasklog::proto::tasks_server::TasksServer;
use tasklog::{TaskService, TasklogService, spawn_writer};

/// Optional TLS configuration parsed from environment variables.
///
/// Present only when `TASKLOG_TLS_CERT` and `TASKLOG_TLS_KEY` are both set.
#[derive(Debug, Clone, PartialEq)]
struct TlsConfig {
    /// Path to the PEM-encoded server certificate file.
    cert_path: PathBuf,
    /// Path to the PEM-encoded server private key file.
    key_path: PathBuf,
}

/// Server configuration parsed from environment variables.
///
/// # Environment Variables
///
/// | Variable                   | Required | Default     | Description                      |
/// |----------------------------|----------|-------------|----------------------------------|
/// | `TASKLOG_DATA`             | No       | `mydb.pb`   | Path to the task log file        |
/// | `TASKLOG_LISTEN`           | No       | `[::]:8888` | Socket address to listen on      |
/// | `TASKLOG_CHANNEL_CAPACITY` | No       | `64`        | Writer request channel bound     |
/// | `TASKLOG_METRICS_LISTEN`   | No       | --          | Enables `/metrics` on this addr  |
/// | `TASKLOG_TLS_CERT`         | No       | --          | PEM cert path (enables TLS)      |
/// | `TASKLOG_TLS_KEY`          | No       | --          | PEM key path (required with CERT)|
#[derive(Debug, Clone, PartialEq)]
struct Config {
    /// Path to the task log file.
    data_path: PathBuf,
    /// Socket address the gRPC server listens on.
    listen_addr: SocketAddr,
    /// Bound on the writer task's request channel.
    channel_capacity: NonZeroUsize,
    /// Socket address for the Prometheus endpoint. `None` disables metrics.
    metrics_addr: Option<SocketAddr>,
    /// Optional TLS configuration. `None` means plaintext mode.
    tls: Option<TlsConfig>,
}

/// Default log file path when `TASKLOG_DATA` is not set.
const DEFAULT_DATA_PATH: &str = "mydb.pb";

/// Default socket address when `TASKLOG_LISTEN` is not set.
const DEFAULT_LISTEN_ADDR: SocketAddr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 8888);

/// Default writer channel capacity when `TASKLOG_CHANNEL_CAPACITY` is not set.
const DEFAULT_CHANNEL_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).unwrap();

impl Config {
    /// Parse server configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Err(String)` if:
    /// - `TASKLOG_LISTEN` or `TASKLOG_METRICS_LISTEN` is set but not a valid `SocketAddr`
    /// - `TASKLOG_CHANNEL_CAPACITY` is set but not a valid nonzero `usize`
    /// - `TASKLOG_TLS_CERT` is set without `TASKLOG_TLS_KEY` (or vice versa)
    fn from_env() -> Result<Config, String> {
        let data_path = std::env::var("TASKLOG_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_PATH));

        let listen_addr = match std::env::var("TASKLOG_LISTEN") {
            Ok(val) => val
                .parse::<SocketAddr>()
                .map_err(|e| format!("TASKLOG_LISTEN is not a valid socket address: {e}"))?,
            Err(_) => DEFAULT_LISTEN_ADDR,
        };

        let channel_capacity = match std::env::var("TASKLOG_CHANNEL_CAPACITY") {
            Ok(val) => {
                let raw: usize = val
                    .parse()
                    .map_err(|e| format!("TASKLOG_CHANNEL_CAPACITY is not a valid usize: {e}"))?;
                NonZeroUsize::new(raw)
                    .ok_or_else(|| "TASKLOG_CHANNEL_CAPACITY must be nonzero".to_string())?
            }
            Err(_) => DEFAULT_CHANNEL_CAPACITY,
        };

        let metrics_addr = match std::env::var("TASKLOG_METRICS_LISTEN") {
            Ok(val) => Some(val.parse::<SocketAddr>().map_err(|e| {
                format!("TASKLOG_METRICS_LISTEN is not a valid socket address: {e}")
            })?),
            Err(_) => None,
        };

        let tls = match (
            std::env::var("TASKLOG_TLS_CERT").ok(),
            std::env::var("TASKLOG_TLS_KEY").ok(),
        ) {
            (None, None) => None,
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (Some(_), None) => {
                return Err("TASKLOG_TLS_CERT is set but TASKLOG_TLS_KEY is missing".to_string());
            }
            (None, Some(_)) => {
                return Err("TASKLOG_TLS_KEY is set but TASKLOG_TLS_CERT is missing".to_string());
            }
        };

        Ok(Config {
            data_path,
            listen_addr,
            channel_capacity,
            metrics_addr,
            tls,
        })
    }
}

/// Load variables from a `.env` file in the working directory or a parent.
///
/// Variables already set in the environment win. Returns the file that was
/// loaded, or `None` when there is no `.env` file.
fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Initialize the global `tracing` subscriber with an `EnvFilter`.
///
/// Reads `RUST_LOG`, defaulting to `"info"`. Uses `try_init()` so repeated calls
/// (e.g. across tests in the same process) are a silent no-op.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Waits for a shutdown signal: SIGINT on all platforms, plus SIGTERM on Unix.
///
/// Returns once the first signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Log a startup failure and exit the process with status 1.
fn fail(message: &str, error: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %error, "{message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // 1. Load `.env` before anything reads the environment, then start tracing.
    let env_file = load_env_file();
    init_tracing();
    match env_file {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Ok(None) => {}
        Err(e) => fail("Failed to load .env file", &e),
    }

    // 2. Read configuration from environment variables.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    };

    tracing::info!(data_path = %config.data_path.display(), "Data path");
    tracing::info!(listen_addr = %config.listen_addr, "Listen address");
    tracing::info!(channel_capacity = %config.channel_capacity, "Writer channel capacity");

    // 3. Install the metrics recorder before anything records.
    let metrics_join = match config.metrics_addr {
        Some(addr) => match tasklog::metrics::install_recorder() {
            Ok(handle) => Some(tasklog::metrics::serve_metrics(handle, addr)),
            Err(e) => fail("Failed to install metrics recorder", &e),
        },
        None => None,
    };

    // 4. Report what is already in the log. A damaged log is served anyway:
    // Add and List report it to clients as DATA_LOSS.
    let tasks = TaskService::open(&config.data_path);
    match tasks.list() {
        Ok(existing) => {
            tracing::info!(tasks = existing.len(), "Loaded task log");
            tasklog::metrics::record_task_count(existing.len());
        }
        Err(e) => tracing::warn!(error = %e, "Task log is unreadable"),
    }
    if let Ok(bytes) = tasks.store().len_bytes() {
        tasklog::metrics::record_log_bytes(bytes);
    }

    // 5. Spawn the writer task.
    let (writer_handle, join_handle) = spawn_writer(tasks, config.channel_capacity.get());

    // 6. Build the service and health reporter.
    let service = TasklogService::new(writer_handle.clone());
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();

    // 7. Build the tonic Server, optionally with TLS.
    let mut builder = tonic::transport::Server::builder();

    if let Some(ref tls) = config.tls {
        let cert = match tokio::fs::read(&tls.cert_path).await {
            Ok(cert) => cert,
            Err(e) => fail("Failed to read TLS certificate", &e),
        };
        let key = match tokio::fs::read(&tls.key_path).await {
            Ok(key) => key,
            Err(e) => fail("Failed to read TLS private key", &e),
        };

        let identity = tonic::transport::Identity::from_pem(cert, key);
        let tls_config = tonic::transport::ServerTlsConfig::new().identity(identity);
        builder = match builder.tls_config(tls_config) {
            Ok(builder) => builder,
            Err(e) => fail("Failed to configure TLS", &e),
        };
        tracing::info!("TLS enabled");
    }

    let server = builder
        .add_service(health_service)
        .add_service(TasksServer::new(service));

    // 8. Bind on the configured address.
    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => fail("Failed to bind listener", &e),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => fail("Bound listener has no local address", &e),
    };
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    tracing::info!("Server listening on {addr}");

    // 9. Mark health service as SERVING now that the listener is bound.
    health_reporter
        .set_serving::<TasksServer<TasklogService>>()
        .await;
    health_reporter
        .set_service_status("", tonic_health::ServingStatus::Serving)
        .await;

    // 10. Serve until a shutdown signal. Health flips to NOT_SERVING before
    // connections drain.
    let served = server
        .serve_with_incoming_shutdown(incoming, async move {
            shutdown_signal().await;
            health_reporter
                .set_service_status("", tonic_health::ServingStatus::NotServing)
                .await;
            health_reporter
                .set_not_serving::<TasksServer<TasklogService>>()
                .await;
        })
        .await;
    if let Err(e) = served {
        fail("Server error", &e);
    }

    // Shutdown: drop the last writer handle so the writer drains and exits.
    tracing::info!("Shutting down");
    drop(writer_handle);
    if let Err(e) = join_handle.await {
        tracing::error!(error = %e, "Writer task panicked");
    }
    if let Some(join) = metrics_join {
        join.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "TASKLOG_DATA",
        "TASKLOG_LISTEN",
        "TASKLOG_CHANNEL_CAPACITY",
        "TASKLOG_METRICS_LISTEN",
        "TASKLOG_TLS_CERT",
        "TASKLOG_TLS_KEY",
    ];

    /// Clear every config variable so tests do not leak into each other.
    fn clear_env() {
        for var in VARS {
            // SAFETY: serial test -- no concurrent env mutation.
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn from_env_defaults_when_nothing_set() {
        clear_env();

        let config = Config::from_env().expect("defaults should parse");
        assert_eq!(config.data_path, PathBuf::from("mydb.pb"));
        assert_eq!(
            config.listen_addr,
            "[::]:8888".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.channel_capacity.get(), 64);
        assert_eq!(config.metrics_addr, None);
        assert_eq!(config.tls, None);
    }

    #[test]
    #[serial]
    fn from_env_custom_values() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_DATA", "/tmp/tasks.pb") };
        unsafe { std::env::set_var("TASKLOG_LISTEN", "127.0.0.1:9999") };
        unsafe { std::env::set_var("TASKLOG_CHANNEL_CAPACITY", "8") };
        unsafe { std::env::set_var("TASKLOG_METRICS_LISTEN", "127.0.0.1:9100") };

        let config = Config::from_env().expect("should succeed");
        assert_eq!(config.data_path, PathBuf::from("/tmp/tasks.pb"));
        assert_eq!(
            config.listen_addr,
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.channel_capacity.get(), 8);
        assert_eq!(
            config.metrics_addr,
            Some("127.0.0.1:9100".parse::<SocketAddr>().unwrap())
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_invalid_listen_addr_returns_err() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_LISTEN", "not-an-addr") };

        let msg = Config::from_env().unwrap_err();
        assert!(msg.contains("TASKLOG_LISTEN"), "got: {msg}");
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_zero_channel_capacity_returns_err() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_CHANNEL_CAPACITY", "0") };

        let msg = Config::from_env().unwrap_err();
        assert!(msg.contains("nonzero"), "got: {msg}");
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_invalid_channel_capacity_returns_err() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_CHANNEL_CAPACITY", "lots") };

        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_invalid_metrics_addr_returns_err() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_METRICS_LISTEN", "9100") };

        let msg = Config::from_env().unwrap_err();
        assert!(msg.contains("TASKLOG_METRICS_LISTEN"), "got: {msg}");
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_tls_cert_and_key() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_TLS_CERT", "/tmp/c.crt") };
        unsafe { std::env::set_var("TASKLOG_TLS_KEY", "/tmp/k.key") };

        let config = Config::from_env().expect("should succeed with cert and key");
        assert_eq!(
            config.tls,
            Some(TlsConfig {
                cert_path: PathBuf::from("/tmp/c.crt"),
                key_path: PathBuf::from("/tmp/k.key"),
            })
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_tls_cert_without_key_returns_err() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_TLS_CERT", "/tmp/c.crt") };

        let msg = Config::from_env().unwrap_err();
        assert!(msg.contains("TASKLOG_TLS_KEY"), "got: {msg}");
        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_tls_key_without_cert_returns_err() {
        clear_env();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_TLS_KEY", "/tmp/k.key") };

        let msg = Config::from_env().unwrap_err();
        assert!(msg.contains("TASKLOG_TLS_CERT"), "got: {msg}");
        clear_env();
    }

    #[test]
    #[serial]
    fn env_file_supplies_config_without_overriding_env() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "TASKLOG_DATA=from-file.pb\nTASKLOG_LISTEN=127.0.0.1:7777\n",
        )
        .unwrap();
        // SAFETY: serial test -- no concurrent env mutation.
        unsafe { std::env::set_var("TASKLOG_LISTEN", "127.0.0.1:9999") };
        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let loaded = load_env_file();
        let config = Config::from_env();
        std::env::set_current_dir(cwd).unwrap();
        clear_env();

        let loaded = loaded.expect(".env should parse").expect(".env should be found");
        assert_eq!(loaded.file_name().unwrap(), ".env");
        let config = config.expect("config should parse");
        assert_eq!(config.data_path, PathBuf::from("from-file.pb"));
        assert_eq!(
            config.listen_addr,
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn init_tracing_does_not_panic() {
        init_tracing();
    }

    #[tokio::test]
    async fn health_reporter_can_set_serving_and_not_serving() {
        let (mut reporter, _service) = tonic_health::server::health_reporter();

        reporter
            .set_serving::<TasksServer<TasklogService>>()
            .await;
        reporter
            .set_service_status("", tonic_health::ServingStatus::Serving)
            .await;
        reporter
            .set_service_status("", tonic_health::ServingStatus::NotServing)
            .await;
        reporter
            .set_not_serving::<TasksServer<TasklogService>>()
            .await;
    }
}
