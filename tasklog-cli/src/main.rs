//! `todo`: command-line client for a tasklog server.
//!
//! # Usage
//!
//! ```text
//! todo [--addr <ADDRESS>] [--ca-cert <PEM> [--domain <NAME>]] <list | add <words>... | complete <id>>
//! ```
//!
//! `--addr` defaults to `http://[::1]:8888`. Passing `--ca-cert` turns on TLS.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tasklog_cli::client::{Client, TlsOptions};
use tasklog_cli::output;

/// Manage the task list on a tasklog server.
#[derive(Parser, Debug)]
#[command(name = "todo", version, about)]
struct Cli {
    /// Server address to connect to.
    #[arg(long, env = "TASKLOG_ADDR", default_value = "http://[::1]:8888")]
    addr: String,

    /// PEM file of the CA that signed the server certificate. Enables TLS.
    #[arg(long, env = "TASKLOG_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Name the server certificate must be issued for.
    #[arg(long, env = "TASKLOG_DOMAIN", default_value = "localhost")]
    domain: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every task with its status.
    List,
    /// Add a task; the remaining words become its text.
    Add {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Mark a task as done.
    Complete {
        /// Id of the task to complete.
        id: i32,
    },
}

/// Load variables from a `.env` file so clap's `env` fallbacks can see them.
///
/// Variables already set in the environment win. A missing file is not an error.
fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file().context("could not load .env file")?;
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    // Plain http:// cannot carry TLS, so switch the scheme when a CA is given.
    let addr = match cli.ca_cert {
        Some(_) => cli.addr.replacen("http://", "https://", 1),
        None => cli.addr.clone(),
    };
    let tls = cli.ca_cert.as_deref().map(|ca_cert| TlsOptions {
        ca_cert,
        domain: &cli.domain,
    });

    let mut client = Client::connect(&addr, tls)
        .await
        .with_context(|| format!("could not connect to backend at {addr}"))?;

    match cli.command {
        Command::List => {
            let tasks = client.list().await.context("could not fetch tasks")?;
            for task in &tasks {
                println!("{}", output::task_line(task));
            }
        }
        Command::Add { words } => {
            client
                .add(output::task_text(&words))
                .await
                .context("could not add task in the backend")?;
            println!("{}", output::ADDED);
        }
        Command::Complete { id } => {
            client
                .complete(id)
                .await
                .context("could not complete task")?;
            println!("{}", output::COMPLETED);
        }
    }

    Ok(())
}
