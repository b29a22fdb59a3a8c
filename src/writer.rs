//! Single-writer task for tasklog.
//!
//! [`TaskService`] does no locking, so concurrent callers on one file can
//! assign duplicate ids, observe torn records, or lose an add that lands inside
//! a completion's rewrite. The server never calls it directly. Instead one
//! writer task owns the service and executes [`WriteRequest`]s strictly one at a
//! time, fed by a bounded `tokio::mpsc` channel. gRPC handlers hold a cloneable
//! [`WriterHandle`].
//!
//! This only serializes callers inside one process; a second process writing
//! the same file is not coordinated.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::metrics;
use crate::tasks::TaskService;
use crate::types::Task;

/// A request sent to the writer task, carrying its own reply channel.
pub enum WriteRequest {
    /// Append a new task.
    Add {
        /// Task description.
        text: String,
        /// Initial completion state.
        done: bool,
        /// Oneshot channel for the created task.
        response_tx: oneshot::Sender<Result<Task, Error>>,
    },
    /// Read every task.
    List {
        /// Oneshot channel for the task list.
        response_tx: oneshot::Sender<Result<Vec<Task>, Error>>,
    },
    /// Mark a task as done.
    Complete {
        /// Id of the task to complete.
        id: u64,
        /// Oneshot channel for the completed task.
        response_tx: oneshot::Sender<Result<Task, Error>>,
    },
}

impl WriteRequest {
    fn op(&self) -> &'static str {
        match self {
            WriteRequest::Add { .. } => "add",
            WriteRequest::List { .. } => "list",
            WriteRequest::Complete { .. } => "complete",
        }
    }
}

/// Cloneable handle for submitting requests to the writer task.
///
/// Each clone is another sender into the same channel.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl WriterHandle {
    /// Create a handle from the sender half of the writer channel.
    pub fn new(tx: mpsc::Sender<WriteRequest>) -> Self {
        Self { tx }
    }

    /// Append a new task through the writer.
    ///
    /// # Errors
    ///
    /// Returns the [`TaskService::add`] error, or [`Error::WriterClosed`] if the
    /// writer task has shut down.
    pub async fn add(&self, text: String, done: bool) -> Result<Task, Error> {
        self.call(|response_tx| WriteRequest::Add {
            text,
            done,
            response_tx,
        })
        .await
    }

    /// List every task through the writer.
    ///
    /// # Errors
    ///
    /// Returns the [`TaskService::list`] error, or [`Error::WriterClosed`].
    pub async fn list(&self) -> Result<Vec<Task>, Error> {
        self.call(|response_tx| WriteRequest::List { response_tx })
            .await
    }

    /// Complete a task through the writer.
    ///
    /// # Errors
    ///
    /// Returns the [`TaskService::complete`] error, or [`Error::WriterClosed`].
    pub async fn complete(&self, id: u64) -> Result<Task, Error> {
        self.call(|response_tx| WriteRequest::Complete { id, response_tx })
            .await
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, Error>>) -> WriteRequest,
    ) -> Result<T, Error> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(build(response_tx))
            .await
            .map_err(|_| Error::WriterClosed)?;

        // A dropped oneshot means the writer exited or panicked mid-request.
        response_rx.await.map_err(|_| Error::WriterClosed)?
    }
}

/// Run the writer loop until every [`WriterHandle`] has been dropped.
///
/// Executes requests one at a time in arrival order. Results are sent back on
/// each request's oneshot; a caller that has gone away is logged and skipped.
pub(crate) async fn run_writer(service: TaskService, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some(req) = rx.recv().await {
        execute(&service, req);
    }
    tracing::debug!(path = %service.store().path().display(), "writer: channel closed");
}

fn execute(service: &TaskService, req: WriteRequest) {
    let op = req.op();
    let started = Instant::now();

    let delivered = match req {
        WriteRequest::Add {
            text,
            done,
            response_tx,
        } => {
            let result = service.add(text, done);
            if let Ok(task) = &result {
                // Under the writer, the new id is the new record count.
                metrics::record_task_count(task.id as usize);
                record_log_bytes(service);
            }
            finish(op, started, result, response_tx)
        }
        WriteRequest::List { response_tx } => {
            let result = service.list();
            if let Ok(tasks) = &result {
                metrics::record_task_count(tasks.len());
            }
            finish(op, started, result, response_tx)
        }
        WriteRequest::Complete { id, response_tx } => {
            let result = service.complete(id);
            if result.is_ok() {
                record_log_bytes(service);
            }
            finish(op, started, result, response_tx)
        }
    };

    if !delivered {
        tracing::warn!(op, "writer: response receiver dropped");
    }
}

fn finish<T>(
    op: &'static str,
    started: Instant,
    result: Result<T, Error>,
    response_tx: oneshot::Sender<Result<T, Error>>,
) -> bool {
    metrics::record_operation(op, started.elapsed(), result.is_ok());
    if let Err(e) = &result {
        tracing::warn!(op, error = %e, "writer: operation failed");
    }
    response_tx.send(result).is_ok()
}

fn record_log_bytes(service: &TaskService) {
    match service.store().len_bytes() {
        Ok(bytes) => metrics::record_log_bytes(bytes),
        Err(e) => tracing::warn!(error = %e, "writer: could not stat log file"),
    }
}

/// Spawn the writer task on the tokio runtime.
///
/// Moves `service` into the task and returns a handle for submitting requests
/// plus the task's `JoinHandle`. Dropping every handle closes the channel and
/// lets the task finish.
///
/// # Arguments
///
/// * `service` - The task service the writer owns exclusively.
/// * `channel_capacity` - Bound on the request channel. Must be nonzero.
pub fn spawn_writer(
    service: TaskService,
    channel_capacity: usize,
) -> (WriterHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let join_handle = tokio::spawn(run_writer(service, rx));
    (WriterHandle::new(tx), join_handle)
}
