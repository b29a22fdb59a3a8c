//! gRPC service layer for tasklog.
//!
//! This module contains the `TasklogService` struct that holds the writer handle,
//! along with conversion helpers that translate between protobuf types and domain
//! types, and map domain errors to gRPC status codes.

// `tonic::Status` is 176 bytes, which triggers clippy::result_large_err. Every
// conversion helper here returns it.
#![allow(clippy::result_large_err)]

use metrics::counter;

use crate::error::Error;
use crate::proto;
use crate::types::Task;
use crate::writer::WriterHandle;

/// gRPC service implementation for tasklog.
///
/// Every handler forwards to the single writer task through `writer`, so RPCs
/// never touch the log file concurrently.
pub struct TasklogService {
    /// Handle for submitting requests to the writer task.
    pub writer: WriterHandle,
}

impl TasklogService {
    /// Create a new `TasklogService` over the given writer handle.
    pub fn new(writer: WriterHandle) -> Self {
        Self { writer }
    }
}

#[tonic::async_trait]
impl proto::tasks_server::Tasks for TasklogService {
    /// Append a task with the requested text and done flag.
    ///
    /// The request carries no id; the server assigns one.
    async fn add(
        &self,
        request: tonic::Request<proto::AddRequest>,
    ) -> Result<tonic::Response<proto::Task>, tonic::Status> {
        counter!("tasklog_rpc_requests_total", "rpc" => "add").increment(1);
        let req = request.into_inner();

        let task = self
            .writer
            .add(req.text, req.done)
            .await
            .map_err(error_to_status)?;

        Ok(tonic::Response::new(task_to_proto(&task)?))
    }

    /// Return every task in creation order.
    async fn list(
        &self,
        _request: tonic::Request<proto::Void>,
    ) -> Result<tonic::Response<proto::TaskList>, tonic::Status> {
        counter!("tasklog_rpc_requests_total", "rpc" => "list").increment(1);

        let tasks = self.writer.list().await.map_err(error_to_status)?;

        let tasks = tasks
            .iter()
            .map(task_to_proto)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tonic::Response::new(proto::TaskList { tasks }))
    }

    /// Mark the first task with the given id as done.
    ///
    /// Rejects non-positive ids with `INVALID_ARGUMENT` before reaching the
    /// writer.
    async fn complete(
        &self,
        request: tonic::Request<proto::TaskId>,
    ) -> Result<tonic::Response<proto::Task>, tonic::Status> {
        counter!("tasklog_rpc_requests_total", "rpc" => "complete").increment(1);
        let id = parse_task_id(request.into_inner().id)?;

        let task = self
            .writer
            .complete(id)
            .await
            .map_err(error_to_status)?;

        Ok(tonic::Response::new(task_to_proto(&task)?))
    }
}

/// Map a domain [`Error`] to a [`tonic::Status`] with the appropriate gRPC status code.
///
/// The status message is the error's `Display` string.
///
/// # Mapping
///
/// | Domain Error      | gRPC Code          |
/// |-------------------|--------------------|
/// | `NotFound`        | `NOT_FOUND`        |
/// | `Io`              | `INTERNAL`         |
/// | `CorruptLog`      | `DATA_LOSS`        |
/// | `Decode`          | `DATA_LOSS`        |
/// | `Encode`          | `INVALID_ARGUMENT` |
/// | `InvalidArgument` | `INVALID_ARGUMENT` |
/// | `WriterClosed`    | `UNAVAILABLE`      |
pub fn error_to_status(err: Error) -> tonic::Status {
    let message = err.to_string();
    match err {
        Error::NotFound { .. } => tonic::Status::not_found(message),
        Error::Io { .. } => tonic::Status::internal(message),
        Error::CorruptLog { .. } => tonic::Status::data_loss(message),
        Error::Decode { .. } => tonic::Status::data_loss(message),
        Error::Encode(_) => tonic::Status::invalid_argument(message),
        Error::InvalidArgument(_) => tonic::Status::invalid_argument(message),
        Error::WriterClosed => tonic::Status::unavailable(message),
    }
}

/// Validate a wire task id.
///
/// # Errors
///
/// Returns `tonic::Status` with `INVALID_ARGUMENT` if `id` is zero or negative.
pub fn parse_task_id(id: i32) -> Result<u64, tonic::Status> {
    u64::try_from(id)
        .ok()
        .filter(|&id| id > 0)
        .ok_or_else(|| {
            error_to_status(Error::InvalidArgument(format!(
                "task id must be positive, got {id}"
            )))
        })
}

/// Convert a domain [`Task`] to the protobuf `Task` type.
///
/// # Errors
///
/// Returns `tonic::Status` with `INTERNAL` if the id does not fit the wire's
/// `int32`. Decoded tasks always fit, so this only fires on a programming error.
pub fn task_to_proto(task: &Task) -> Result<proto::Task, tonic::Status> {
    let id = i32::try_from(task.id).map_err(|_| {
        tonic::Status::internal(format!("task id {} exceeds the wire id range", task.id))
    })?;
    Ok(proto::Task {
        id,
        text: task.text.clone(),
        done: task.done,
    })
}

/// Convert a protobuf `Task` to the domain [`Task`] type.
///
/// # Errors
///
/// Returns `tonic::Status` with `INVALID_ARGUMENT` if the id is not positive.
pub fn proto_to_task(task: proto::Task) -> Result<Task, tonic::Status> {
    Ok(Task {
        id: parse_task_id(task.id)?,
        text: task.text,
        done: task.done,
    })
}
