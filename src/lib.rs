//! tasklog: a task list persisted as an append-only log of length-prefixed
//! protobuf records, served over gRPC.

pub mod codec;
pub mod error;
pub mod metrics;
pub mod service;
pub mod store;
pub mod tasks;
pub mod types;
pub mod writer;

/// Generated protobuf and gRPC types for the `tasklog` package.
pub mod proto {
    tonic::include_proto!("tasklog");
}

pub use error::Error;
pub use service::TasklogService;
pub use store::LogStore;
pub use tasks::TaskService;
pub use types::{MAX_TASK_ID, Task};
pub use writer::{WriterHandle, spawn_writer};
