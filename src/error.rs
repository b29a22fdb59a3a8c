//! Error types for tasklog.
//!
//! This module defines the unified error enum used throughout the crate. All fallible
//! operations return `Result<T, Error>`. The gRPC service layer maps these variants
//! to appropriate gRPC status codes.

use std::path::{Path, PathBuf};

/// Unified error type for all tasklog operations.
///
/// The gRPC layer maps variants to status codes:
///
/// - `Io` -> `INTERNAL`
/// - `CorruptLog` -> `DATA_LOSS`
/// - `Decode` -> `DATA_LOSS`
/// - `Encode` -> `INVALID_ARGUMENT`
/// - `NotFound` -> `NOT_FOUND`
/// - `InvalidArgument` -> `INVALID_ARGUMENT`
/// - `WriterClosed` -> `UNAVAILABLE`
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A filesystem call on the log file failed.
    #[error("I/O error during {op} of {}: {source}", path.display())]
    Io {
        /// The operation that failed (`open`, `write`, `read`, `delete`, ...).
        op: &'static str,
        /// Path of the log file.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The record framing of the log file is broken: dangling bytes shorter than a
    /// length prefix, or a prefix declaring more bytes than remain.
    #[error("corrupt log {} at byte offset {offset}: {detail}", path.display())]
    CorruptLog {
        /// Path of the log file.
        path: PathBuf,
        /// Byte offset of the record whose framing is invalid.
        offset: u64,
        /// Human-readable description of the corruption.
        detail: String,
    },

    /// A record payload does not decode to a well-formed task.
    #[error("could not decode task record {index}: {detail}")]
    Decode {
        /// Zero-based index of the record in the log.
        index: usize,
        /// Human-readable description of the decode failure.
        detail: String,
    },

    /// A task cannot be represented in the record format.
    #[error("could not encode task: {0}")]
    Encode(String),

    /// No task in the log carries the requested id.
    #[error("task not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: u64,
    },

    /// A request argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The writer task has shut down and can no longer accept requests.
    #[error("writer task closed")]
    WriterClosed,
}

impl Error {
    /// Build a closure that wraps an [`std::io::Error`] with the failing operation
    /// and path, for use with `map_err`.
    pub(crate) fn io(op: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.to_path_buf();
        move |source| Error::Io { op, path, source }
    }
}
