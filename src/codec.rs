//! Binary codec for the tasklog record file.
//!
//! This module handles serialization and deserialization of individual task
//! records. It is pure data transformation -- no file I/O, no async.
//!
//! A record is an 8-byte little-endian length prefix followed by exactly that
//! many bytes of protobuf-encoded payload. The log file has no header, footer
//! or separator; it is the concatenation of records.

use prost::Message;

use crate::error::Error;
use crate::types::{MAX_TASK_ID, Task};

/// Size of the length prefix in bytes.
pub const PREFIX_SIZE: usize = 8;

/// On-disk payload message. Field numbers match `tasklog.Task` in
/// `proto/tasklog.proto`, so a payload is also a valid wire `Task`.
#[derive(Clone, PartialEq, Message)]
struct TaskRecord {
    #[prost(int32, tag = "1")]
    id: i32,
    #[prost(string, tag = "2")]
    text: String,
    #[prost(bool, tag = "3")]
    done: bool,
}

/// Encode a [`Task`] into its record payload (without the length prefix).
///
/// Encoding is deterministic: equal tasks always produce identical bytes.
///
/// # Errors
///
/// Returns [`Error::Encode`] if `task.id` is zero or exceeds [`MAX_TASK_ID`].
pub fn encode(task: &Task) -> Result<Vec<u8>, Error> {
    if task.id == 0 || task.id > MAX_TASK_ID {
        return Err(Error::Encode(format!(
            "task id {} outside 1..={MAX_TASK_ID}",
            task.id
        )));
    }
    let record = TaskRecord {
        id: task.id as i32,
        text: task.text.clone(),
        done: task.done,
    };
    Ok(record.encode_to_vec())
}

/// Decode a record payload back into a [`Task`].
///
/// # Errors
///
/// Returns [`Error::Decode`] (with record index `0`) if the bytes are not a
/// valid protobuf message, the text is not UTF-8, or the id is missing or not
/// positive.
pub fn decode(payload: &[u8]) -> Result<Task, Error> {
    let record = TaskRecord::decode(payload).map_err(|e| Error::Decode {
        index: 0,
        detail: e.to_string(),
    })?;
    if record.id <= 0 {
        return Err(Error::Decode {
            index: 0,
            detail: format!("task id must be positive, got {}", record.id),
        });
    }
    Ok(Task {
        id: record.id as u64,
        text: record.text,
        done: record.done,
    })
}

/// Encode the length of `payload` as an 8-byte little-endian prefix.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the length does not fit in a `u64`.
pub fn prefix_of(payload: &[u8]) -> Result<[u8; PREFIX_SIZE], Error> {
    let len = u64::try_from(payload.len()).map_err(|_| {
        Error::Encode(format!(
            "payload of {} bytes exceeds the length prefix range",
            payload.len()
        ))
    })?;
    Ok(len.to_le_bytes())
}

/// Decode an 8-byte little-endian length prefix.
pub fn read_prefix(prefix: &[u8; PREFIX_SIZE]) -> u64 {
    u64::from_le_bytes(*prefix)
}

/// Frame an already-encoded payload: prefix followed by payload, in one buffer.
///
/// # Errors
///
/// Propagates [`prefix_of`] failures.
pub fn frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let prefix = prefix_of(payload)?;
    let mut buf = Vec::with_capacity(PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encode a [`Task`] as a complete record (prefix + payload).
///
/// # Errors
///
/// Propagates [`encode`] and [`prefix_of`] failures.
pub fn encode_record(task: &Task) -> Result<Vec<u8>, Error> {
    frame(&encode(task)?)
}
