//! Task operations built on the record log.
//!
//! [`TaskService`] holds nothing but a [`LogStore`]. Every call re-reads the
//! file: ids are derived from the record count at the moment of the add, and
//! completing a task rewrites every record.
//!
//! Calls are not serialized against each other. Two adds racing on the same
//! file can hand out the same id, a list racing an append can see a torn
//! trailing record, and an add landing inside a completion's rewrite can be
//! lost. The server avoids all three by routing every call through a single
//! writer task (see [`crate::writer`]).

use std::path::PathBuf;

use crate::codec;
use crate::error::Error;
use crate::store::LogStore;
use crate::types::Task;

/// The add / list / complete surface over one log file.
#[derive(Debug, Clone)]
pub struct TaskService {
    store: LogStore,
}

impl TaskService {
    /// Create a service over an existing [`LogStore`].
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    /// Create a service over the log file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(LogStore::new(path))
    }

    /// The underlying store.
    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Append a new task and return it.
    ///
    /// The id is one more than the number of records currently in the log.
    ///
    /// # Errors
    ///
    /// Returns any error from [`list`](TaskService::list) (the log is scanned to
    /// count records), [`Error::Encode`] if the new id is out of range, or
    /// [`Error::Io`] if the append fails.
    pub fn add(&self, text: impl Into<String>, done: bool) -> Result<Task, Error> {
        let existing = self.list()?;
        let task = Task {
            id: existing.len() as u64 + 1,
            text: text.into(),
            done,
        };

        let payload = codec::encode(&task)?;
        self.store.append(&payload)?;

        tracing::debug!(id = task.id, done = task.done, "added task");
        Ok(task)
    }

    /// Return every task in the log, in creation order.
    ///
    /// # Errors
    ///
    /// Returns any error from [`LogStore::scan`], or [`Error::Decode`] naming
    /// the index of the first record that does not decode.
    pub fn list(&self) -> Result<Vec<Task>, Error> {
        self.store
            .scan()?
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                codec::decode(payload).map_err(|e| match e {
                    Error::Decode { detail, .. } => Error::Decode { index, detail },
                    other => other,
                })
            })
            .collect()
    }

    /// Mark the first task with `id` as done and rewrite the log.
    ///
    /// Every task is re-encoded with its stored id and current state, in the
    /// original order, and the log is replaced wholesale. The rewrite happens
    /// even if the task was already done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task has `id`; the log is left untouched
    /// in that case. Otherwise returns any error from
    /// [`list`](TaskService::list), encoding, or [`LogStore::replace`].
    pub fn complete(&self, id: u64) -> Result<Task, Error> {
        let mut tasks = self.list()?;
        let position = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(Error::NotFound { id })?;
        tasks[position].done = true;

        // Encode everything before touching the file so an encode failure
        // cannot leave the log deleted.
        let payloads = tasks
            .iter()
            .map(codec::encode)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.replace(payloads)?;

        tracing::debug!(id, records = tasks.len(), "completed task");
        Ok(tasks.swap_remove(position))
    }
}
