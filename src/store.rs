//! Storage engine for tasklog.
//!
//! This module owns the record log file. It provides the three file-level
//! primitives the task service is built on: append one record, scan every
//! record, and replace the whole log.
//!
//! There is no index and no in-place mutation. The only way to change an
//! existing record is [`LogStore::replace`], which deletes the file and appends
//! a full replacement sequence. Nothing here locks the file; callers that need
//! operations to serialize against each other go through the writer task.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::codec::{self, PREFIX_SIZE};
use crate::error::Error;

/// Sequential, append-biased persistence of length-prefixed records in one file.
///
/// A missing file is a valid state meaning "zero records". The file is created
/// by the first [`append`](LogStore::append) and grows by exactly one record per
/// append.
#[derive(Debug, Clone)]
pub struct LogStore {
    /// Path of the record log file.
    path: PathBuf,
}

impl LogStore {
    /// Create a store addressing the log file at `path`.
    ///
    /// Does not touch the filesystem; the file is created lazily on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the record log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the log file currently exists.
    #[cfg(test)]
    pub(crate) fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current size of the log file in bytes, or `0` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the metadata call fails for a reason other than
    /// the file being absent.
    pub fn len_bytes(&self) -> Result<u64, Error> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::io("stat", &self.path)(e)),
        }
    }

    /// Append one record: the 8-byte length prefix of `payload`, then `payload`.
    ///
    /// Opens the file in append mode (creating it if absent), writes the framed
    /// record, fsyncs and closes. A failure part-way through the write leaves a
    /// trailing fragment that the next [`scan`](LogStore::scan) reports as
    /// [`Error::CorruptLog`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the payload length cannot be represented in
    /// the prefix, or [`Error::Io`] if opening, writing or syncing fails.
    pub fn append(&self, payload: &[u8]) -> Result<(), Error> {
        let record = codec::frame(payload)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::io("open", &self.path))?;
        file.write_all(&record)
            .map_err(Error::io("write", &self.path))?;
        file.sync_all().map_err(Error::io("sync", &self.path))?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = record.len(),
            "appended record"
        );
        Ok(())
    }

    /// Read every record payload in file order (oldest first).
    ///
    /// Returns an empty vector if the file does not exist. Otherwise the whole
    /// file is read into memory and walked prefix by prefix; the full sequence is
    /// materialized before anything is returned, since each record's offset is
    /// only known after decoding every prior length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read.
    /// Returns [`Error::CorruptLog`] if fewer than 8 bytes trail the last whole
    /// record, or a prefix declares more bytes than remain.
    pub fn scan(&self) -> Result<Vec<Vec<u8>>, Error> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "log absent, scanned 0 records");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::io("read", &self.path)(e)),
        };

        let mut payloads = Vec::new();
        let mut offset = 0usize;

        loop {
            let remaining = &data[offset..];
            if remaining.is_empty() {
                break;
            }

            let Some((prefix, body)) = remaining.split_first_chunk::<PREFIX_SIZE>() else {
                return Err(self.corrupt(
                    offset,
                    format!(
                        "{} dangling bytes, shorter than the {PREFIX_SIZE}-byte length prefix",
                        remaining.len()
                    ),
                ));
            };

            let declared = codec::read_prefix(prefix);
            let len = match usize::try_from(declared) {
                Ok(len) if len <= body.len() => len,
                _ => {
                    return Err(self.corrupt(
                        offset,
                        format!(
                            "record declares {declared} bytes but only {} remain",
                            body.len()
                        ),
                    ));
                }
            };

            payloads.push(body[..len].to_vec());
            offset += PREFIX_SIZE + len;
        }

        tracing::debug!(
            path = %self.path.display(),
            records = payloads.len(),
            bytes = data.len(),
            "scanned log"
        );
        Ok(payloads)
    }

    /// Replace the entire log with `payloads`, in order.
    ///
    /// Deletes the file, then appends each payload. This is not atomic: a crash
    /// or failure between the delete and the last append leaves the log empty or
    /// partially rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the delete fails (including when the file does not
    /// exist), or any error from [`append`](LogStore::append).
    pub fn replace<I>(&self, payloads: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        std::fs::remove_file(&self.path).map_err(Error::io("delete", &self.path))?;

        let mut count = 0usize;
        for payload in payloads {
            self.append(payload.as_ref())?;
            count += 1;
        }

        tracing::debug!(path = %self.path.display(), records = count, "rewrote log");
        Ok(())
    }

    fn corrupt(&self, offset: usize, detail: String) -> Error {
        Error::CorruptLog {
            path: self.path.clone(),
            offset: offset as u64,
            detail,
        }
    }
}
