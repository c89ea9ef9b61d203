//! File backend
//!
//! Append-only, checksummed log of mutations with an in-memory index of the
//! live entries.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::{LeakError, Result};
use crate::store::{Mutation, Value};

use super::Backend;

/// Record header: CRC32 (4) + payload length (4)
pub const RECORD_HEADER_SIZE: usize = 8;

/// Durable backend stored in a single log file
///
/// ## Concurrency
/// All state sits behind one mutex; concurrent `apply` calls from queue
/// workers are serialized there.
pub struct FileBackend {
    path: PathBuf,
    sync_strategy: SyncStrategy,

    /// None once closed
    inner: Mutex<Option<Inner>>,

    /// What happened while replaying the log on open
    recovery: LogRecovery,
}

struct Inner {
    writer: BufWriter<File>,

    /// Live entries as of the last applied record
    entries: HashMap<String, Value>,

    /// Records in the log file, live or superseded
    records: u64,

    /// Records written since the last fsync
    unsynced: usize,
}

/// Result of replaying a log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogRecovery {
    /// Number of records successfully replayed
    pub records_recovered: u64,

    /// Bytes cut from the tail (torn or corrupted records)
    pub bytes_truncated: u64,
}

impl FileBackend {
    /// Open or create the log file at `path` and replay it
    pub fn open(path: impl AsRef<Path>, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut entries = HashMap::new();
        let mut recovery = LogRecovery::default();

        if path.exists() {
            let bytes = fs::read(&path)?;
            let (mutations, valid_len) = decode_log(&bytes)?;

            for mutation in mutations {
                apply_to_index(&mut entries, mutation);
                recovery.records_recovered += 1;
            }

            if valid_len < bytes.len() {
                recovery.bytes_truncated = (bytes.len() - valid_len) as u64;
                tracing::warn!(
                    path = %path.display(),
                    "truncating {} bytes of torn log tail",
                    recovery.bytes_truncated
                );
                OpenOptions::new()
                    .write(true)
                    .open(&path)?
                    .set_len(valid_len as u64)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::info!(
            path = %path.display(),
            "backend opened: {} records replayed, {} live keys",
            recovery.records_recovered,
            entries.len()
        );

        Ok(Self {
            path,
            sync_strategy,
            inner: Mutex::new(Some(Inner {
                writer: BufWriter::new(file),
                entries,
                records: recovery.records_recovered,
                unsynced: 0,
            })),
            recovery,
        })
    }

    /// Read a persisted value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .as_ref()
            .and_then(|inner| inner.entries.get(key).cloned())
    }

    /// Number of live persisted keys
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .as_ref()
            .map(|inner| inner.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recovery(&self) -> LogRecovery {
        self.recovery
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Rewrite the log as one `Set` record per live key
    ///
    /// Written to a sibling temp file and renamed over the original.
    fn compact(&self, entries: &HashMap<String, Value>, records: u64) -> Result<()> {
        let tmp_path = self.path.with_extension("compact");
        let mut writer = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?,
        );

        for (key, value) in entries {
            let record = encode_record(&Mutation::Set {
                key: key.clone(),
                value: value.clone(),
            })?;
            writer.write_all(&record)?;
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| {
            LeakError::Backend(format!("Failed to flush compacted log: {}", e))
        })?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            "compacted {} records into {}",
            records,
            entries.len()
        );
        Ok(())
    }
}

impl Backend for FileBackend {
    fn load(&self) -> Result<Vec<(String, Value)>> {
        let inner = self.inner.lock();
        let inner = inner.as_ref().ok_or(LeakError::BackendClosed)?;

        Ok(inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, mutation: &Mutation) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(LeakError::BackendClosed)?;

        if let Mutation::Delete { key } = mutation {
            if !inner.entries.contains_key(key) {
                tracing::debug!(key = %key, "delete of absent key is a no-op");
                return Ok(());
            }
        }

        // Log first, then index: the index never holds an unlogged value
        let record = encode_record(mutation)?;
        inner.writer.write_all(&record)?;
        apply_to_index(&mut inner.entries, mutation.clone());
        inner.records += 1;
        inner.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => inner.unsynced >= count,
        };
        if due {
            inner.writer.flush()?;
            inner.writer.get_ref().sync_data()?;
            inner.unsynced = 0;
        }

        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(LeakError::BackendClosed)?;

        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        inner.unsynced = 0;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let Inner {
            mut writer,
            entries,
            records,
            ..
        } = match guard.take() {
            Some(inner) => inner,
            None => return Ok(()),
        };

        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        if records > entries.len() as u64 {
            self.compact(&entries, records)?;
        }

        tracing::info!(
            path = %self.path.display(),
            "backend closed with {} live keys",
            entries.len()
        );
        Ok(())
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(path = %self.path.display(), "failed to close backend: {}", e);
        }
    }
}

impl fmt::Display for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        write!(
            f,
            "{} {} bytes :: {} items",
            self.path.display(),
            size,
            self.len()
        )
    }
}

// =============================================================================
// Record Encoding
// =============================================================================

/// Encode a mutation as `crc (4) | len (4) | payload`
fn encode_record(mutation: &Mutation) -> Result<Vec<u8>> {
    let payload = bincode::serialize(mutation)?;
    let crc = crc32fast::hash(&payload);

    let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
    record.extend_from_slice(&crc.to_le_bytes());
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Decode every intact record
///
/// Stops at the first torn or checksum-failing record and returns the
/// mutations before it along with the byte length they span. Those are
/// interrupted writes and are safe to cut. A record that passes its
/// checksum but does not decode was written by something else, and fails
/// the whole replay instead.
fn decode_log(bytes: &[u8]) -> Result<(Vec<Mutation>, usize)> {
    let mut mutations = Vec::new();
    let mut pos = 0;

    while pos + RECORD_HEADER_SIZE <= bytes.len() {
        let crc = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]);
        let len = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;

        let start = pos + RECORD_HEADER_SIZE;
        let end = match start.checked_add(len) {
            Some(end) if end <= bytes.len() => end,
            _ => break,
        };

        let payload = &bytes[start..end];
        if crc32fast::hash(payload) != crc {
            tracing::warn!(offset = pos, "checksum mismatch in log record");
            break;
        }

        let mutation = bincode::deserialize::<Mutation>(payload).map_err(|e| {
            LeakError::Corruption(format!("undecodable record at offset {}: {}", pos, e))
        })?;
        mutations.push(mutation);

        pos = end;
    }

    Ok((mutations, pos))
}

fn apply_to_index(entries: &mut HashMap<String, Value>, mutation: Mutation) {
    match mutation {
        Mutation::Set { key, value } => {
            entries.insert(key, value);
        }
        Mutation::Delete { key } => {
            entries.remove(&key);
        }
    }
}
