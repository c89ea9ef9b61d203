//! Tests for backends
//!
//! These tests verify:
//! - FileBackend persistence across reopen
//! - Torn-tail truncation on open
//! - Compaction on close
//! - Closed-backend errors
//! - MemoryBackend failure injection

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use leakkv::backend::{Backend, FileBackend, MemoryBackend, RECORD_HEADER_SIZE};
use leakkv::config::SyncStrategy;
use leakkv::store::{Mutation, Value};
use leakkv::LeakError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.db");
    (temp_dir, path)
}

fn set(key: &str, value: impl Into<Value>) -> Mutation {
    Mutation::Set {
        key: key.to_string(),
        value: value.into(),
    }
}

fn delete(key: &str) -> Mutation {
    Mutation::Delete {
        key: key.to_string(),
    }
}

fn sorted(mut entries: Vec<(String, Value)>) -> Vec<(String, Value)> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

// =============================================================================
// FileBackend Tests
// =============================================================================

#[test]
fn test_open_creates_empty_log() {
    let (_temp, path) = setup_temp_log();

    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert!(path.exists());
    assert!(backend.is_empty());
    assert!(backend.load().unwrap().is_empty());
    assert_eq!(backend.recovery().records_recovered, 0);
}

#[test]
fn test_open_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("dir").join("test.db");

    let _backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert!(path.exists());
}

#[test]
fn test_apply_and_get() {
    let (_temp, path) = setup_temp_log();
    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    backend.apply(&set("a", 1)).unwrap();
    backend.apply(&set("b", "two")).unwrap();
    backend.apply(&set("a", 3)).unwrap();

    assert_eq!(backend.get("a"), Some(Value::Int(3)));
    assert_eq!(backend.get("b"), Some(Value::from("two")));
    assert_eq!(backend.len(), 2);
}

#[test]
fn test_entries_survive_reopen() {
    let (_temp, path) = setup_temp_log();

    {
        let backend =
            FileBackend::open(&path, SyncStrategy::EveryNEntries { count: 100 }).unwrap();
        backend.apply(&set("a", 1)).unwrap();
        backend.apply(&set("b", 2.5)).unwrap();
        backend.apply(&set("c", vec![1u8, 2, 3])).unwrap();
        backend.apply(&delete("a")).unwrap();
        backend.close().unwrap();
    }

    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert_eq!(
        sorted(backend.load().unwrap()),
        vec![
            ("b".to_string(), Value::Float(2.5)),
            ("c".to_string(), Value::Bytes(vec![1, 2, 3])),
        ]
    );
}

#[test]
fn test_drop_closes_and_persists() {
    let (_temp, path) = setup_temp_log();

    {
        let backend =
            FileBackend::open(&path, SyncStrategy::EveryNEntries { count: 1000 }).unwrap();
        backend.apply(&set("kept", true)).unwrap();
    }

    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(backend.get("kept"), Some(Value::Bool(true)));
}

#[test]
fn test_delete_absent_key_is_noop() {
    let (_temp, path) = setup_temp_log();
    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    backend.apply(&delete("missing")).unwrap();

    assert!(backend.is_empty());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_torn_tail_is_truncated() {
    let (_temp, path) = setup_temp_log();

    {
        let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
        backend.apply(&set("a", 1)).unwrap();
        backend.apply(&set("b", 2)).unwrap();
        backend.close().unwrap();
    }
    let intact_len = fs::metadata(&path).unwrap().len();

    // Half a header: a write interrupted mid-record
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; RECORD_HEADER_SIZE / 2]).unwrap();
    }

    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    let recovery = backend.recovery();

    assert_eq!(recovery.records_recovered, 2);
    assert_eq!(recovery.bytes_truncated, (RECORD_HEADER_SIZE / 2) as u64);
    assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
    assert_eq!(backend.get("a"), Some(Value::Int(1)));
    assert_eq!(backend.get("b"), Some(Value::Int(2)));
}

#[test]
fn test_corrupted_record_stops_replay() {
    let (_temp, path) = setup_temp_log();

    {
        let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
        backend.apply(&set("a", 1)).unwrap();
        backend.close().unwrap();
    }
    let first_len = fs::metadata(&path).unwrap().len() as usize;

    {
        let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
        backend.apply(&set("b", 2)).unwrap();
        // No compaction: two records, both live
        backend.close().unwrap();
    }

    // Flip a payload byte in the second record
    let mut bytes = fs::read(&path).unwrap();
    let target = first_len + RECORD_HEADER_SIZE;
    bytes[target] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert_eq!(backend.recovery().records_recovered, 1);
    assert_eq!(
        backend.recovery().bytes_truncated,
        (bytes.len() - first_len) as u64
    );
    assert_eq!(backend.get("a"), Some(Value::Int(1)));
    assert_eq!(backend.get("b"), None);
}

#[test]
fn test_checksummed_but_undecodable_record_is_corruption() {
    let (_temp, path) = setup_temp_log();

    {
        let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
        backend.apply(&set("a", 1)).unwrap();
        backend.close().unwrap();
    }

    // Valid framing and checksum around an unknown variant tag
    let payload = [0xFFu8; 4];
    let mut record = Vec::new();
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&record).unwrap();
    }
    let len_before = fs::metadata(&path).unwrap().len();

    let result = FileBackend::open(&path, SyncStrategy::EveryWrite);

    assert!(matches!(result, Err(LeakError::Corruption(_))));
    // Nothing was truncated
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}

#[test]
fn test_close_compacts_superseded_records() {
    let (_temp, path) = setup_temp_log();

    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    for i in 0..50 {
        backend.apply(&set("counter", i)).unwrap();
    }
    backend.apply(&set("gone", 0)).unwrap();
    backend.apply(&delete("gone")).unwrap();
    let before = fs::metadata(&path).unwrap().len();

    backend.close().unwrap();
    let after = fs::metadata(&path).unwrap().len();
    assert!(after < before);

    let reopened = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(reopened.recovery().records_recovered, 1);
    assert_eq!(reopened.get("counter"), Some(Value::Int(49)));
    assert_eq!(reopened.get("gone"), None);
}

#[test]
fn test_closed_backend_rejects_operations() {
    let (_temp, path) = setup_temp_log();
    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();

    backend.close().unwrap();
    backend.close().unwrap();

    assert!(backend.is_closed());
    assert!(matches!(backend.apply(&set("a", 1)), Err(LeakError::BackendClosed)));
    assert!(matches!(backend.sync(), Err(LeakError::BackendClosed)));
    assert!(matches!(backend.load(), Err(LeakError::BackendClosed)));
}

#[test]
fn test_display() {
    let (_temp, path) = setup_temp_log();
    let backend = FileBackend::open(&path, SyncStrategy::EveryWrite).unwrap();
    backend.apply(&set("a", 1)).unwrap();

    let shown = backend.to_string();
    assert!(shown.starts_with(&path.display().to_string()));
    assert!(shown.ends_with(":: 1 items"));
}

// =============================================================================
// MemoryBackend Tests
// =============================================================================

#[test]
fn test_memory_backend_apply() {
    let backend = MemoryBackend::new();

    backend.apply(&set("a", 1)).unwrap();
    backend.apply(&set("b", 2)).unwrap();
    backend.apply(&delete("a")).unwrap();

    assert_eq!(backend.get("a"), None);
    assert_eq!(backend.get("b"), Some(Value::Int(2)));
    assert_eq!(backend.applied(), 3);
}

#[test]
fn test_memory_backend_with_entries() {
    let backend = MemoryBackend::with_entries(vec![
        ("x".to_string(), Value::Int(1)),
        ("y".to_string(), Value::Int(2)),
    ]);

    assert_eq!(backend.len(), 2);
    assert_eq!(
        sorted(backend.load().unwrap()),
        vec![
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
        ]
    );
}

#[test]
fn test_memory_backend_fail_next() {
    let backend = MemoryBackend::new();
    backend.fail_next(2);

    assert!(matches!(backend.apply(&set("a", 1)), Err(LeakError::Backend(_))));
    assert!(matches!(backend.apply(&set("a", 1)), Err(LeakError::Backend(_))));
    backend.apply(&set("a", 1)).unwrap();

    assert_eq!(backend.get("a"), Some(Value::Int(1)));
    assert_eq!(backend.applied(), 1);
}

#[test]
fn test_memory_backend_close() {
    let backend = MemoryBackend::new();
    backend.close().unwrap();

    assert!(backend.is_closed());
    assert!(matches!(backend.apply(&set("a", 1)), Err(LeakError::BackendClosed)));
}
