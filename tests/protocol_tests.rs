//! Tests for the record protocol
//!
//! These tests verify:
//! - Frame encoding and decoding
//! - Rejection of torn, corrupted and oversized frames
//! - Record <-> mutation conversion
//! - Applying records to a store

use std::io::Cursor;

use leakkv::protocol::{
    decode_record, encode_record, read_record, write_record, ApplyRecord, Item, Operation, Record,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use leakkv::queue::QueueItem;
use leakkv::store::{MemoryStore, Mutation, Value};
use leakkv::LeakError;

// =============================================================================
// Codec Tests
// =============================================================================

#[test]
fn test_encode_decode_set() {
    let record = Record::set("user:1", "alice");

    let frame = encode_record(&record).unwrap();
    let decoded = decode_record(&frame).unwrap();

    assert_eq!(decoded, record);
}

#[test]
fn test_frame_header_is_big_endian_length_then_crc() {
    let record = Record::delete("gone");
    let frame = encode_record(&record).unwrap();

    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let crc = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);

    assert_eq!(frame.len(), HEADER_SIZE + len);
    assert_eq!(crc, crc32fast::hash(&frame[HEADER_SIZE..]));
}

#[test]
fn test_decode_incomplete_header() {
    let result = decode_record(&[0, 0, 0]);
    assert!(matches!(result, Err(LeakError::Protocol(_))));
}

#[test]
fn test_decode_incomplete_payload() {
    let frame = encode_record(&Record::set("k", 1)).unwrap();
    let result = decode_record(&frame[..frame.len() - 1]);
    assert!(matches!(result, Err(LeakError::Protocol(_))));
}

#[test]
fn test_decode_checksum_mismatch() {
    let mut frame = encode_record(&Record::set("k", 1)).unwrap().to_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    match decode_record(&frame) {
        Err(LeakError::Protocol(msg)) => assert!(msg.contains("Checksum mismatch")),
        other => panic!("expected checksum error, got {:?}", other),
    }
}

#[test]
fn test_decode_oversized_length() {
    let mut frame = Vec::new();
    frame.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());

    match decode_record(&frame) {
        Err(LeakError::Protocol(msg)) => assert!(msg.contains("too large")),
        other => panic!("expected size error, got {:?}", other),
    }
}

#[test]
fn test_stream_read_write_several_records() {
    let records = vec![
        Record::set("a", 1),
        Record::set("b", vec![Value::Int(1), Value::from("two")]),
        Record::delete("a"),
    ];

    let mut buf = Vec::new();
    for record in &records {
        write_record(&mut buf, record).unwrap();
    }

    let mut cursor = Cursor::new(buf);
    for expected in &records {
        assert_eq!(&read_record(&mut cursor).unwrap(), expected);
    }

    // Clean end of stream surfaces as an I/O error
    assert!(matches!(read_record(&mut cursor), Err(LeakError::Io(_))));
}

// =============================================================================
// Record Tests
// =============================================================================

#[test]
fn test_record_constructors() {
    let set = Record::set("k", 5);
    assert_eq!(set.operation, Operation::Set);
    assert_eq!(
        set.item,
        Item::Entry {
            key: "k".to_string(),
            value: Value::Int(5),
        }
    );
    assert!(set.date > 0);

    let delete = Record::delete("k");
    assert_eq!(delete.operation, Operation::Delete);
    assert_eq!(delete.item, Item::Key("k".to_string()));
}

#[test]
fn test_into_mutation() {
    assert_eq!(
        Record::set("k", true).into_mutation().unwrap(),
        Mutation::Set {
            key: "k".to_string(),
            value: Value::Bool(true),
        }
    );
    assert_eq!(
        Record::delete("k").into_mutation().unwrap(),
        Mutation::Delete {
            key: "k".to_string(),
        }
    );
}

#[test]
fn test_into_mutation_rejects_mismatch() {
    let record = Record {
        operation: Operation::Set,
        item: Item::Key("k".to_string()),
        date: 0,
    };

    assert!(matches!(record.into_mutation(), Err(LeakError::Protocol(_))));
}

#[test]
fn test_record_from_queue_item() {
    let item = QueueItem::new(
        Mutation::Set {
            key: "k".to_string(),
            value: Value::Float(1.5),
        },
        1234,
    );

    let record = Record::from(&item);

    assert_eq!(record.operation, Operation::Set);
    assert_eq!(record.date, 1234);
    assert_eq!(record.into_mutation().unwrap(), item.mutation);
}

// =============================================================================
// Apply Tests
// =============================================================================

#[test]
fn test_apply_record_to_memory_store() {
    let store = MemoryStore::new();

    assert!(store.apply_record(Record::set("a", 1)).unwrap());
    assert_eq!(store.get("a"), Some(Value::Int(1)));

    assert!(store.apply_record(Record::delete("a")).unwrap());
    assert!(!store.apply_record(Record::delete("a")).unwrap());
    assert_eq!(store.get("a"), None);
}

#[test]
fn test_apply_record_empty_key_is_rejected() {
    let store = MemoryStore::new();

    assert!(!store.apply_record(Record::set("", 1)).unwrap());
    assert!(store.is_empty());
}
