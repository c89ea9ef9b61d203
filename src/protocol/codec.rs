//! Protocol codec
//!
//! Encoding and decoding functions for record frames.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ CRC (4)  │     bincode(Record)         │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! Both header fields are big-endian; the CRC covers the payload only.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{LeakError, Result};

use super::Record;

/// Header size: 4 bytes length + 4 bytes CRC
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Encode a record into a complete frame
pub fn encode_record(record: &Record) -> Result<Bytes> {
    let payload = bincode::serialize(record)?;

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(LeakError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.put_slice(&payload);

    Ok(frame.freeze())
}

/// Decode a record from a complete frame
pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    if bytes.len() < HEADER_SIZE {
        return Err(LeakError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let payload_len = header.get_u32();
    let crc = header.get_u32();

    validate_len(payload_len)?;

    let total_len = HEADER_SIZE + payload_len as usize;
    if bytes.len() < total_len {
        return Err(LeakError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    decode_payload(&bytes[HEADER_SIZE..total_len], crc)
}

/// Read one frame from a stream
pub fn read_record<R: Read>(reader: &mut R) -> Result<Record> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let mut header = &header[..];
    let payload_len = header.get_u32();
    let crc = header.get_u32();

    validate_len(payload_len)?;

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload)?;

    decode_payload(&payload, crc)
}

/// Write one frame to a stream and flush it
pub fn write_record<W: Write>(writer: &mut W, record: &Record) -> Result<()> {
    let frame = encode_record(record)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

fn validate_len(payload_len: u32) -> Result<()> {
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(LeakError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}

fn decode_payload(payload: &[u8], crc: u32) -> Result<Record> {
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(LeakError::Protocol(format!(
            "Checksum mismatch: expected {:08x}, got {:08x}",
            crc, actual
        )));
    }

    Ok(bincode::deserialize(payload)?)
}
