//! Protocol Module
//!
//! Defines the record message exchanged between publishers and a
//! subscribed store.
//!
//! ## Record Shape
//! ```text
//! { operation: "set" | "delete", item: <key> | {key: value}, date: unix-millis }
//! ```
//! The same shape a queue item has, so a record can be built from one.
//!
//! ## Framing
//! Records travel as length + CRC framed bincode (see `encode_record`).

mod codec;
mod record;

pub use codec::{
    decode_record, encode_record, read_record, write_record, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use record::{ApplyRecord, Item, Operation, Record};
