//! Network Module
//!
//! Publish/subscribe transport for records.
//!
//! ## Architecture
//! - Non-blocking accept loop polled until shutdown
//! - One thread per publisher connection
//! - Records applied through the same path as a local caller

mod connection;
mod publisher;
mod server;

pub use connection::Connection;
pub use publisher::Publisher;
pub use server::Subscriber;
