//! Connection Handler
//!
//! Handles a single publisher connection.

use std::io::{BufReader, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LeakError, Result};
use crate::protocol::{read_record, ApplyRecord};

/// Reads records from one publisher and applies them to the store
pub struct Connection<S: ApplyRecord> {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// Store the records are applied to
    store: Arc<S>,

    /// Peer address for logging
    peer_addr: String,

    /// Records applied so far
    applied: u64,
}

impl<S: ApplyRecord> Connection<S> {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, store: Arc<S>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Accepted from a non-blocking listener; reads here should block
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream),
            store,
            peer_addr,
            applied: 0,
        })
    }

    /// Configure the read timeout (0 = none)
    pub fn set_read_timeout(&mut self, read_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Returns when the publisher disconnects, times out, or sends a frame
    /// that cannot be read.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Publisher connected from {}", self.peer_addr);

        loop {
            let record = match read_record(&mut self.reader) {
                Ok(record) => record,
                Err(LeakError::Io(ref e)) => match e.kind() {
                    ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted => {
                        tracing::debug!(
                            "Publisher {} disconnected after {} records",
                            self.peer_addr,
                            self.applied
                        );
                        return Ok(());
                    }
                    // Windows reports TimedOut where unix reports WouldBlock
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                        tracing::debug!("Read timeout for publisher {}", self.peer_addr);
                        return Ok(());
                    }
                    _ => {
                        tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                        return Err(LeakError::Network(e.to_string()));
                    }
                },
                Err(e) => {
                    tracing::warn!("Bad frame from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            tracing::trace!("Received record from {}: {:?}", self.peer_addr, record);

            match self.store.apply_record(record) {
                Ok(_) => self.applied += 1,
                Err(e) => tracing::warn!("Rejected record from {}: {}", self.peer_addr, e),
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }
}
