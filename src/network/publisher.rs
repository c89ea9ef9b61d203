//! Publisher client
//!
//! Sends records to a subscriber. No replies are read.

use std::io::BufWriter;
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::{LeakError, Result};
use crate::protocol::{write_record, Record};
use crate::store::Value;

pub struct Publisher {
    writer: BufWriter<TcpStream>,
    peer_addr: String,
}

impl Publisher {
    /// Connect to a subscriber
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| LeakError::Network(e.to_string()))?;
        stream.set_nodelay(true)?;

        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        tracing::debug!("Connected to subscriber {}", peer_addr);

        Ok(Self {
            writer: BufWriter::new(stream),
            peer_addr,
        })
    }

    /// Send one record
    pub fn publish(&mut self, record: &Record) -> Result<()> {
        write_record(&mut self.writer, record)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.publish(&Record::set(key, value))
    }

    pub fn delete(&mut self, key: impl Into<String>) -> Result<()> {
        self.publish(&Record::delete(key))
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
