//! Configuration for LeakKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LeakError, Result};
use crate::queue::RetryPolicy;

/// Main configuration for a LeakKV store instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Instance name, used to scope log output
    pub name: String,

    // -------------------------------------------------------------------------
    // Backend Configuration
    // -------------------------------------------------------------------------
    /// Durable log file backing the store
    pub data_path: PathBuf,

    /// Sync strategy: how often the backend fsyncs its log
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Queue Configuration
    // -------------------------------------------------------------------------
    /// Max queued items before producers block and flush (0 = unbounded)
    pub queue_capacity: usize,

    /// Number of worker threads draining the queue
    pub workers: usize,

    /// How long an idle worker waits for an item before polling again (milliseconds)
    pub idle_wait_ms: u64,

    /// What to do when the processor fails an item
    pub retry: RetryPolicy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for the record subscriber
    pub listen_addr: String,

    /// Max concurrent publisher connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,
}

/// Backend sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every applied mutation (safest, slowest)
    EveryWrite,

    /// fsync after N applied mutations
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "leakkv".to_string(),
            data_path: PathBuf::from("./leakkv.db"),
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            queue_capacity: 0,
            workers: 10,
            idle_wait_ms: 100,
            retry: RetryPolicy::default(),
            listen_addr: "127.0.0.1:5555".to_string(),
            max_connections: 64,
            read_timeout_ms: 0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Idle wait as a `Duration`
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Check that the configuration can be used to start a store
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LeakError::Config(
                "at least one queue worker is required".to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(LeakError::Config(
                "sync strategy entry count must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(LeakError::Config(
                "retry max_attempts must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the instance name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the durable log file path
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_path = path.into();
        self
    }

    /// Set the backend sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the queue capacity (0 = unbounded)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the worker pool size
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count;
        self
    }

    /// Set the idle wait (in milliseconds)
    pub fn idle_wait_ms(mut self, ms: u64) -> Self {
        self.config.idle_wait_ms = ms;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
