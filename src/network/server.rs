//! TCP Subscriber
//!
//! Accepts publisher connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{LeakError, Result};
use crate::protocol::ApplyRecord;

use super::Connection;

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Receives records over TCP and applies them to a store
///
/// Publishing is fire-and-forget: nothing is written back to publishers.
pub struct Subscriber<S: ApplyRecord + 'static> {
    config: Config,
    store: Arc<S>,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl<S: ApplyRecord + 'static> Subscriber<S> {
    /// Bind to `config.listen_addr`
    pub fn bind(config: Config, store: Arc<S>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            LeakError::Network(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Subscriber listening on {}", local_addr);

        Ok(Self {
            config,
            store,
            listener,
            local_addr,
            shutdown: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of publishers currently connected
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until `shutdown` is called (blocking)
    ///
    /// Connection threads are detached; they end when their publisher
    /// disconnects.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("accept failed: {}", e);
                    return Err(LeakError::Io(e));
                }
            };

            if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                tracing::warn!(
                    "Rejecting {}: {} connections already open",
                    peer,
                    self.config.max_connections
                );
                drop(stream);
                continue;
            }

            let mut connection = match Connection::new(stream, Arc::clone(&self.store)) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("Failed to set up connection from {}: {}", peer, e);
                    continue;
                }
            };
            if let Err(e) = connection.set_read_timeout(self.config.read_timeout_ms) {
                tracing::warn!("Failed to set read timeout for {}: {}", peer, e);
                continue;
            }

            let active = Arc::clone(&self.active);
            active.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("{}-conn-{}", self.config.name, peer))
                .spawn(move || {
                    if let Err(e) = connection.handle() {
                        tracing::debug!("Connection {} ended with error: {}", connection.peer_addr(), e);
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });

            if let Err(e) = spawned {
                self.active.fetch_sub(1, Ordering::SeqCst);
                tracing::error!("Failed to spawn connection thread: {}", e);
            }
        }

        tracing::info!("Subscriber on {} stopped", self.local_addr);
        Ok(())
    }

    /// Signal `run` to return
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
