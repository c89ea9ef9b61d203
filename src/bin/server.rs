//! LeakKV Server Binary
//!
//! Opens a write-behind store on a log file and applies records published
//! to it over TCP.

use std::sync::Arc;

use clap::Parser;
use leakkv::network::Subscriber;
use leakkv::{Config, RetryPolicy, WriteBehindStore};
use tracing_subscriber::{fmt, EnvFilter};

/// LeakKV Server
#[derive(Parser, Debug)]
#[command(name = "leakkv-server")]
#[command(about = "Write-behind key-value store with a record subscriber")]
#[command(version)]
struct Args {
    /// Durable log file
    #[arg(short, long, default_value = "./leakkv.db")]
    data_path: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    listen: String,

    /// Number of queue workers
    #[arg(short, long, default_value = "10")]
    workers: usize,

    /// Queue capacity before producers flush (0 = unbounded)
    #[arg(short = 'q', long, default_value = "0")]
    queue_capacity: usize,

    /// Failures allowed per item before it is dead-lettered (0 = unlimited)
    #[arg(short = 'r', long, default_value = "16")]
    max_attempts: u32,

    /// Maximum concurrent publisher connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,leakkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("LeakKV Server v{}", leakkv::VERSION);
    tracing::info!("Data path: {}", args.data_path);
    tracing::info!("Listen address: {}", args.listen);

    let retry = RetryPolicy {
        max_attempts: (args.max_attempts > 0).then_some(args.max_attempts),
        ..RetryPolicy::default()
    };

    // Build config from args
    let config = match Config::builder()
        .name("leakkv-server")
        .data_path(&args.data_path)
        .listen_addr(&args.listen)
        .workers(args.workers)
        .queue_capacity(args.queue_capacity)
        .retry(retry)
        .max_connections(args.max_connections)
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // Open store (primes memory from the log file)
    let store = match WriteBehindStore::open(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Store ready: {}", store);

    let subscriber = match Subscriber::bind(config, Arc::clone(&store)) {
        Ok(subscriber) => Arc::new(subscriber),
        Err(e) => {
            tracing::error!("Failed to start subscriber: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl-C stops accepting; the store is then drained and closed below
    let on_signal = Arc::clone(&subscriber);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        on_signal.shutdown();
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    let outcome = subscriber.run();

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store cleanly: {}", e);
    }

    if let Err(e) = outcome {
        tracing::error!("Subscriber error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
