//! Network integration tests
//!
//! These tests verify:
//! - A publisher's records are applied by a subscriber
//! - Several publishers can publish concurrently
//! - Malformed frames end only the offending connection
//! - Connections over the limit are refused

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use leakkv::backend::MemoryBackend;
use leakkv::config::Config;
use leakkv::network::{Publisher, Subscriber};
use leakkv::store::{MemoryStore, Value};
use leakkv::WriteBehindStore;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(max_connections: usize) -> Config {
    Config::builder()
        .name("net-test")
        .listen_addr("127.0.0.1:0")
        .max_connections(max_connections)
        .workers(1)
        .idle_wait_ms(5)
        .build()
        .unwrap()
}

fn start_subscriber(
    store: Arc<MemoryStore>,
    max_connections: usize,
) -> (Arc<Subscriber<MemoryStore>>, JoinHandle<()>) {
    let subscriber = Arc::new(Subscriber::bind(test_config(max_connections), store).unwrap());
    let runner = Arc::clone(&subscriber);
    let handle = thread::spawn(move || runner.run().unwrap());
    (subscriber, handle)
}

/// Poll until `check` holds or five seconds pass
fn wait_for(check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

// =============================================================================
// Publish Tests
// =============================================================================

#[test]
fn test_publish_set_and_delete() {
    let store = Arc::new(MemoryStore::new());
    let (subscriber, handle) = start_subscriber(Arc::clone(&store), 8);

    let mut publisher = Publisher::connect(subscriber.local_addr()).unwrap();
    publisher.set("a", 1).unwrap();
    publisher.set("b", "two").unwrap();
    publisher.delete("a").unwrap();

    assert!(wait_for(|| store.get("b").is_some() && store.get("a").is_none()));
    assert_eq!(store.get("b"), Some(Value::from("two")));

    subscriber.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_concurrent_publishers() {
    let store = Arc::new(MemoryStore::new());
    let (subscriber, handle) = start_subscriber(Arc::clone(&store), 8);
    let addr = subscriber.local_addr();

    let publishers: Vec<_> = (0..4)
        .map(|t| {
            thread::spawn(move || {
                let mut publisher = Publisher::connect(addr).unwrap();
                for i in 0..25 {
                    publisher.set(format!("p{}-{}", t, i), i).unwrap();
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.join().unwrap();
    }

    assert!(wait_for(|| store.len() == 100));
    assert_eq!(store.get("p2-24"), Some(Value::Int(24)));

    subscriber.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_malformed_frame_drops_connection_only() {
    let store = Arc::new(MemoryStore::new());
    let (subscriber, handle) = start_subscriber(Arc::clone(&store), 8);

    {
        let mut raw = TcpStream::connect(subscriber.local_addr()).unwrap();
        // Valid length, wrong checksum
        raw.write_all(&[0, 0, 0, 2, 0, 0, 0, 0, 0xFF, 0xFF]).unwrap();
    }

    let mut publisher = Publisher::connect(subscriber.local_addr()).unwrap();
    publisher.set("after", true).unwrap();

    assert!(wait_for(|| store.get("after") == Some(Value::Bool(true))));

    subscriber.shutdown();
    handle.join().unwrap();
}

#[test]
fn test_connections_over_limit_are_refused() {
    let store = Arc::new(MemoryStore::new());
    let (subscriber, handle) = start_subscriber(Arc::clone(&store), 1);

    let mut first = Publisher::connect(subscriber.local_addr()).unwrap();
    first.set("first", 1).unwrap();
    assert!(wait_for(|| store.get("first").is_some()));
    assert_eq!(subscriber.active_connections(), 1);

    // Accepted at the TCP level, then dropped without being read
    let mut second = Publisher::connect(subscriber.local_addr()).unwrap();
    let _ = second.set("second", 2);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(store.get("second"), None);

    drop(first);
    assert!(wait_for(|| subscriber.active_connections() == 0));

    subscriber.shutdown();
    handle.join().unwrap();
}

// =============================================================================
// Write-Behind Subscriber Tests
// =============================================================================

#[test]
fn test_published_records_reach_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let config = test_config(8);
    let store = Arc::new(WriteBehindStore::new(&config, backend.clone()).unwrap());

    let subscriber = Arc::new(Subscriber::bind(config, Arc::clone(&store)).unwrap());
    let runner = Arc::clone(&subscriber);
    let handle = thread::spawn(move || runner.run().unwrap());

    let mut publisher = Publisher::connect(subscriber.local_addr()).unwrap();
    publisher.set("k", 42).unwrap();

    assert!(wait_for(|| store.get("k").is_some()));
    store.flush();
    assert_eq!(backend.get("k"), Some(Value::Int(42)));

    subscriber.shutdown();
    handle.join().unwrap();
    store.close().unwrap();
}

#[test]
fn test_shutdown_from_another_thread_then_close_drains() {
    let backend = Arc::new(MemoryBackend::new());
    let config = test_config(8);
    let store = Arc::new(WriteBehindStore::new(&config, backend.clone()).unwrap());

    let subscriber = Arc::new(Subscriber::bind(config, Arc::clone(&store)).unwrap());
    let runner = Arc::clone(&subscriber);
    let handle = thread::spawn(move || runner.run());

    let mut publisher = Publisher::connect(subscriber.local_addr()).unwrap();
    for i in 0..20 {
        publisher.set(format!("k{}", i), i).unwrap();
    }
    assert!(wait_for(|| store.len() == 20));

    // What the server's signal handler does
    let signal = Arc::clone(&subscriber);
    thread::spawn(move || signal.shutdown()).join().unwrap();

    handle.join().unwrap().unwrap();
    store.close().unwrap();

    assert_eq!(backend.len(), 20);
    assert!(backend.is_closed());
}
