//! RemoteStore Tests
//!
//! Runs a real server on an ephemeral port and talks to it over TCP.
//!
//! Tests verify:
//! - Every KvStore operation round-trips through the server
//! - Lock semantics hold across separate clients
//! - Failures map to ConnectionUnavailable / StoreOperationFailed

use std::io::{BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use atlaslock::network::{Server, ShutdownHandle};
use atlaslock::protocol::{read_response, write_command, Command, Status};
use atlaslock::store::{KeyTtl, KvStore, RemoteStore};
use atlaslock::{Config, Engine, LockCoordinator, LockError};

// =============================================================================
// Test Server
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    engine: Arc<Engine>,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with(Config::builder())
    }

    fn start_with(builder: atlaslock::config::ConfigBuilder) -> Self {
        let config = builder
            .listen_addr("127.0.0.1:0")
            .reaper_interval_ms(10)
            .build();
        let engine = Arc::new(Engine::open(config.clone()).unwrap());

        let mut server = Server::new(config, Arc::clone(&engine));
        let addr = server.bind().unwrap();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run().unwrap());

        Self {
            addr,
            engine,
            shutdown,
            thread: Some(thread),
        }
    }

    fn client(&self) -> RemoteStore {
        let config = Config::builder()
            .store_addr(self.addr.to_string())
            .pool_max_size(4)
            .pool_connection_timeout_ms(500)
            .client_io_timeout_ms(2000)
            .build();
        RemoteStore::connect(&config).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.engine.close();
    }
}

// =============================================================================
// KvStore Operation Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = TestServer::start();
    assert!(server.client().ping().is_ok());
}

#[test]
fn test_conditional_set_and_get() {
    let server = TestServer::start();
    let store = server.client();

    assert!(store.conditional_set("k", "v1", Duration::from_secs(30)).unwrap());
    assert!(!store.conditional_set("k", "v2", Duration::from_secs(30)).unwrap());

    assert_eq!(store.get("k").unwrap(), Some("v1".to_string()));
    assert_eq!(store.get("missing").unwrap(), None);
}

#[test]
fn test_compare_and_delete() {
    let server = TestServer::start();
    let store = server.client();
    store.conditional_set("k", "mine", Duration::from_secs(30)).unwrap();

    assert!(!store.compare_and_delete("k", "theirs").unwrap());
    assert!(store.compare_and_delete("k", "mine").unwrap());
    assert!(!store.compare_and_delete("k", "mine").unwrap());
}

#[test]
fn test_ttl_and_expire() {
    let server = TestServer::start();
    let store = server.client();

    assert_eq!(store.ttl("k").unwrap(), KeyTtl::Missing);
    assert!(!store.expire("k", Duration::from_secs(5)).unwrap());

    store.set("k", "v").unwrap();
    assert_eq!(store.ttl("k").unwrap(), KeyTtl::Persistent);

    assert!(store.expire("k", Duration::from_secs(5)).unwrap());
    assert!(matches!(store.ttl("k").unwrap(), KeyTtl::Expires(_)));
}

#[test]
fn test_compare_and_expire() {
    let server = TestServer::start();
    let store = server.client();
    store.conditional_set("k", "mine", Duration::from_millis(50)).unwrap();

    assert!(!store.compare_and_expire("k", "theirs", Duration::from_secs(30)).unwrap());
    assert!(store.compare_and_expire("k", "mine", Duration::from_secs(30)).unwrap());

    thread::sleep(Duration::from_millis(100));
    assert_eq!(store.get("k").unwrap(), Some("mine".to_string()));
}

#[test]
fn test_server_expires_keys() {
    let server = TestServer::start();
    let store = server.client();
    store.conditional_set("k", "v", Duration::from_millis(20)).unwrap();

    thread::sleep(Duration::from_millis(100));

    assert_eq!(store.get("k").unwrap(), None);
    assert_eq!(server.engine.key_count(), 0);
}

// =============================================================================
// Lock Over TCP Tests
// =============================================================================

#[test]
fn test_lock_excludes_across_clients() {
    let server = TestServer::start();
    let a = LockCoordinator::new(server.client());
    let b = LockCoordinator::new(server.client());

    let handle = a.acquire("orders:42", Duration::from_secs(30)).unwrap();
    assert!(matches!(
        b.acquire("orders:42", Duration::from_secs(30)),
        Err(LockError::AlreadyLocked { .. })
    ));

    // A foreign handle for the same key cannot release it
    let foreign = b.acquire("orders:43", Duration::from_secs(30)).unwrap();
    let forged = atlaslock::LockHandle::from_parts(
        "orders:42".to_string(),
        *foreign.token(),
        std::time::SystemTime::now(),
        Duration::from_secs(30),
    );
    assert!(!b.release(&forged).unwrap());

    assert!(a.release(&handle).unwrap());
    assert!(b.acquire("orders:42", Duration::from_secs(30)).is_ok());
}

#[test]
fn test_concurrent_clients_single_winner() {
    let server = TestServer::start();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let coordinator = LockCoordinator::new(server.client());
            thread::spawn(move || coordinator.acquire("shared", Duration::from_secs(30)).is_ok())
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);
}

#[test]
fn test_blocking_acquire_over_tcp() {
    let server = TestServer::start();
    let holder = LockCoordinator::new(server.client());
    let waiter = LockCoordinator::new(server.client());

    let handle = holder.acquire("job", Duration::from_secs(30)).unwrap();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        holder.release(&handle).unwrap()
    });

    let policy = atlaslock::LockPolicy::from_millis(5000, 5, 2000);
    let acquired = waiter.acquire_with_wait("job", &policy, &atlaslock::CancelToken::never());

    assert!(releaser.join().unwrap());
    assert!(acquired.is_ok());
}

// =============================================================================
// Failure Mapping Tests
// =============================================================================

#[test]
fn test_unreachable_server_is_connection_unavailable() {
    // Grab a free port, then close it
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();

    let config = Config::builder()
        .store_addr(addr.to_string())
        .pool_connection_timeout_ms(200)
        .build();
    let store = RemoteStore::connect(&config).unwrap();

    assert!(matches!(store.ping(), Err(LockError::ConnectionUnavailable(_))));

    let coordinator = LockCoordinator::new(store);
    assert!(matches!(
        coordinator.acquire("k", Duration::from_secs(1)),
        Err(LockError::ConnectionUnavailable(_))
    ));
}

#[test]
fn test_closed_client_refuses_requests() {
    let server = TestServer::start();
    let store = server.client();

    store.close();

    assert!(matches!(store.ping(), Err(LockError::ConnectionUnavailable(_))));
}

#[test]
fn test_malformed_frame_gets_error_response() {
    let server = TestServer::start();
    let stream = TcpStream::connect(server.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = BufWriter::new(stream);

    // Unknown command type 0x7f with empty payload
    writer.write_all(&[0x7f, 0, 0, 0, 0]).unwrap();
    writer.flush().unwrap();

    let response = read_response(&mut reader).unwrap();
    assert_eq!(response.status, Status::Error);
}

#[test]
fn test_raw_protocol_session() {
    let server = TestServer::start();
    let stream = TcpStream::connect(server.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = BufWriter::new(stream);

    let set = Command::SetNxPx {
        key: "k".to_string(),
        value: "tok".to_string(),
        ttl_ms: 10_000,
    };
    write_command(&mut writer, &set).unwrap();
    assert!(read_response(&mut reader).unwrap().as_flag().unwrap());

    write_command(&mut writer, &Command::PTtl { key: "k".to_string() }).unwrap();
    let pttl = read_response(&mut reader).unwrap().as_integer().unwrap();
    assert!(pttl > 0 && pttl <= 10_000);

    write_command(&mut writer, &Command::Get { key: "nope".to_string() }).unwrap();
    assert_eq!(read_response(&mut reader).unwrap().status, Status::NotFound);
}
