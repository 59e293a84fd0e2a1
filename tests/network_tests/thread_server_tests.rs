//! Tests for ThreadPoolServer
//!
//! These tests verify:
//! - Lifecycle states (Idle → Listening → Running → Stopped)
//! - More simultaneous requests than workers all complete
//! - Admission control answers "server busy" once the queue is full,
//!   without stalling on refused peers that stay silent
//! - A silent connection occupies one worker, not the server
//! - Shutdown drains in-flight connections

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use poolfs::config::ConfigBuilder;
use poolfs::network::{ServerState, ShutdownHandle, ThreadPoolServer, SERVER_BUSY};
use poolfs::protocol::{read_frame, Response};
use poolfs::{ClientConfig, ClientSession, CommandDispatcher, Config, FileStore};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct RunningServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    thread: JoinHandle<poolfs::Result<()>>,
    _temp: TempDir,
}

impl RunningServer {
    fn stop(self) {
        self.handle.trigger();
        self.thread.join().unwrap().unwrap();
        assert_eq!(self.handle.state(), ServerState::Stopped);
    }
}

fn start_server(configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> RunningServer {
    let temp = TempDir::new().unwrap();
    let config = configure(
        Config::builder()
            .store_dir(temp.path())
            .host("127.0.0.1")
            .port(0)
            .shutdown_grace(Duration::from_secs(2)),
    )
    .build();

    let store = FileStore::open(&config.store_dir).unwrap();
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(store)));
    let mut server = ThreadPoolServer::new(config, dispatcher);
    let addr = server.bind().unwrap();
    let handle = server.shutdown_handle();

    let thread = thread::spawn(move || server.run());
    wait_for_state(&handle, ServerState::Running);

    RunningServer {
        addr,
        handle,
        thread,
        _temp: temp,
    }
}

fn wait_for_state(handle: &ShutdownHandle, state: ServerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.state() != state {
        assert!(Instant::now() < deadline, "server never reached {:?}", state);
        thread::sleep(Duration::from_millis(5));
    }
}

fn client(addr: SocketAddr) -> ClientSession {
    ClientSession::new(
        ClientConfig::builder()
            .addr(addr)
            .timeout(Duration::from_secs(5))
            .retries(1)
            .build(),
    )
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_lifecycle_states() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .store_dir(temp.path())
        .host("127.0.0.1")
        .port(0)
        .build();
    let store = FileStore::open(&config.store_dir).unwrap();
    let mut server = ThreadPoolServer::new(config, Arc::new(CommandDispatcher::new(Arc::new(store))));

    assert_eq!(server.state(), ServerState::Idle);
    let addr = server.bind().unwrap();
    assert_eq!(server.state(), ServerState::Listening);
    assert_eq!(server.local_addr(), Some(addr));
    assert_ne!(addr.port(), 0);

    let handle = server.shutdown_handle();
    let thread = thread::spawn(move || server.run());
    wait_for_state(&handle, ServerState::Running);

    handle.trigger();
    thread.join().unwrap().unwrap();
    assert_eq!(handle.state(), ServerState::Stopped);

    // Listener is gone after shutdown
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_invalid_config_rejected_at_bind() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .store_dir(temp.path())
        .host("127.0.0.1")
        .port(0)
        .thread_pool_size(0)
        .build();
    let store = FileStore::open(&config.store_dir).unwrap();
    let mut server = ThreadPoolServer::new(config, Arc::new(CommandDispatcher::new(Arc::new(store))));

    assert!(server.bind().is_err());
    assert_eq!(server.state(), ServerState::Idle);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_more_requests_than_workers_all_complete() {
    let server = start_server(|c| c.thread_pool_size(2).queue_capacity(64));
    let addr = server.addr;

    let uploads: Vec<_> = (0..6)
        .map(|i| {
            thread::spawn(move || {
                let data = vec![i as u8; 64 * 1024];
                client(addr).upload_bytes(&format!("file_{}.bin", i), &data)
            })
        })
        .collect();

    for upload in uploads {
        let result = upload.join().unwrap();
        assert!(result.success, "upload failed: {:?}", result.error);
        assert_eq!(result.size, 64 * 1024);
    }

    let listing = client(addr).list();
    assert!(listing.success);
    assert_eq!(listing.files.len(), 6);

    server.stop();
}

#[test]
fn test_silent_connection_does_not_block_other_workers() {
    let server = start_server(|c| c.thread_pool_size(2));

    // Occupies one worker indefinitely (no server read timeout)
    let silent = TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(100));

    let listing = client(server.addr).list();
    assert!(listing.success);

    drop(silent);
    server.stop();
}

#[test]
fn test_full_queue_answers_busy() {
    let server = start_server(|c| {
        c.thread_pool_size(1)
            .queue_capacity(1)
            .shutdown_grace(Duration::from_millis(200))
    });

    // First fills the only worker, second fills the queue
    let busy_worker = TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(100));
    let queued = TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(100));

    let response = client(server.addr).send(&poolfs::protocol::Command::List);
    assert_eq!(response, Response::error(SERVER_BUSY));

    drop(busy_worker);
    drop(queued);
    server.stop();
}

#[test]
fn test_busy_reply_not_delayed_by_silent_rejects() {
    let server = start_server(|c| {
        c.thread_pool_size(1)
            .queue_capacity(1)
            .shutdown_grace(Duration::from_millis(200))
    });

    let busy_worker = TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(100));
    let queued = TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(100));

    // Refused connections that never send a request; spaced out so the
    // small accept backlog never overflows
    let silent: Vec<TcpStream> = (0..8)
        .map(|_| {
            let stream = TcpStream::connect(server.addr).unwrap();
            thread::sleep(Duration::from_millis(25));
            stream
        })
        .collect();

    let started = Instant::now();
    let response = client(server.addr).send(&poolfs::protocol::Command::List);
    let elapsed = started.elapsed();

    assert_eq!(response, Response::error(SERVER_BUSY));
    assert!(
        elapsed < Duration::from_millis(200),
        "busy reply took {:?}",
        elapsed
    );

    drop(silent);
    drop(busy_worker);
    drop(queued);
    server.stop();
}

#[test]
fn test_read_timeout_frees_worker() {
    let server = start_server(|c| {
        c.thread_pool_size(1)
            .read_timeout(Some(Duration::from_millis(100)))
    });

    let _silent = TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(50));

    // Waits for the silent client to time out, then gets the only worker
    let listing = client(server.addr).list();
    assert!(listing.success);

    server.stop();
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_drains_in_flight_connection() {
    let server = start_server(|c| c.thread_pool_size(1));

    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.write_all(b"LI").unwrap();
    thread::sleep(Duration::from_millis(100));

    server.handle.trigger();
    wait_for_state(&server.handle, ServerState::Draining);

    // The worker is still allowed to finish this exchange
    stream.write_all(b"ST\r\n\r\n").unwrap();
    let frame = read_frame(&mut stream).unwrap();
    assert_eq!(Response::from_json(&frame).unwrap(), Response::files(vec![]));

    server.thread.join().unwrap().unwrap();
    assert_eq!(server.handle.state(), ServerState::Stopped);
}
