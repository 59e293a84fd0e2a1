//! Tests for ProcessPoolServer
//!
//! These tests verify:
//! - Pre-forked workers serve LIST/GET/PUT on one shared listener
//! - Workers run in parallel (a silent client blocks only one of them, and
//!   P slow GETs finish in about the time of one)
//! - Both worker attachment strategies accept connections
//! - The parent terminates and reaps every worker on shutdown

#![cfg(unix)]

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::kill;
use poolfs::network::{ProcessPoolServer, WorkerAttach, WorkerGroup};
use poolfs::protocol::{encode_frame, read_frame, Response};
use poolfs::{ClientConfig, ClientSession, CommandDispatcher, Config, FileStore};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Forks happen one test at a time so children never inherit another
/// test's sockets
static FORK_LOCK: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn start_pool(workers: usize, attach: WorkerAttach) -> (TempDir, WorkerGroup) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .store_dir(temp.path())
        .host("127.0.0.1")
        .port(0)
        .process_pool_size(workers)
        .build();

    let store = FileStore::open(&config.store_dir).unwrap();
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(store)));
    let group = ProcessPoolServer::new(config, dispatcher)
        .with_attach(attach)
        .start()
        .unwrap();
    (temp, group)
}

fn client(addr: SocketAddr) -> ClientSession {
    ClientSession::new(
        ClientConfig::builder()
            .addr(addr)
            .timeout(Duration::from_secs(5))
            .retries(2)
            .build(),
    )
}

/// Keep listing until a worker answers (reuse-port workers bind after fork)
fn wait_until_serving(addr: SocketAddr) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !client(addr).list().success {
        assert!(Instant::now() < deadline, "no worker is serving {}", addr);
        thread::sleep(Duration::from_millis(20));
    }
}

// =============================================================================
// Serving Tests
// =============================================================================

#[test]
fn test_workers_serve_put_get_list() {
    let _serial = serial();
    let (temp, group) = start_pool(2, WorkerAttach::Inherit);
    assert_eq!(group.len(), 2);
    let session = client(group.local_addr());

    assert!(session.upload_bytes("b.txt", b"bee").success);
    assert!(session.upload_bytes("a.txt", b"hello").success);

    let listing = session.list();
    assert_eq!(listing.files, vec!["a.txt", "b.txt"]);

    // Whichever worker answers, the store is the same directory
    assert_eq!(std::fs::read(temp.path().join("a.txt")).unwrap(), b"hello");
    let response = session.send(&poolfs::protocol::Command::Get {
        filename: "a.txt".into(),
    });
    assert_eq!(response.as_text(), Some("aGVsbG8="));

    group.stop().unwrap();
}

#[test]
fn test_missing_file_does_not_kill_worker() {
    let _serial = serial();
    let (_temp, group) = start_pool(1, WorkerAttach::Inherit);
    let session = client(group.local_addr());

    let result = session.download("missing.bin");
    assert!(!result.success);
    assert_eq!(result.attempts, 1);

    assert!(session.list().success);
    assert_eq!(group.len(), 1);
    group.stop().unwrap();
}

#[test]
fn test_silent_client_blocks_only_one_worker() {
    let _serial = serial();
    let (_temp, group) = start_pool(2, WorkerAttach::Inherit);

    let silent = TcpStream::connect(group.local_addr()).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(client(group.local_addr()).list().success);

    drop(silent);
    group.stop().unwrap();
}

#[test]
fn test_parallel_long_gets_take_one_request_time() {
    const WORKERS: usize = 4;
    const CLIENT_DELAY: Duration = Duration::from_millis(300);

    let _serial = serial();
    let (temp, group) = start_pool(WORKERS, WorkerAttach::Inherit);
    let addr = group.local_addr();
    let contents = vec![0x5a_u8; 4 << 20];
    std::fs::write(temp.path().join("big.bin"), &contents).unwrap();

    // Each request keeps its worker busy for CLIENT_DELAY before it is
    // complete, so serial service would take WORKERS times as long
    let started = Instant::now();
    let requests: Vec<_> = (0..WORKERS)
        .map(|_| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                stream.write_all(b"GET big").unwrap();
                thread::sleep(CLIENT_DELAY);
                stream.write_all(&encode_frame(b".bin")).unwrap();
                Response::from_json(&read_frame(&mut stream).unwrap()).unwrap()
            })
        })
        .collect();

    for request in requests {
        let response = request.join().unwrap();
        assert!(response.is_ok(), "GET failed: {}", response.describe());
        assert_eq!(response.as_text().map(str::len), Some((4 << 20) / 3 * 4 + 4));
    }
    let elapsed = started.elapsed();

    assert!(
        elapsed < CLIENT_DELAY * 3,
        "{} parallel GETs took {:?}",
        WORKERS,
        elapsed
    );
    group.stop().unwrap();
}

#[test]
fn test_reuse_port_workers() {
    let _serial = serial();
    let (_temp, group) = start_pool(2, WorkerAttach::ReusePort);
    let addr = group.local_addr();
    assert_ne!(addr.port(), 0);

    wait_until_serving(addr);
    assert!(client(addr).upload_bytes("r.txt", b"reuse").success);
    assert_eq!(client(addr).list().files, vec!["r.txt"]);

    group.stop().unwrap();
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_stop_reaps_workers() {
    let _serial = serial();
    let (_temp, group) = start_pool(3, WorkerAttach::Inherit);
    let pids = group.pids().to_vec();
    assert_eq!(pids.len(), 3);

    group.stop().unwrap();

    for pid in pids {
        assert!(kill(pid, None).is_err(), "worker {} still alive", pid);
    }
}

#[test]
fn test_wait_returns_on_shutdown_flag() {
    let _serial = serial();
    let (_temp, mut group) = start_pool(2, WorkerAttach::Inherit);
    let shutdown = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&shutdown);
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        flag.store(true, Ordering::SeqCst);
    });

    group.wait(&shutdown).unwrap();
    trigger.join().unwrap();
    assert!(group.is_empty());
}

#[test]
fn test_wait_returns_when_workers_die() {
    let _serial = serial();
    let (_temp, mut group) = start_pool(2, WorkerAttach::Inherit);

    for &pid in group.pids() {
        kill(pid, nix::sys::signal::Signal::SIGKILL).unwrap();
    }

    let never = AtomicBool::new(false);
    group.wait(&never).unwrap();
    assert!(group.is_empty());
}
