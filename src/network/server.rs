//! Thread-pool TCP Server
//!
//! Binds a listening socket once and feeds accepted connections to a fixed
//! pool of worker threads.
//!
//! ## Lifecycle
//! ```text
//! Idle ──bind──▶ Listening ──run──▶ Running ──trigger──▶ Draining ──▶ Stopped
//! ```

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::config::Config;
use crate::dispatcher::CommandDispatcher;
use crate::error::{PoolError, Result};

use super::connection::SERVER_BUSY;
use super::listener::accept_pause;
use super::{bind_listener, ConnectionHandler, ThreadPool};

/// Busy replies in flight at once; connections beyond this are just closed
const MAX_PENDING_REJECTS: usize = 64;

/// Server lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    Running,
    Draining,
    Stopped,
}

/// Cloneable handle for stopping a running server from another thread
/// (typically a signal handler)
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    state: Arc<Mutex<ServerState>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ServerState::Idle)),
        }
    }

    /// Ask the server to stop accepting and drain
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    fn set_state(&self, state: ServerState) {
        tracing::debug!("Server state -> {:?}", state);
        *self.state.lock() = state;
    }
}

/// TCP server backed by a bounded worker thread pool
pub struct ThreadPoolServer {
    config: Config,
    dispatcher: Arc<CommandDispatcher>,
    listener: Option<TcpListener>,
    handle: ShutdownHandle,
}

impl ThreadPoolServer {
    /// Create a new server with the given config and dispatcher
    pub fn new(config: Config, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            listener: None,
            handle: ShutdownHandle::new(),
        }
    }

    /// Bind the listening socket (backlog = 2 × pool size)
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        self.config.validate()?;
        let addr = self.config.bind_addr()?;
        let listener = bind_listener(addr, Config::backlog(self.config.thread_pool_size), false)?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            "Thread server @ {}, pool={}, queue={}",
            local_addr,
            self.config.thread_pool_size,
            self.config.queue_capacity
        );

        self.listener = Some(listener);
        self.handle.set_state(ServerState::Listening);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ServerState {
        self.handle.state()
    }

    /// Start the server (blocking until shutdown is triggered)
    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        let listener = self
            .listener
            .take()
            .ok_or_else(|| PoolError::Config("listener missing after bind".into()))?;

        // Non-blocking accept so the loop can observe the shutdown flag
        listener.set_nonblocking(true)?;

        let handler = Arc::new(ConnectionHandler::new(
            Arc::clone(&self.dispatcher),
            self.config.read_timeout,
        ));
        let pool = ThreadPool::new(
            self.config.thread_pool_size,
            self.config.queue_capacity,
            Arc::clone(&handler),
        )?;

        self.handle.set_state(ServerState::Running);
        self.accept_loop(&listener, &pool, &handler);

        self.handle.set_state(ServerState::Draining);
        drop(listener);
        tracing::info!(
            "Stopping thread server: {} active, {} queued",
            pool.active(),
            pool.queued()
        );
        let abandoned = pool.shutdown(self.config.shutdown_grace);
        if abandoned > 0 {
            tracing::warn!("{} workers still busy after grace period", abandoned);
        }

        self.handle.set_state(ServerState::Stopped);
        Ok(())
    }

    fn accept_loop(
        &self,
        listener: &TcpListener,
        pool: &ThreadPool,
        handler: &Arc<ConnectionHandler>,
    ) {
        let pending_rejects = Arc::new(AtomicUsize::new(0));

        while !self.handle.is_triggered() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    // Accepted sockets may inherit non-blocking mode on some platforms
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Cannot configure connection from {}: {}", addr, e);
                        continue;
                    }
                    if let Err(stream) = pool.submit(stream) {
                        reject_in_background(stream, handler, &pending_rejects);
                    }
                }
                Err(e) => {
                    if !matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
                    ) {
                        tracing::warn!("broken connection: {:?}", e);
                    }
                    if let Some(pause) = accept_pause(&e) {
                        thread::sleep(pause);
                    }
                }
            }
        }
    }
}

/// Answer a refused connection off the acceptor thread
///
/// The acceptor must keep accepting while a silent peer holds its busy
/// reply open for the reject read timeout.
fn reject_in_background(
    stream: TcpStream,
    handler: &Arc<ConnectionHandler>,
    pending: &Arc<AtomicUsize>,
) {
    if pending.fetch_add(1, Ordering::SeqCst) >= MAX_PENDING_REJECTS {
        pending.fetch_sub(1, Ordering::SeqCst);
        tracing::warn!("{} busy replies pending, closing connection", MAX_PENDING_REJECTS);
        return;
    }

    let handler = Arc::clone(handler);
    let in_flight = Arc::clone(pending);
    let spawned = thread::Builder::new()
        .name("poolfs-reject".to_string())
        .spawn(move || {
            handler.reject(stream, SERVER_BUSY);
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

    if let Err(e) = spawned {
        pending.fetch_sub(1, Ordering::SeqCst);
        tracing::warn!("Cannot spawn reject thread: {}", e);
    }
}
