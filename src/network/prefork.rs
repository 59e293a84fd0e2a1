//! Pre-forked process-pool server (unix only)
//!
//! N worker processes attached to one listening endpoint. Each worker runs
//! accept → handle → accept on its own; the kernel decides which idle
//! worker gets the next connection. Workers share nothing but the socket.
//!
//! ## Worker attachment
//! - `Inherit`: bind once, then fork; every child inherits the descriptor
//! - `ReusePort`: the parent only reserves the address, each child binds
//!   its own `SO_REUSEPORT` listener after the fork

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use socket2::Socket;

use crate::config::Config;
use crate::dispatcher::CommandDispatcher;
use crate::error::{PoolError, Result};

use super::listener::accept_pause;
use super::{bind_listener, reserve_port, ConnectionHandler};

/// How often the parent checks on its workers
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How worker processes get hold of the listening endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerAttach {
    /// Fork after bind; children share the parent's socket and accept queue
    #[default]
    Inherit,

    /// Each child binds its own socket with `SO_REUSEPORT`
    ReusePort,
}

/// Process-pool server
pub struct ProcessPoolServer {
    config: Config,
    dispatcher: Arc<CommandDispatcher>,
    attach: WorkerAttach,
}

impl ProcessPoolServer {
    pub fn new(config: Config, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            attach: WorkerAttach::default(),
        }
    }

    pub fn with_attach(mut self, attach: WorkerAttach) -> Self {
        self.attach = attach;
        self
    }

    /// Bind and fork the workers
    ///
    /// Returns in the parent only; children never return from here.
    pub fn start(self) -> Result<WorkerGroup> {
        self.config.validate()?;
        let workers = self.config.process_pool_size;
        let backlog = Config::backlog(workers);
        let addr = self.config.bind_addr()?;

        let (shared, reservation, local_addr) = match self.attach {
            WorkerAttach::Inherit => {
                let listener = bind_listener(addr, backlog, false)?;
                let local = listener.local_addr()?;
                (Some(listener), None, local)
            }
            WorkerAttach::ReusePort => {
                let (socket, local) = reserve_port(addr)?;
                (None, Some(socket), local)
            }
        };

        tracing::info!(
            "Process-pool server @ {} with {} workers ({:?})",
            local_addr,
            workers,
            self.attach
        );

        let handler = ConnectionHandler::new(self.dispatcher, self.config.read_timeout);
        let mut group = WorkerGroup {
            local_addr,
            children: Vec::with_capacity(workers),
            _listener: shared,
            _reservation: reservation,
        };

        for id in 0..workers {
            // SAFETY: the child only touches its own copy of the listener, the
            // handler and the filesystem before it exits.
            match unsafe { fork() } {
                Ok(ForkResult::Parent { child }) => {
                    tracing::debug!("Created worker process {}", child);
                    group.children.push(child);
                }
                Ok(ForkResult::Child) => {
                    let listener = match group._listener.as_ref() {
                        Some(listener) => listener.try_clone(),
                        None => bind_listener(local_addr, backlog, true),
                    };
                    match listener {
                        Ok(listener) => worker_loop(id, &listener, &handler),
                        Err(e) => {
                            tracing::error!("Worker {} cannot listen on {}: {}", id, local_addr, e);
                            std::process::exit(1)
                        }
                    }
                }
                Err(e) => {
                    // Dropping `group` terminates the workers forked so far
                    return Err(PoolError::Io(e.into()));
                }
            }
        }

        Ok(group)
    }
}

/// Body of a worker process
fn worker_loop(id: usize, listener: &TcpListener, handler: &ConnectionHandler) -> ! {
    // Handlers installed by the parent must not outlive the fork
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: restoring the default disposition installs no Rust code.
        if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
            tracing::warn!("Worker {} cannot reset {:?}: {}", id, sig, e);
        }
    }

    tracing::debug!("Worker {} accepting on pid {}", id, std::process::id());
    loop {
        match listener.accept() {
            Ok((stream, _)) => handler.handle(stream),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    tracing::warn!("Worker {} accept failed: {}", id, e);
                }
                if let Some(pause) = accept_pause(&e) {
                    thread::sleep(pause);
                }
            }
        }
    }
}

/// The parent's view of its workers
///
/// Dropping the group terminates any workers still running.
pub struct WorkerGroup {
    local_addr: SocketAddr,
    children: Vec<Pid>,

    /// Parent copy of the shared listener (`Inherit`)
    _listener: Option<TcpListener>,

    /// Address reservation (`ReusePort`)
    _reservation: Option<Socket>,
}

impl WorkerGroup {
    /// Address the workers accept on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Process ids of live workers
    pub fn pids(&self) -> &[Pid] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Wait for all workers to exit, or for `shutdown` to be set
    ///
    /// On shutdown every worker gets SIGTERM and is reaped.
    pub fn wait(&mut self, shutdown: &AtomicBool) -> Result<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                tracing::info!("Shutting down pool server...");
                return self.terminate();
            }

            self.reap_exited();
            if self.children.is_empty() {
                tracing::warn!("All workers exited");
                return Ok(());
            }

            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Terminate every worker now
    pub fn stop(mut self) -> Result<()> {
        self.terminate()
    }

    fn reap_exited(&mut self) {
        self.children.retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(WaitStatus::Exited(_, code)) => {
                tracing::warn!("Worker {} exited with status {}", pid, code);
                false
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                tracing::warn!("Worker {} killed by {:?}", pid, sig);
                false
            }
            Ok(_) => true,
            Err(Errno::ECHILD) => false,
            Err(e) => {
                tracing::warn!("Cannot check worker {}: {}", pid, e);
                true
            }
        });
    }

    fn terminate(&mut self) -> Result<()> {
        for &pid in &self.children {
            match signal::kill(pid, Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(PoolError::Io(e.into())),
            }
        }

        for pid in self.children.drain(..) {
            match waitpid(pid, None) {
                Ok(_) | Err(Errno::ECHILD) => {}
                Err(e) => tracing::warn!("Cannot reap worker {}: {}", pid, e),
            }
        }
        Ok(())
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        if !self.children.is_empty() {
            if let Err(e) = self.terminate() {
                tracing::warn!("Failed to terminate workers: {}", e);
            }
        }
    }
}
