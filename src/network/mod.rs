//! Network Module
//!
//! TCP servers and connection handling.
//!
//! ## Architecture
//! - Thread pool: single acceptor thread, bounded queue, fixed worker threads
//! - Process pool (unix): fixed pre-forked workers sharing one listener
//! - Both run the same `ConnectionHandler`, built once and shared

mod connection;
mod listener;
#[cfg(unix)]
mod prefork;
mod server;
mod thread_pool;

pub use connection::{ConnectionHandler, SERVER_BUSY};
pub use listener::bind_listener;
#[cfg(unix)]
pub use listener::reserve_port;
#[cfg(unix)]
pub use prefork::{ProcessPoolServer, WorkerAttach, WorkerGroup};
pub use server::{ServerState, ShutdownHandle, ThreadPoolServer};
pub use thread_pool::ThreadPool;
