//! Listening socket construction
//!
//! The std listener hides the backlog and the reuse options, so sockets are
//! built with socket2 and converted.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// Pause after `accept` finds nothing pending on a non-blocking listener
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pause after any other `accept` failure (EMFILE, ENFILE, ENOBUFS, ...)
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long an accept loop should wait before calling `accept` again
///
/// `None` means retry at once. Errors such as descriptor exhaustion persist
/// until something else frees a resource, so they always back off.
pub fn accept_pause(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::Interrupted => None,
        io::ErrorKind::WouldBlock => Some(ACCEPT_POLL_INTERVAL),
        _ => Some(ACCEPT_ERROR_BACKOFF),
    }
}

fn new_socket(addr: SocketAddr) -> io::Result<Socket> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    Ok(socket)
}

/// Create a blocking TCP listener with an explicit backlog
///
/// With `reuse_port`, several sockets may listen on the same address and
/// the kernel spreads connections across them (unix only).
pub fn bind_listener(addr: SocketAddr, backlog: i32, reuse_port: bool) -> io::Result<TcpListener> {
    let socket = new_socket(addr)?;

    if reuse_port {
        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        #[cfg(not(unix))]
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "SO_REUSEPORT is not available on this platform",
        ));
    }

    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// Claim an address for reuse-port listeners without accepting on it
///
/// The returned socket is bound but never listens, so it takes no share of
/// incoming connections. It pins ephemeral ports (port 0) to one concrete
/// address that workers can then bind with `bind_listener(.., true)`.
#[cfg(unix)]
pub fn reserve_port(addr: SocketAddr) -> io::Result<(Socket, SocketAddr)> {
    let socket = new_socket(addr)?;
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;

    let local = socket
        .local_addr()?
        .as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not an inet address"))?;

    Ok((socket, local))
}
