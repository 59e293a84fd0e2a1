//! Connection Handler
//!
//! Handles individual client connections: read one frame, dispatch, write
//! one response frame, close. No keep-alive, no pipelining.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::CommandDispatcher;
use crate::error::{PoolError, Result};
use crate::protocol::{discard_frame, read_frame, write_frame, Response};

/// Error text sent to connections refused by admission control
pub const SERVER_BUSY: &str = "server busy";

/// Bound on how long a rejected connection may take to send its request
const REJECT_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Per-connection unit of work, shared by every worker
pub struct ConnectionHandler {
    /// Injected once at startup
    dispatcher: Arc<CommandDispatcher>,

    /// Optional cap on waiting for a request frame
    read_timeout: Option<Duration>,
}

impl ConnectionHandler {
    pub fn new(dispatcher: Arc<CommandDispatcher>, read_timeout: Option<Duration>) -> Self {
        Self {
            dispatcher,
            read_timeout,
        }
    }

    /// Serve one accepted connection (blocking until the exchange is done)
    ///
    /// Never fails: protocol errors drop the connection without a response
    /// and every failure is logged locally.
    pub fn handle(&self, mut stream: TcpStream) {
        let peer_addr = peer_of(&stream);
        tracing::debug!("Connection established from {}", peer_addr);

        if let Err(e) = stream.set_read_timeout(self.read_timeout) {
            tracing::warn!("Cannot configure {}: {}", peer_addr, e);
            return;
        }

        match self.serve(&mut stream) {
            Ok(_) => {}
            Err(PoolError::Protocol(reason)) => {
                tracing::warn!("Dropping connection from {}: {}", peer_addr, reason);
            }
            Err(PoolError::Io(ref e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                // Windows reports TimedOut where unix reports WouldBlock
                tracing::debug!("Read timeout for client {}", peer_addr);
            }
            Err(e) if e.is_disconnect() => {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    peer_addr,
                    e
                );
            }
            Err(e) => tracing::warn!("Error serving {}: {}", peer_addr, e),
        }
    }

    /// The exchange itself, over any byte stream
    ///
    /// Returns the response that was written.
    pub fn serve<S: Read + Write>(&self, stream: &mut S) -> Result<Response> {
        let frame = read_frame(stream)?;
        let response = self.dispatcher.dispatch(&frame)?;
        write_frame(stream, &response.to_json()?)?;
        Ok(response)
    }

    /// Answer a connection the server has no capacity for
    ///
    /// The request is drained (briefly, into a small buffer) before answering
    /// so the peer sees the ERROR response rather than a reset. Blocks for
    /// up to the reject read timeout on a silent peer.
    pub fn reject(&self, mut stream: TcpStream, reason: &str) {
        let peer_addr = peer_of(&stream);
        tracing::warn!("Rejecting {}: {}", peer_addr, reason);

        let _ = stream.set_read_timeout(Some(REJECT_READ_TIMEOUT));
        let _ = discard_frame(&mut stream);

        let result = Response::error(reason)
            .to_json()
            .and_then(|body| write_frame(&mut stream, &body));
        if let Err(e) = result {
            tracing::debug!("Could not notify {}: {}", peer_addr, e);
        }
    }
}

fn peer_of(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
