//! Command Dispatcher
//!
//! Interprets a decoded frame as LIST/GET/PUT against the file store and
//! produces the response value.
//!
//! ## Error boundary
//! - Malformed frames (not UTF-8) are `Protocol` errors: the caller drops
//!   the connection without answering
//! - Everything else, including storage and base64 failures, becomes an
//!   ERROR response here and never escapes

use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{PoolError, Result};
use crate::protocol::{Command, Response, UPLOADED};
use crate::store::FileStore;

/// Executes commands against one store
///
/// Built once at startup and shared by every worker.
pub struct CommandDispatcher {
    store: Arc<FileStore>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Dispatch a raw frame
    pub fn dispatch(&self, frame: &[u8]) -> Result<Response> {
        let line = std::str::from_utf8(frame)
            .map_err(|e| PoolError::Protocol(format!("command is not UTF-8: {}", e)))?;

        let started = Instant::now();
        let response = match Command::parse(line) {
            Ok(command) => {
                let response = self.execute(&command);
                tracing::info!(
                    verb = %command.verb(),
                    filename = command.filename().unwrap_or(""),
                    status = ?response.status,
                    elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                    "handled request"
                );
                response
            }
            Err(e) => {
                tracing::debug!("Rejected command line: {}", e);
                Response::error(e.to_string())
            }
        };

        Ok(response)
    }

    /// Execute a parsed command
    ///
    /// Routes commands to appropriate handlers and turns every failure into
    /// an ERROR response.
    pub fn execute(&self, command: &Command) -> Response {
        let result = match command {
            Command::List => self.store.list().map(Response::files),
            Command::Get { filename } => self.get(filename),
            Command::Put { filename, payload } => self.put(filename, payload),
        };

        result.unwrap_or_else(|e| {
            tracing::debug!("{} failed: {}", command.verb(), e);
            Response::error(e.to_string())
        })
    }

    fn get(&self, filename: &str) -> Result<Response> {
        let contents = self.store.read(filename)?;
        Ok(Response::text(BASE64.encode(contents)))
    }

    fn put(&self, filename: &str, payload: &str) -> Result<Response> {
        // Reject the name before spending time on the payload
        self.store.resolve(filename)?;
        let contents = BASE64.decode(payload.trim_end())?;
        self.store.write(filename, &contents)?;
        Ok(Response::text(UPLOADED))
    }
}
