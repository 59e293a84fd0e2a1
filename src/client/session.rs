//! Client Session
//!
//! One fresh connection per operation: send one command frame, read one
//! response frame. Failed attempts are retried without backoff; once the
//! attempts are used up the caller gets a synthetic ERROR response, never
//! an error value.

use std::fs;
use std::io::Write;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Serialize, Serializer};

use crate::config::ClientConfig;
use crate::error::{PoolError, Result};
use crate::protocol::{encode_frame, read_frame, Command, Data, Response};

/// Prefix of downloaded files in the download directory
pub const DOWNLOAD_PREFIX: &str = "client_";

/// Outcome of `ClientSession::exchange`
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: Response,

    /// Connection attempts used, including the successful one
    pub attempts: u32,
}

/// Result of one download or upload, for the stress harness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferResult {
    pub success: bool,

    /// Wall-clock round trip, serialized as seconds
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,

    /// Bytes transferred (0 on failure)
    pub size: u64,

    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferResult {
    fn failed(duration: Duration, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration,
            size: 0,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// Result of a LIST
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResult {
    pub success: bool,
    pub files: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Client for one server
#[derive(Debug, Clone)]
pub struct ClientSession {
    config: ClientConfig,
}

impl ClientSession {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one command and return the response
    pub fn send(&self, command: &Command) -> Response {
        self.exchange(command).response
    }

    /// Send one command, retrying the whole exchange on any failure
    pub fn exchange(&self, command: &Command) -> Exchange {
        let frame = encode_frame(command.to_line().as_bytes());
        let attempts = self.config.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(&frame) {
                Ok(response) => {
                    return Exchange {
                        response,
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    tracing::warn!("[send] {} attempt {} failed: {}", command.verb(), attempt, e);
                    last_error = e.to_string();
                }
            }
        }

        Exchange {
            response: Response::error(last_error),
            attempts,
        }
    }

    /// List the remote store
    pub fn list(&self) -> ListResult {
        let response = self.send(&Command::List);
        match (response.is_ok(), response.data) {
            (true, Data::Files(files)) => ListResult {
                success: true,
                files,
                error: None,
            },
            (true, Data::Text(_)) => ListResult {
                success: false,
                files: Vec::new(),
                error: Some("unexpected LIST response".to_string()),
            },
            (false, data) => ListResult {
                success: false,
                files: Vec::new(),
                error: Some(Response { status: response.status, data }.describe()),
            },
        }
    }

    /// Fetch `name` into `download_dir/client_<name>`
    pub fn download(&self, name: &str) -> TransferResult {
        let started = Instant::now();
        let exchange = self.exchange(&Command::Get {
            filename: name.to_string(),
        });
        let duration = started.elapsed();

        match self.store_download(name, &exchange.response) {
            Ok(size) => {
                tracing::info!("Downloaded {} ({} B) in {:.2}s", name, size, duration.as_secs_f64());
                TransferResult {
                    success: true,
                    duration,
                    size,
                    attempts: exchange.attempts,
                    error: None,
                }
            }
            Err(e) => TransferResult::failed(duration, exchange.attempts, e.to_string()),
        }
    }

    /// Upload `upload_dir/name` as `name`
    ///
    /// A missing local file fails without contacting the server.
    pub fn upload(&self, name: &str) -> TransferResult {
        let path = self.config.upload_dir.join(name);
        if !path.is_file() {
            return TransferResult::failed(
                Duration::ZERO,
                0,
                format!("local file not found: {}", path.display()),
            );
        }

        match fs::read(&path) {
            Ok(contents) => self.upload_bytes(name, &contents),
            Err(e) => TransferResult::failed(Duration::ZERO, 0, e.to_string()),
        }
    }

    /// Upload in-memory contents as `name`
    pub fn upload_bytes(&self, name: &str, contents: &[u8]) -> TransferResult {
        let command = Command::Put {
            filename: name.to_string(),
            payload: BASE64.encode(contents),
        };

        let started = Instant::now();
        let exchange = self.exchange(&command);
        let duration = started.elapsed();

        if !exchange.response.is_ok() {
            return TransferResult::failed(duration, exchange.attempts, exchange.response.describe());
        }

        let size = contents.len() as u64;
        tracing::info!("Uploaded {} ({} B) in {:.2}s", name, size, duration.as_secs_f64());
        TransferResult {
            success: true,
            duration,
            size,
            attempts: exchange.attempts,
            error: None,
        }
    }

    fn attempt(&self, frame: &[u8]) -> Result<Response> {
        let addr = self.config.server_addr()?;
        let timeout = self.config.timeout;

        let mut stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| PoolError::Connection(format!("connect to {}: {}", addr, e)))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        stream.write_all(frame)?;
        stream.flush()?;

        let body = read_frame(&mut stream)?;
        Response::from_json(&body)
    }

    fn store_download(&self, name: &str, response: &Response) -> Result<u64> {
        if !response.is_ok() {
            return Err(PoolError::Storage(response.describe()));
        }
        let text = response
            .as_text()
            .ok_or_else(|| PoolError::Protocol("unexpected GET response".to_string()))?;
        let contents = BASE64.decode(text)?;

        fs::create_dir_all(&self.config.download_dir)?;
        let path = self
            .config
            .download_dir
            .join(format!("{}{}", DOWNLOAD_PREFIX, name));
        fs::write(&path, &contents)?;

        Ok(contents.len() as u64)
    }
}
