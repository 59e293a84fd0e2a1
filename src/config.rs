//! Configuration for poolfs
//!
//! Explicit configuration values with sensible defaults. They are built once
//! at process start and handed to each component constructor.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PoolError, Result};

/// Default TCP port shared by the server and the client
pub const DEFAULT_PORT: u16 = 6667;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Flat directory holding the stored files
    /// Internal structure:
    ///   {store_dir}/
    ///     ├── <name>           (one file per uploaded name)
    ///     └── .staging/        (in-progress uploads, renamed into place)
    pub store_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Bind host (name or address)
    pub host: String,

    /// Bind port, 0 picks an ephemeral port
    pub port: u16,

    /// Optional read timeout on incoming frames (none by default)
    pub read_timeout: Option<Duration>,

    // -------------------------------------------------------------------------
    // Thread Pool Configuration
    // -------------------------------------------------------------------------
    /// Number of worker threads
    pub thread_pool_size: usize,

    /// Accepted connections allowed to wait for a free worker
    pub queue_capacity: usize,

    /// How long in-flight connections may run after shutdown is requested
    pub shutdown_grace: Duration,

    // -------------------------------------------------------------------------
    // Process Pool Configuration
    // -------------------------------------------------------------------------
    /// Number of pre-forked worker processes
    pub process_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("server_files"),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            read_timeout: None,
            thread_pool_size: 5,
            queue_capacity: 64,
            shutdown_grace: Duration::from_secs(5),
            process_pool_size: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolve `host:port` to the first socket address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.port)
    }

    /// Listen backlog for a pool of `workers`: twice the pool size
    pub fn backlog(workers: usize) -> i32 {
        i32::try_from(workers.saturating_mul(2)).unwrap_or(i32::MAX)
    }

    /// Reject values no server can start with
    pub fn validate(&self) -> Result<()> {
        if self.thread_pool_size == 0 {
            return Err(PoolError::Config("thread pool size must be at least 1".into()));
        }
        if self.process_pool_size == 0 {
            return Err(PoolError::Config("process pool size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::Config("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store directory
    pub fn store_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_dir = path.into();
        self
    }

    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the bind port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the server-side read timeout
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the number of worker threads
    pub fn thread_pool_size(mut self, size: usize) -> Self {
        self.config.thread_pool_size = size;
        self
    }

    /// Set the bounded queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Set the number of worker processes
    pub fn process_pool_size(mut self, size: usize) -> Self {
        self.config.process_pool_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Connect and read/write timeout for every attempt
    pub timeout: Duration,

    /// Total attempts per operation (no backoff between them)
    pub retries: u32,

    /// Where downloads are written (as `client_<name>`)
    pub download_dir: PathBuf,

    /// Where uploads are read from
    pub upload_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(300),
            retries: 2,
            download_dir: PathBuf::from("."),
            upload_dir: PathBuf::from("."),
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Resolve the server address
    pub fn server_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.port)
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Point the client at a known socket address
    pub fn addr(self, addr: SocketAddr) -> Self {
        self.host(addr.ip().to_string()).port(addr.port())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the attempt count; values below 1 are raised to 1
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries.max(1);
        self
    }

    pub fn download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.download_dir = path.into();
        self
    }

    pub fn upload_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = path.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| PoolError::Config(format!("cannot resolve {}:{}", host, port)))
}
