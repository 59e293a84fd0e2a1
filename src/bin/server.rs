//! poolfs Server Binary
//!
//! Serves a store directory with either concurrency model.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use poolfs::network::ThreadPoolServer;
use poolfs::{CommandDispatcher, Config, FileStore, PoolError};
use tracing_subscriber::{fmt, EnvFilter};

/// Concurrency model
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Acceptor thread feeding a bounded worker thread pool
    Thread,
    /// Pre-forked worker processes sharing one listener (unix)
    Process,
}

/// poolfs Server
#[derive(Parser, Debug)]
#[command(name = "poolfs-server")]
#[command(about = "Whole-file TCP store with thread-pool or process-pool workers")]
#[command(version)]
struct Args {
    /// Concurrency model
    #[arg(long, env = "SERVER_MODE", value_enum, default_value = "thread")]
    mode: Mode,

    /// Bind host
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(short, long, env = "SERVER_PORT", default_value = "6667")]
    port: u16,

    /// Store directory
    #[arg(short, long, env = "SERVER_DIR", default_value = "server_files")]
    dir: PathBuf,

    /// Worker threads (thread mode)
    #[arg(long, env = "SERVER_THREAD", default_value = "5")]
    threads: usize,

    /// Worker processes (process mode)
    #[arg(long, env = "SERVER_PROC", default_value = "4")]
    processes: usize,

    /// Connections allowed to wait for a worker (thread mode)
    #[arg(long, env = "SERVER_QUEUE", default_value = "64")]
    queue: usize,

    /// Grace period for in-flight connections at shutdown, in ms (thread mode)
    #[arg(long, env = "SERVER_GRACE_MS", default_value = "5000")]
    grace_ms: u64,

    /// Give up on silent clients after this many ms (0 = wait forever)
    #[arg(long, env = "SERVER_READ_TIMEOUT_MS", default_value = "0")]
    read_timeout_ms: u64,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,poolfs=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("poolfs server v{}", poolfs::VERSION);
    tracing::info!("Store directory: {}", args.dir.display());

    let config = Config::builder()
        .store_dir(&args.dir)
        .host(&args.host)
        .port(args.port)
        .thread_pool_size(args.threads)
        .process_pool_size(args.processes)
        .queue_capacity(args.queue)
        .shutdown_grace(Duration::from_millis(args.grace_ms))
        .read_timeout((args.read_timeout_ms > 0).then(|| Duration::from_millis(args.read_timeout_ms)))
        .build();

    let result = FileStore::open(&config.store_dir).and_then(|store| {
        let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(store)));
        match args.mode {
            Mode::Thread => run_threads(config, dispatcher),
            Mode::Process => run_processes(config, dispatcher),
        }
    });

    match result {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_threads(config: Config, dispatcher: Arc<CommandDispatcher>) -> poolfs::Result<()> {
    let mut server = ThreadPoolServer::new(config, dispatcher);
    server.bind()?;

    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Received termination signal, draining...");
        handle.trigger();
    })
    .map_err(|e| PoolError::Config(format!("cannot install signal handler: {}", e)))?;

    server.run()
}

#[cfg(unix)]
fn run_processes(config: Config, dispatcher: Arc<CommandDispatcher>) -> poolfs::Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};

    use poolfs::network::ProcessPoolServer;

    let mut group = ProcessPoolServer::new(config, dispatcher).start()?;

    // Installed after the fork so only the parent carries the handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| PoolError::Config(format!("cannot install signal handler: {}", e)))?;

    group.wait(&shutdown)
}

#[cfg(not(unix))]
fn run_processes(_config: Config, _dispatcher: Arc<CommandDispatcher>) -> poolfs::Result<()> {
    Err(PoolError::Config(
        "process pool requires a unix platform".to_string(),
    ))
}
