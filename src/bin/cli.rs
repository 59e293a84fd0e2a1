//! poolfs CLI Client
//!
//! Runs one LIST/GET/PUT and prints the result as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use poolfs::{ClientConfig, ClientSession};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

/// poolfs CLI
#[derive(Parser, Debug)]
#[command(name = "poolfs-cli")]
#[command(about = "CLI for the poolfs file store")]
struct Args {
    /// Server host
    #[arg(long, env = "CLIENT_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, env = "CLIENT_PORT", default_value = "6667")]
    port: u16,

    /// Connect/read timeout in seconds
    #[arg(short, long, env = "CLIENT_TIMEOUT", default_value = "300")]
    timeout: u64,

    /// Attempts per operation
    #[arg(short, long, env = "CLIENT_RETRY", default_value = "2")]
    retries: u32,

    /// Directory for downloaded files
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    /// Directory uploads are read from
    #[arg(long, env = "SERVER_DIR", default_value = ".")]
    upload_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List remote files
    List,

    /// Download a file as client_<name>
    Get {
        /// Remote file name
        name: String,
    },

    /// Upload a file from the upload directory
    Put {
        /// File name (also the remote name)
        name: String,
    },
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let session = ClientSession::new(
        ClientConfig::builder()
            .host(args.host)
            .port(args.port)
            .timeout(Duration::from_secs(args.timeout))
            .retries(args.retries)
            .download_dir(args.download_dir)
            .upload_dir(args.upload_dir)
            .build(),
    );

    match args.command {
        Commands::List => {
            let result = session.list();
            report(&result, result.success)
        }
        Commands::Get { name } => {
            let result = session.download(&name);
            report(&result, result.success)
        }
        Commands::Put { name } => {
            let result = session.upload(&name);
            report(&result, result.success)
        }
    }
}

fn report<T: Serialize>(result: &T, success: bool) -> ExitCode {
    match serde_json::to_string(result) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("cannot encode result: {}", e),
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
