//! # poolfs
//!
//! A whole-file store over a plain TCP socket with:
//! - A line-oriented command protocol (LIST / GET / PUT) with JSON replies
//! - A bounded thread-pool server with graceful drain
//! - A pre-forked process-pool server (unix)
//! - A retrying, timing client session
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ClientSession                            │
//! │          (fresh connection per call, bounded retry)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  VERB[ NAME[ BASE64]]\r\n\r\n
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │      ThreadPoolServer        │      ProcessPoolServer        │
//! │  (acceptor + worker threads) │ (pre-forked accept loops)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  ConnectionHandler                           │
//! │        read frame → dispatch → write frame → close           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ FrameCodec  │          │ Dispatcher  │
//!   └─────────────┘          └──────┬──────┘
//!                                   ▼
//!                           ┌─────────────┐
//!                           │  FileStore  │
//!                           │ (per-name   │
//!                           │   locks)    │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod client;
pub mod dispatcher;
pub mod network;
pub mod protocol;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::ClientSession;
pub use config::{ClientConfig, Config};
pub use dispatcher::CommandDispatcher;
pub use error::{PoolError, Result};
pub use store::FileStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of poolfs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
