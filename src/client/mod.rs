//! Client Module
//!
//! Client side of the protocol: framing, timeouts, bounded retries and
//! per-operation timing for the (external) stress harness.

mod session;

pub use session::{ClientSession, Exchange, ListResult, TransferResult, DOWNLOAD_PREFIX};
