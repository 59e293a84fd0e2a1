//! Store Module
//!
//! The file store: one flat directory, the single source of truth for file
//! contents. Nothing caches file bytes across requests.
//!
//! ## Layout
//! ```text
//! {store_dir}/
//!   ├── a.txt
//!   ├── b.bin
//!   └── .staging/      (uploads in progress, renamed into place)
//! ```

mod file_store;
mod locks;

pub use file_store::{FileStore, STAGING_DIR};
pub use locks::{FileGuard, LockTable};
