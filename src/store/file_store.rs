//! File Store
//!
//! A single flat directory of named files.
//!
//! ## Responsibilities
//! - Confine every filename to the store root (no path traversal)
//! - Sorted listing of stored names
//! - Whole-file reads and atomic whole-file replacement
//! - Per-filename serialization of readers and writers

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{PoolError, Result};

use super::LockTable;

/// Subdirectory holding uploads that are still being written
pub const STAGING_DIR: &str = ".staging";

/// Extension of in-progress upload files
const STAGING_SUFFIX: &str = "tmp";

/// The file store
///
/// ## Concurrency:
/// - `locks`: shared lock per name for reads, exclusive for writes
/// - Writes land in `.staging/` first and are renamed into place, so
///   readers in other processes see either the old or the new file
/// - All methods use `&self`
pub struct FileStore {
    /// Store root, the only directory names may resolve into
    root: PathBuf,

    /// Staging area for in-progress uploads (same filesystem as root)
    staging: PathBuf,

    locks: LockTable,

    /// Uniquifies staging filenames within this process
    next_upload: AtomicU64,
}

impl FileStore {
    /// Open or create a store in the given directory
    ///
    /// Staging files left by an upload that never finished (a worker killed
    /// mid-PUT) are removed.
    pub fn open(path: &Path) -> Result<Self> {
        let staging = path.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;
        Self::clear_staging(&staging)?;

        Ok(Self {
            root: path.to_path_buf(),
            staging,
            locks: LockTable::new(),
            next_upload: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all stored files, sorted
    ///
    /// Directories (including the staging area) and names that are not
    /// valid UTF-8 are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => tracing::debug!("Skipping non UTF-8 entry {:?}", raw),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Read a whole file
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        let _guard = self.locks.read(name);

        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PoolError::Storage(format!("file not found: {}", name)),
            _ => PoolError::Storage(format!("cannot read {}: {}", name, e)),
        })
    }

    /// Create or replace a whole file
    ///
    /// Steps:
    /// 1. Take the exclusive lock for `name`
    /// 2. Write the bytes to a unique staging file
    /// 3. Rename the staging file over the target
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        let _guard = self.locks.write(name);

        // Never derived from `name`, which may already be NAME_MAX long
        let staged = self.staging.join(format!(
            "{}.{}.{}",
            std::process::id(),
            self.next_upload.fetch_add(1, Ordering::Relaxed),
            STAGING_SUFFIX
        ));

        let result = Self::write_staged(&staged, contents).and_then(|_| fs::rename(&staged, &path));
        if let Err(e) = result {
            let _ = fs::remove_file(&staged);
            return Err(PoolError::Storage(format!("cannot write {}: {}", name, e)));
        }
        Ok(())
    }

    /// Map a peer-supplied filename to a path strictly inside the root
    ///
    /// Accepts exactly one normal path component: no separators, no `.`
    /// or `..`, no NUL, and never the staging directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let invalid = || PoolError::InvalidFilename(name.to_string());

        if name.is_empty() || name == STAGING_DIR || name.contains(['/', '\\', '\0']) {
            return Err(invalid());
        }

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == name => Ok(self.root.join(part)),
            _ => Err(invalid()),
        }
    }

    fn clear_staging(staging: &Path) -> Result<()> {
        for entry in fs::read_dir(staging)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != STAGING_SUFFIX) || !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed stale upload {}", path.display()),
                Err(e) => tracing::warn!("Cannot remove stale upload {}: {}", path.display(), e),
            }
        }
        Ok(())
    }

    fn write_staged(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(contents)?;
        file.flush()
    }
}
