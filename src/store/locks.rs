//! Per-filename lock table
//!
//! GET takes a shared lock on its filename, PUT an exclusive one, so no
//! reader observes a write in progress within one process. Entries are
//! created on demand and removed once the last holder lets go.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};

/// Map from filename to its reader/writer lock
#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

enum Held {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// Holds a filename lock until dropped
pub struct FileGuard<'a> {
    table: &'a LockTable,
    name: String,
    held: Option<Held>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access for readers of `name`
    pub fn read(&self, name: &str) -> FileGuard<'_> {
        let lock = self.entry(name);
        let guard = lock.read_arc();
        FileGuard {
            table: self,
            name: name.to_string(),
            held: Some(Held::Shared(guard)),
        }
    }

    /// Exclusive access for the writer of `name`
    pub fn write(&self, name: &str) -> FileGuard<'_> {
        let lock = self.entry(name);
        let guard = lock.write_arc();
        FileGuard {
            table: self,
            name: name.to_string(),
            held: Some(Held::Exclusive(guard)),
        }
    }

    /// Number of filenames with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, name: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    fn release(&self, name: &str) {
        let mut locks = self.locks.lock();
        // Only the table's own reference left: nobody holds or waits
        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }
}

impl FileGuard<'_> {
    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Exclusive(_)))
    }
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.table.release(&self.name);
    }
}
