pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

pub use error::{Result, StoreError};

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::Connection;
use tracing::info;

const READER_POOL_SIZE: usize = 4;

/// How many times a `Conflict` (SQLITE_BUSY) operation is attempted before
/// it is surfaced as `Internal`.
const CONFLICT_RETRIES: usize = 3;

/// Message store with reader/writer split: one writer connection serializes
/// mutations, a small pool of read-only connections serves queries without
/// contending with the writer (WAL mode).
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(std::time::Duration::from_millis(250))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            readers.push(Mutex::new(conn));
        }

        info!("Database opened at {}", path.display());
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Internal(format!("reader lock poisoned: {e}")))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| StoreError::Internal(format!("writer lock poisoned: {e}")))?;
        f(&mut conn)
    }

    /// Run `op`, retrying on `Conflict` up to `CONFLICT_RETRIES` attempts.
    /// Validation/NotFound errors pass through untouched; exhausted retries
    /// surface as `Internal`.
    pub(crate) fn retrying<T>(&self, mut op: impl FnMut(&Self) -> Result<T>) -> Result<T> {
        for _ in 0..CONFLICT_RETRIES {
            match op(self) {
                Err(StoreError::Conflict) => continue,
                other => return other,
            }
        }
        Err(StoreError::Internal("conflict retries exhausted".into()))
    }
}
