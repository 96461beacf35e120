mod schema;
pub mod encoding;
pub mod matches;
pub mod persons;
pub mod photos;
pub mod processing;
pub mod queue;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use encoding::{bytes_to_encoding, encoding_to_bytes, euclidean_distance};
pub use matches::{BoundingBox, FaceMatch};
pub use persons::{Person, PersonKey, PersonRef};
pub use photos::{LibraryStatistics, Photo};
pub use processing::{FaceRecord, PhotoResults, StagedPerson};
pub use queue::{QueueEntry, QueueStatistics, QueueStatus};
pub use schema::SCHEMA;

/// Shared handle to the SQLite database.
///
/// The connection is behind a mutex so multiple worker threads can
/// lease and process different queue entries concurrently; the lease
/// itself is a conditional UPDATE, so exclusivity does not depend on
/// who holds the lock between statements.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create tables and indexes if they don't exist yet.
    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Lock the underlying connection. A poisoned mutex only means
    /// another thread panicked mid-query; the connection itself is
    /// still usable.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
