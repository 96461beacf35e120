//! Processing queue state machine.
//!
//! Each entry walks `pending -> processing -> completed | failed`.
//! Both terminal states are final: re-processing a photo requires a
//! fresh entry. The lease transition is a conditional UPDATE so that
//! exactly one of several concurrent workers claims an entry.

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;
use tracing::warn;

use super::Database;

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "completed" => Some(QueueStatus::Completed),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

/// One unit of pending work, one-to-one with a photo.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub photo_id: i64,
    pub status: QueueStatus,
    pub error_message: Option<String>,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Entry counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStatistics {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueStatistics {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
    let status: String = row.get(2)?;
    // A status outside the state machine is corruption, not a failure
    // to be reported as such.
    let status = QueueStatus::from_str(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown queue status {status:?}").into(),
        )
    })?;
    Ok(QueueEntry {
        id: row.get(0)?,
        photo_id: row.get(1)?,
        status,
        error_message: row.get(3)?,
        queued_at: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
    })
}

const ENTRY_COLUMNS: &str =
    "id, photo_id, status, error_message, queued_at, started_at, completed_at";

impl Database {
    /// Create a pending queue entry for the photo.
    pub fn enqueue_photo(&self, photo_id: i64) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO processing_queue (photo_id, status) VALUES (?, 'pending')",
            [photo_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_queue_entry(&self, entry_id: i64) -> Result<Option<QueueEntry>> {
        let result = self.conn().query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM processing_queue WHERE id = ?"),
            [entry_id],
            entry_from_row,
        );
        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Pending entries in insertion order (oldest first).
    pub fn list_pending_queue_entries(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM processing_queue
            WHERE status = 'pending'
            ORDER BY id ASC
            LIMIT ?
            "#
        ))?;
        let entries = stmt
            .query_map([limit as i64], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Attempt the `pending -> processing` transition for one entry.
    ///
    /// The UPDATE only fires while the entry is still pending and no
    /// other entry for the same photo is being processed, so of any
    /// number of concurrent lease attempts exactly one returns true.
    pub fn lease_queue_entry(&self, entry_id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            r#"
            UPDATE processing_queue
            SET status = 'processing', started_at = CURRENT_TIMESTAMP
            WHERE id = ?
              AND status = 'pending'
              AND NOT EXISTS (
                  SELECT 1 FROM processing_queue other
                  WHERE other.photo_id = processing_queue.photo_id
                    AND other.status = 'processing'
              )
            "#,
            [entry_id],
        )?;
        Ok(changed == 1)
    }

    /// Record a failure cause and finalize the entry. Only a
    /// processing entry can fail; terminal states stay terminal.
    pub fn mark_queue_entry_failed(&self, entry_id: i64, error: &str) -> Result<()> {
        self.conn().execute(
            r#"
            UPDATE processing_queue
            SET status = 'failed', error_message = ?, completed_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'processing'
            "#,
            params![error, entry_id],
        )?;
        Ok(())
    }

    pub fn queue_statistics(&self) -> Result<QueueStatistics> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM processing_queue GROUP BY status")?;
        let mut stats = QueueStatistics::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match QueueStatus::from_str(&status) {
                Some(QueueStatus::Pending) => stats.pending = count,
                Some(QueueStatus::Processing) => stats.processing = count,
                Some(QueueStatus::Completed) => stats.completed = count,
                Some(QueueStatus::Failed) => stats.failed = count,
                None => warn!(status = %status, "ignoring unknown queue status"),
            }
        }
        Ok(stats)
    }
}
