//! Photo records and upload bookkeeping.

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;

use super::Database;

/// One uploaded image.
#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: i64,
    pub storage_key: String,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub uploaded_at: String,
    pub processed: bool,
    pub face_count: i64,
}

/// Library-wide counters, mirroring the statistics surface.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryStatistics {
    pub total_photos: i64,
    pub processed_photos: i64,
    pub total_persons: i64,
    pub total_faces: i64,
}

impl Database {
    /// Register an uploaded photo. The caller has already put the
    /// bytes into the object store under `storage_key`.
    pub fn create_photo(
        &self,
        storage_key: &str,
        file_name: &str,
        file_size: Option<i64>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO photos (storage_key, file_name, file_size) VALUES (?, ?, ?)",
            params![storage_key, file_name, file_size],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Move a photo to its final storage key. Used by ingest, where
    /// the key embeds the photo id and is only known after insert.
    pub fn set_photo_storage_key(&self, photo_id: i64, storage_key: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE photos SET storage_key = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![storage_key, photo_id],
        )?;
        Ok(())
    }

    pub fn get_photo(&self, photo_id: i64) -> Result<Option<Photo>> {
        let result = self.conn().query_row(
            r#"
            SELECT id, storage_key, file_name, file_size, uploaded_at, processed, face_count
            FROM photos
            WHERE id = ?
            "#,
            [photo_id],
            |row| {
                Ok(Photo {
                    id: row.get(0)?,
                    storage_key: row.get(1)?,
                    file_name: row.get(2)?,
                    file_size: row.get(3)?,
                    uploaded_at: row.get(4)?,
                    processed: row.get::<_, i64>(5)? != 0,
                    face_count: row.get(6)?,
                })
            },
        );
        match result {
            Ok(photo) => Ok(Some(photo)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All photos, newest upload first (export surface).
    pub fn list_photos(&self) -> Result<Vec<Photo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, storage_key, file_name, file_size, uploaded_at, processed, face_count
            FROM photos
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )?;
        let photos = stmt
            .query_map([], |row| {
                Ok(Photo {
                    id: row.get(0)?,
                    storage_key: row.get(1)?,
                    file_name: row.get(2)?,
                    file_size: row.get(3)?,
                    uploaded_at: row.get(4)?,
                    processed: row.get::<_, i64>(5)? != 0,
                    face_count: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(photos)
    }

    /// Administrative deletion. Face matches and queue entries cascade;
    /// person photo_counts are deliberately left alone (they are
    /// monotonic by contract).
    pub fn delete_photo(&self, photo_id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM photos WHERE id = ?", [photo_id])?;
        Ok(())
    }

    pub fn library_statistics(&self) -> Result<LibraryStatistics> {
        let conn = self.conn();
        let total_photos: i64 =
            conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        let processed_photos: i64 = conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE processed = 1",
            [],
            |row| row.get(0),
        )?;
        let total_persons: i64 =
            conn.query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
        let total_faces: i64 =
            conn.query_row("SELECT COUNT(*) FROM face_matches", [], |row| row.get(0))?;
        Ok(LibraryStatistics {
            total_photos,
            processed_photos,
            total_persons,
            total_faces,
        })
    }
}
