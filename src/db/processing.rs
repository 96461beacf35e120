//! Transactional persistence of one photo's processing results.
//!
//! Everything a successful run writes (new persons, photo_count
//! bumps, face match rows, the photo's processed/face_count fields and
//! the queue entry's `completed` transition) commits as one SQLite
//! transaction. A failure anywhere rolls the whole photo back and the
//! coordinator records the cause on the queue entry instead.

use anyhow::{bail, Result};
use rusqlite::params;

use super::encoding::encoding_to_bytes;
use super::matches::BoundingBox;
use super::persons::PersonKey;
use super::Database;

/// A person minted during the current photo, not yet in the database.
/// Its reference encoding is the face's own encoding.
#[derive(Debug, Clone)]
pub struct StagedPerson {
    pub encoding: Vec<f32>,
    pub thumbnail_key: Option<String>,
}

/// One resolved face assignment, ready to persist.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    pub target: PersonKey,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub encoding: Vec<f32>,
}

/// The full output of processing one photo with at least one face.
#[derive(Debug, Clone, Default)]
pub struct PhotoResults {
    pub staged_persons: Vec<StagedPerson>,
    pub faces: Vec<FaceRecord>,
}

impl Database {
    /// Finish a photo in which the detector found no faces. Success,
    /// not an error: the photo is processed with a face count of zero.
    pub fn complete_photo_no_faces(&self, photo_id: i64, entry_id: i64) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        finish_photo(&tx, photo_id, 0)?;
        complete_entry(&tx, entry_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist the results of a processed photo atomically.
    ///
    /// Staged persons are inserted first (auto-named "Person N" in
    /// library order), then every face assignment bumps its person's
    /// photo_count and writes a face match row.
    pub fn commit_photo_results(
        &self,
        photo_id: i64,
        entry_id: i64,
        results: &PhotoResults,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut person_count: i64 =
            tx.query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
        let mut staged_ids = Vec::with_capacity(results.staged_persons.len());
        for staged in &results.staged_persons {
            person_count += 1;
            tx.execute(
                r#"
                INSERT INTO persons (name, reference_encoding, encoding_dim, thumbnail_key, photo_count)
                VALUES (?, ?, ?, ?, 0)
                "#,
                params![
                    format!("Person {person_count}"),
                    encoding_to_bytes(&staged.encoding),
                    staged.encoding.len() as i64,
                    staged.thumbnail_key,
                ],
            )?;
            staged_ids.push(tx.last_insert_rowid());
        }

        for face in &results.faces {
            let person_id = match face.target {
                PersonKey::Existing(id) => id,
                PersonKey::Staged(index) => match staged_ids.get(index) {
                    Some(&id) => id,
                    None => bail!("face references unknown staged person {index}"),
                },
            };
            tx.execute(
                r#"
                UPDATE persons
                SET photo_count = photo_count + 1, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
                [person_id],
            )?;
            tx.execute(
                r#"
                INSERT INTO face_matches
                    (photo_id, person_id, bbox_top, bbox_right, bbox_bottom, bbox_left,
                     confidence, encoding, encoding_dim)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    photo_id,
                    person_id,
                    face.bounding_box.top,
                    face.bounding_box.right,
                    face.bounding_box.bottom,
                    face.bounding_box.left,
                    face.confidence,
                    encoding_to_bytes(&face.encoding),
                    face.encoding.len() as i64,
                ],
            )?;
        }

        finish_photo(&tx, photo_id, results.faces.len() as i64)?;
        complete_entry(&tx, entry_id)?;
        tx.commit()?;
        Ok(())
    }
}

fn finish_photo(tx: &rusqlite::Transaction<'_>, photo_id: i64, face_count: i64) -> Result<()> {
    let changed = tx.execute(
        r#"
        UPDATE photos
        SET processed = 1, face_count = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
        params![face_count, photo_id],
    )?;
    if changed != 1 {
        bail!("photo {photo_id} vanished during processing");
    }
    Ok(())
}

/// The `processing -> completed` transition. Fails (and rolls back the
/// surrounding transaction) if the entry is no longer leased, so a
/// stale worker can never complete an entry it lost.
fn complete_entry(tx: &rusqlite::Transaction<'_>, entry_id: i64) -> Result<()> {
    let changed = tx.execute(
        r#"
        UPDATE processing_queue
        SET status = 'completed', completed_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status = 'processing'
        "#,
        [entry_id],
    )?;
    if changed != 1 {
        bail!("queue entry {entry_id} is not in processing");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::QueueStatus;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.db")).unwrap();
        db.initialize().unwrap();
        (dir, db)
    }

    fn bbox() -> BoundingBox {
        BoundingBox { top: 10, right: 60, bottom: 50, left: 20 }
    }

    #[test]
    fn test_no_faces_completes_photo_and_entry() {
        let (_dir, db) = test_db();
        let photo_id = db.create_photo("photos/1/a.jpg", "a.jpg", None).unwrap();
        let entry_id = db.enqueue_photo(photo_id).unwrap();
        db.lease_queue_entry(entry_id).unwrap();

        db.complete_photo_no_faces(photo_id, entry_id).unwrap();

        let photo = db.get_photo(photo_id).unwrap().unwrap();
        assert!(photo.processed);
        assert_eq!(photo.face_count, 0);
        assert!(db.get_faces_for_photo(photo_id).unwrap().is_empty());
        let entry = db.get_queue_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
    }

    #[test]
    fn test_commit_creates_persons_and_matches() {
        let (_dir, db) = test_db();
        let photo_id = db.create_photo("photos/1/a.jpg", "a.jpg", None).unwrap();
        let entry_id = db.enqueue_photo(photo_id).unwrap();
        db.lease_queue_entry(entry_id).unwrap();

        let results = PhotoResults {
            staged_persons: vec![StagedPerson {
                encoding: vec![0.1, 0.2, 0.3],
                thumbnail_key: Some("thumbnails/1_0.jpg".into()),
            }],
            faces: vec![FaceRecord {
                target: PersonKey::Staged(0),
                bounding_box: bbox(),
                confidence: 1.0,
                encoding: vec![0.1, 0.2, 0.3],
            }],
        };
        db.commit_photo_results(photo_id, entry_id, &results).unwrap();

        let persons = db.list_persons().unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].name, "Person 1");
        assert_eq!(persons[0].photo_count, 1);
        assert_eq!(persons[0].thumbnail_key.as_deref(), Some("thumbnails/1_0.jpg"));

        let faces = db.get_faces_for_photo(photo_id).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].person_id, persons[0].id);
        assert_eq!(faces[0].bounding_box, bbox());
        assert_eq!(faces[0].encoding, vec![0.1, 0.2, 0.3]);

        let photo = db.get_photo(photo_id).unwrap().unwrap();
        assert!(photo.processed);
        assert_eq!(photo.face_count, 1);
    }

    #[test]
    fn test_commit_requires_live_lease() {
        let (_dir, db) = test_db();
        let photo_id = db.create_photo("photos/1/a.jpg", "a.jpg", None).unwrap();
        let entry_id = db.enqueue_photo(photo_id).unwrap();
        // Never leased: the commit must refuse and leave no writes.
        let results = PhotoResults {
            staged_persons: vec![StagedPerson { encoding: vec![1.0], thumbnail_key: None }],
            faces: vec![FaceRecord {
                target: PersonKey::Staged(0),
                bounding_box: bbox(),
                confidence: 1.0,
                encoding: vec![1.0],
            }],
        };
        assert!(db.commit_photo_results(photo_id, entry_id, &results).is_err());

        assert!(db.list_persons().unwrap().is_empty());
        assert!(!db.get_photo(photo_id).unwrap().unwrap().processed);
        let entry = db.get_queue_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);
    }

    #[test]
    fn test_photo_deletion_cascades_to_matches() {
        let (_dir, db) = test_db();
        let photo_id = db.create_photo("photos/1/a.jpg", "a.jpg", None).unwrap();
        let entry_id = db.enqueue_photo(photo_id).unwrap();
        db.lease_queue_entry(entry_id).unwrap();
        let results = PhotoResults {
            staged_persons: vec![StagedPerson { encoding: vec![1.0, 2.0], thumbnail_key: None }],
            faces: vec![FaceRecord {
                target: PersonKey::Staged(0),
                bounding_box: bbox(),
                confidence: 1.0,
                encoding: vec![1.0, 2.0],
            }],
        };
        db.commit_photo_results(photo_id, entry_id, &results).unwrap();

        db.delete_photo(photo_id).unwrap();
        assert!(db.get_photo(photo_id).unwrap().is_none());
        assert!(db.list_face_matches().unwrap().is_empty());
        // The person survives; photo counts are monotonic.
        assert_eq!(db.list_persons().unwrap().len(), 1);
    }
}
