//! Face match records: one per detected face, linking a photo to a
//! person. Immutable once written; removed only when the photo is
//! deleted.

use anyhow::Result;
use serde::Serialize;

use super::encoding::bytes_to_encoding;
use super::Database;

/// Pixel bounding box of a detected face, in the coordinate order the
/// detector reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    /// A box is usable when it spans at least one pixel each way.
    pub fn is_valid(&self) -> bool {
        self.top < self.bottom && self.left < self.right
    }
}

/// One detected face instance.
#[derive(Debug, Clone, Serialize)]
pub struct FaceMatch {
    pub id: i64,
    pub photo_id: i64,
    pub person_id: i64,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    #[serde(skip)]
    pub encoding: Vec<f32>,
}

impl Database {
    pub fn get_faces_for_photo(&self, photo_id: i64) -> Result<Vec<FaceMatch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, photo_id, person_id,
                   bbox_top, bbox_right, bbox_bottom, bbox_left,
                   confidence, encoding
            FROM face_matches
            WHERE photo_id = ?
            ORDER BY id ASC
            "#,
        )?;
        let faces = stmt
            .query_map([photo_id], |row| {
                let bytes: Vec<u8> = row.get(8)?;
                Ok(FaceMatch {
                    id: row.get(0)?,
                    photo_id: row.get(1)?,
                    person_id: row.get(2)?,
                    bounding_box: BoundingBox {
                        top: row.get(3)?,
                        right: row.get(4)?,
                        bottom: row.get(5)?,
                        left: row.get(6)?,
                    },
                    confidence: row.get(7)?,
                    encoding: bytes_to_encoding(&bytes),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(faces)
    }

    /// All face matches, in insertion order (export surface).
    pub fn list_face_matches(&self) -> Result<Vec<FaceMatch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, photo_id, person_id,
                   bbox_top, bbox_right, bbox_bottom, bbox_left,
                   confidence, encoding
            FROM face_matches
            ORDER BY id ASC
            "#,
        )?;
        let faces = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(8)?;
                Ok(FaceMatch {
                    id: row.get(0)?,
                    photo_id: row.get(1)?,
                    person_id: row.get(2)?,
                    bounding_box: BoundingBox {
                        top: row.get(3)?,
                        right: row.get(4)?,
                        bottom: row.get(5)?,
                        left: row.get(6)?,
                    },
                    confidence: row.get(7)?,
                    encoding: bytes_to_encoding(&bytes),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(faces)
    }
}
