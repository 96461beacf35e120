//! Person identities and the reference-encoding snapshot used for
//! matching.

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;

use super::encoding::bytes_to_encoding;
use super::Database;

/// One clustered identity.
#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub thumbnail_key: Option<String>,
    pub photo_count: i64,
}

/// A person's id and reference encoding, as read in the snapshot at
/// the start of a photo's processing.
#[derive(Debug, Clone)]
pub struct PersonRef {
    pub id: i64,
    pub encoding: Vec<f32>,
}

/// Identifies a match target while a photo is being processed: either
/// a person row that already exists, or one staged earlier in the same
/// photo and not yet committed.
///
/// The derived ordering (existing ids before staged indices, each
/// ascending) is the deterministic tie-break for equal distances;
/// staged persons are always newer than every existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PersonKey {
    Existing(i64),
    Staged(usize),
}

impl Database {
    /// Snapshot of all known persons and their reference encodings,
    /// ordered by id. Read once per photo.
    pub fn all_persons(&self) -> Result<Vec<PersonRef>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, reference_encoding FROM persons ORDER BY id ASC")?;
        let persons = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok(PersonRef {
                    id: row.get(0)?,
                    encoding: bytes_to_encoding(&bytes),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(persons)
    }

    pub fn get_person(&self, person_id: i64) -> Result<Option<Person>> {
        let result = self.conn().query_row(
            "SELECT id, name, thumbnail_key, photo_count FROM persons WHERE id = ?",
            [person_id],
            |row| {
                Ok(Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    thumbnail_key: row.get(2)?,
                    photo_count: row.get(3)?,
                })
            },
        );
        match result {
            Ok(person) => Ok(Some(person)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All persons, most photographed first (export surface).
    pub fn list_persons(&self) -> Result<Vec<Person>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, thumbnail_key, photo_count
            FROM persons
            ORDER BY photo_count DESC, id ASC
            "#,
        )?;
        let persons = stmt
            .query_map([], |row| {
                Ok(Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    thumbnail_key: row.get(2)?,
                    photo_count: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(persons)
    }

    /// Rename a person (external action; the reference encoding is
    /// untouched).
    pub fn rename_person(&self, person_id: i64, name: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE persons SET name = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![name, person_id],
        )?;
        Ok(())
    }
}
