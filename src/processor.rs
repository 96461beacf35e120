//! Per-photo processing pipeline.
//!
//! For one leased photo: fetch the original image, run the external
//! detector, resolve every face against a single persons snapshot, and
//! commit the results atomically. Faces are handled strictly in
//! detection order so a person minted by an earlier face is visible to
//! later faces in the same photo.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{MatchingConfig, ThumbnailConfig};
use crate::db::{Database, FaceRecord, PersonKey, PhotoResults, StagedPerson};
use crate::detector::FaceDetector;
use crate::error::ProcessError;
use crate::matcher::{match_face, MatchOutcome};
use crate::store::ObjectStore;
use crate::thumbnails::render_face_thumbnail;

/// Result of a successful processing run.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOutcome {
    pub faces_found: usize,
}

pub struct PhotoProcessor {
    db: Database,
    store: Arc<dyn ObjectStore>,
    detector: Arc<dyn FaceDetector>,
    tolerance: f32,
    thumbnail_size: u32,
}

impl PhotoProcessor {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        detector: Arc<dyn FaceDetector>,
        matching: MatchingConfig,
        thumbnails: ThumbnailConfig,
    ) -> Self {
        Self {
            db,
            store,
            detector,
            tolerance: matching.tolerance,
            thumbnail_size: thumbnails.max_size,
        }
    }

    /// Process one photo under an already-held lease.
    ///
    /// On success the queue entry is `completed` as part of the final
    /// commit. On error the caller owns the `failed` transition; any
    /// thumbnails already uploaded stay behind as accepted orphans.
    pub fn process(&self, photo_id: i64, entry_id: i64) -> Result<ProcessOutcome, ProcessError> {
        let photo = self
            .db
            .get_photo(photo_id)
            .map_err(ProcessError::persistence)?
            .ok_or_else(|| ProcessError::not_found(format!("photo {photo_id}")))?;

        let image = self
            .store
            .get(&photo.storage_key)
            .map_err(ProcessError::storage)?;

        let faces = self
            .detector
            .detect(&image)
            .map_err(ProcessError::detection)?;

        if faces.is_empty() {
            self.db
                .complete_photo_no_faces(photo_id, entry_id)
                .map_err(ProcessError::persistence)?;
            debug!(photo_id, "no faces detected");
            return Ok(ProcessOutcome { faces_found: 0 });
        }

        for face in &faces {
            if !face.bounding_box.is_valid() {
                return Err(ProcessError::Detection(format!(
                    "detector returned a degenerate bounding box: {:?}",
                    face.bounding_box
                )));
            }
        }

        // Decoded once; every minted person's thumbnail crops from it.
        let decoded = image::load_from_memory(&image)
            .map_err(|e| ProcessError::image(format!("failed to decode photo: {e}")))?;

        // One snapshot per photo. Persons staged for earlier faces are
        // appended to the working set, never written back mid-photo.
        let snapshot = self
            .db
            .all_persons()
            .map_err(ProcessError::persistence)?;
        let mut working: Vec<(PersonKey, Vec<f32>)> = snapshot
            .into_iter()
            .map(|p| (PersonKey::Existing(p.id), p.encoding))
            .collect();

        let mut results = PhotoResults::default();
        for (index, face) in faces.iter().enumerate() {
            let (target, confidence) =
                match match_face(&face.encoding, &working, self.tolerance) {
                    MatchOutcome::Matched { key, distance, confidence } => {
                        debug!(photo_id, face = index, ?key, distance, "matched existing person");
                        (key, confidence)
                    }
                    MatchOutcome::NewPerson => {
                        let thumbnail = render_face_thumbnail(
                            &decoded,
                            &face.bounding_box,
                            self.thumbnail_size,
                        )
                        .map_err(ProcessError::image)?;
                        let thumbnail_key = self
                            .store
                            .put(
                                &format!("thumbnails/{photo_id}_{index}.jpg"),
                                &thumbnail,
                                "image/jpeg",
                            )
                            .map_err(ProcessError::storage)?;

                        let staged = results.staged_persons.len();
                        results.staged_persons.push(StagedPerson {
                            encoding: face.encoding.clone(),
                            thumbnail_key: Some(thumbnail_key),
                        });
                        working.push((PersonKey::Staged(staged), face.encoding.clone()));
                        debug!(photo_id, face = index, "minting new person");
                        (PersonKey::Staged(staged), 1.0)
                    }
                };

            results.faces.push(FaceRecord {
                target,
                bounding_box: face.bounding_box,
                confidence,
                encoding: face.encoding.clone(),
            });
        }

        self.db
            .commit_photo_results(photo_id, entry_id, &results)
            .map_err(ProcessError::persistence)?;

        info!(
            photo_id,
            faces = results.faces.len(),
            new_persons = results.staged_persons.len(),
            "photo processed"
        );
        Ok(ProcessOutcome {
            faces_found: results.faces.len(),
        })
    }
}
