//! Queue coordination: leasing pending entries and driving the
//! processor over them.
//!
//! Leases are claimed in insertion order, bounded per batch. One
//! photo's failure is recorded on its own entry and never blocks the
//! rest of the batch. There is no automatic retry and no lease
//! reclaim: an entry stuck in `processing` after a worker crash is an
//! operator problem, and re-processing a photo means enqueueing a
//! fresh entry.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::db::{Database, QueueEntry, QueueStatistics};
use crate::processor::PhotoProcessor;

/// Outcome of one coordinator pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub leased: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct QueueCoordinator {
    db: Database,
    processor: PhotoProcessor,
    lease_batch_size: usize,
}

impl QueueCoordinator {
    pub fn new(db: Database, processor: PhotoProcessor, queue: QueueConfig) -> Self {
        Self {
            db,
            processor,
            lease_batch_size: queue.lease_batch_size,
        }
    }

    /// Pending entries, oldest first.
    pub fn list_pending(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        self.db.list_pending_queue_entries(limit)
    }

    /// Try to lease each given entry; returns the entries actually
    /// claimed, which may be fewer than requested when another worker
    /// got there first.
    pub fn lease_entries(&self, entry_ids: &[i64]) -> Result<Vec<QueueEntry>> {
        let mut leased = Vec::new();
        for &entry_id in entry_ids {
            if self.db.lease_queue_entry(entry_id)? {
                if let Some(entry) = self.db.get_queue_entry(entry_id)? {
                    leased.push(entry);
                }
            }
        }
        Ok(leased)
    }

    /// Lease up to `limit` pending entries in insertion order.
    pub fn lease_batch(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        let pending = self.db.list_pending_queue_entries(limit)?;
        let ids: Vec<i64> = pending.iter().map(|e| e.id).collect();
        self.lease_entries(&ids)
    }

    /// Lease one batch and process every claimed entry.
    pub fn run_once(&self) -> Result<RunSummary> {
        let leased = self.lease_batch(self.lease_batch_size)?;
        let mut summary = RunSummary {
            leased: leased.len(),
            ..RunSummary::default()
        };

        for entry in &leased {
            match self.processor.process(entry.photo_id, entry.id) {
                Ok(outcome) => {
                    info!(
                        entry = entry.id,
                        photo = entry.photo_id,
                        faces = outcome.faces_found,
                        "entry completed"
                    );
                    summary.completed += 1;
                }
                Err(err) => {
                    warn!(
                        entry = entry.id,
                        photo = entry.photo_id,
                        error = %err,
                        "entry failed"
                    );
                    // Failing to record one entry's cause must not
                    // abandon the rest of the leased batch.
                    if let Err(mark_err) =
                        self.db.mark_queue_entry_failed(entry.id, &err.to_string())
                    {
                        warn!(
                            entry = entry.id,
                            error = %mark_err,
                            "could not record entry failure"
                        );
                    }
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    pub fn queue_statistics(&self) -> Result<QueueStatistics> {
        self.db.queue_statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchingConfig, ThumbnailConfig};
    use crate::db::{BoundingBox, QueueStatus};
    use crate::detector::{DetectedFace, FaceDetector};
    use crate::store::{LocalStore, ObjectStore};
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct ScriptedDetector {
        scripts: Mutex<HashMap<Vec<u8>, Vec<DetectedFace>>>,
        fail_on: Mutex<Option<Vec<u8>>>,
    }

    impl ScriptedDetector {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                fail_on: Mutex::new(None),
            }
        }

        fn script(&self, image: &[u8], faces: Vec<DetectedFace>) {
            self.scripts.lock().unwrap().insert(image.to_vec(), faces);
        }

        fn fail_on(&self, image: &[u8]) {
            *self.fail_on.lock().unwrap() = Some(image.to_vec());
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&self, image: &[u8]) -> anyhow::Result<Vec<DetectedFace>> {
            if self.fail_on.lock().unwrap().as_deref() == Some(image) {
                return Err(anyhow!("detector crashed on this image"));
            }
            Ok(self
                .scripts
                .lock()
                .unwrap()
                .get(image)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn test_png(seed: u8) -> Vec<u8> {
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([seed, (x % 256) as u8, (y % 256) as u8])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn face(encoding: Vec<f32>) -> DetectedFace {
        DetectedFace {
            encoding,
            bounding_box: BoundingBox { top: 8, right: 56, bottom: 56, left: 8 },
        }
    }

    struct Fixture {
        _dir: TempDir,
        db: Database,
        store: Arc<LocalStore>,
        detector: Arc<ScriptedDetector>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let db = Database::open(&dir.path().join("test.db")).unwrap();
            db.initialize().unwrap();
            let store = Arc::new(LocalStore::new(dir.path().join("objects")));
            Self {
                _dir: dir,
                db,
                store,
                detector: Arc::new(ScriptedDetector::new()),
            }
        }

        fn coordinator(&self, batch_size: usize) -> QueueCoordinator {
            let processor = PhotoProcessor::new(
                self.db.clone(),
                self.store.clone(),
                self.detector.clone(),
                MatchingConfig { tolerance: 0.6 },
                ThumbnailConfig { max_size: 100 },
            );
            QueueCoordinator::new(
                self.db.clone(),
                processor,
                QueueConfig {
                    lease_batch_size: batch_size,
                    ..QueueConfig::default()
                },
            )
        }

        /// Upload a synthetic photo and enqueue it (no lease taken).
        fn upload(&self, seed: u8) -> (i64, i64, Vec<u8>) {
            let image = test_png(seed);
            let key = format!("photos/{seed}/img.png");
            self.store.put(&key, &image, "image/png").unwrap();
            let photo_id = self
                .db
                .create_photo(&key, "img.png", Some(image.len() as i64))
                .unwrap();
            let entry_id = self.db.enqueue_photo(photo_id).unwrap();
            (photo_id, entry_id, image)
        }
    }

    #[test]
    fn test_scenario_one_face_empty_library() {
        let fx = Fixture::new();
        let (photo_id, entry_id, image) = fx.upload(1);
        fx.detector.script(&image, vec![face(vec![0.0, 0.0])]);

        let summary = fx.coordinator(100).run_once().unwrap();
        assert_eq!(summary.leased, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 0);

        let persons = fx.db.list_persons().unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].photo_count, 1);

        let matches = fx.db.get_faces_for_photo(photo_id).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 1.0);

        let entry = fx.db.get_queue_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
    }

    #[test]
    fn test_scenario_second_photo_matches_existing_person() {
        let fx = Fixture::new();
        let (_, _, first_image) = fx.upload(1);
        fx.detector.script(&first_image, vec![face(vec![0.0, 0.0])]);
        let coordinator = fx.coordinator(100);
        coordinator.run_once().unwrap();

        let (second_photo, _, second_image) = fx.upload(2);
        fx.detector.script(&second_image, vec![face(vec![0.1, 0.0])]);
        coordinator.run_once().unwrap();

        let persons = fx.db.list_persons().unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].photo_count, 2);

        let matches = fx.db.get_faces_for_photo(second_photo).unwrap();
        assert!((matches[0].confidence - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_scenario_detector_failure_marks_entry_failed() {
        let fx = Fixture::new();
        let (photo_id, entry_id, image) = fx.upload(1);
        fx.detector.fail_on(&image);

        let summary = fx.coordinator(100).run_once().unwrap();
        assert_eq!(summary.failed, 1);

        let entry = fx.db.get_queue_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Failed);
        let message = entry.error_message.unwrap();
        assert!(message.contains("detector crashed"));

        let photo = fx.db.get_photo(photo_id).unwrap().unwrap();
        assert!(!photo.processed);
    }

    #[test]
    fn test_zero_face_photo_completes() {
        let fx = Fixture::new();
        let (photo_id, entry_id, _) = fx.upload(1);

        let summary = fx.coordinator(100).run_once().unwrap();
        assert_eq!(summary.completed, 1);

        let photo = fx.db.get_photo(photo_id).unwrap().unwrap();
        assert!(photo.processed);
        assert_eq!(photo.face_count, 0);
        assert!(fx.db.get_faces_for_photo(photo_id).unwrap().is_empty());
        let entry = fx.db.get_queue_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
    }

    #[test]
    fn test_one_failure_never_blocks_the_batch() {
        let fx = Fixture::new();
        let (_, bad_entry, bad_image) = fx.upload(1);
        fx.detector.fail_on(&bad_image);
        let (good_photo, good_entry, good_image) = fx.upload(2);
        fx.detector.script(&good_image, vec![face(vec![0.0, 0.0])]);

        let summary = fx.coordinator(100).run_once().unwrap();
        assert_eq!(summary.leased, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);

        let bad = fx.db.get_queue_entry(bad_entry).unwrap().unwrap();
        assert_eq!(bad.status, QueueStatus::Failed);
        let good = fx.db.get_queue_entry(good_entry).unwrap().unwrap();
        assert_eq!(good.status, QueueStatus::Completed);
        assert!(fx.db.get_photo(good_photo).unwrap().unwrap().processed);
    }

    #[test]
    fn test_lease_batch_respects_limit_and_order() {
        let fx = Fixture::new();
        let mut entry_ids = Vec::new();
        for seed in 1..=5 {
            let (_, entry_id, _) = fx.upload(seed);
            entry_ids.push(entry_id);
        }

        let coordinator = fx.coordinator(2);
        let leased = coordinator.lease_batch(2).unwrap();
        let ids: Vec<i64> = leased.iter().map(|e| e.id).collect();
        assert_eq!(ids, entry_ids[..2].to_vec());

        // The remaining entries are still pending.
        assert_eq!(coordinator.list_pending(100).unwrap().len(), 3);
    }

    #[test]
    fn test_lease_entries_skips_already_claimed() {
        let fx = Fixture::new();
        let (_, a, _) = fx.upload(1);
        let (_, b, _) = fx.upload(2);

        let coordinator = fx.coordinator(100);
        assert!(fx.db.lease_queue_entry(a).unwrap());

        let leased = coordinator.lease_entries(&[a, b]).unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].id, b);
    }

    /// Detector that destroys the queue table on first use, so both
    /// processing and the failure bookkeeping hit database errors.
    struct SabotagingDetector {
        db: Database,
    }

    impl FaceDetector for SabotagingDetector {
        fn detect(&self, _image: &[u8]) -> anyhow::Result<Vec<DetectedFace>> {
            let _ = self.db.conn().execute("DROP TABLE processing_queue", []);
            Err(anyhow!("detector crashed"))
        }
    }

    #[test]
    fn test_bookkeeping_error_does_not_abandon_batch() {
        let fx = Fixture::new();
        fx.upload(1);
        fx.upload(2);

        let processor = PhotoProcessor::new(
            fx.db.clone(),
            fx.store.clone(),
            Arc::new(SabotagingDetector { db: fx.db.clone() }),
            MatchingConfig::default(),
            ThumbnailConfig::default(),
        );
        let coordinator =
            QueueCoordinator::new(fx.db.clone(), processor, QueueConfig::default());

        // Every leased entry is attempted even though recording the
        // first failure already errors.
        let summary = coordinator.run_once().unwrap();
        assert_eq!(summary.leased, 2);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed, 2);
    }

    #[test]
    fn test_statistics_after_mixed_run() {
        let fx = Fixture::new();
        let (_, _, bad_image) = fx.upload(1);
        fx.detector.fail_on(&bad_image);
        fx.upload(2);
        fx.upload(3);

        let coordinator = fx.coordinator(2);
        coordinator.run_once().unwrap();

        let stats = coordinator.queue_statistics().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }
}
