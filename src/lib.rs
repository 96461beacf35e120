//! facedex: incremental face identity clustering for growing photo
//! collections.
//!
//! Photos are enqueued after upload; a worker leases queue entries,
//! runs an external face detector over each image, matches every face
//! against the known identities, and mints new persons when nothing is
//! close enough. Clustering is greedy and single-pass: identities are
//! never re-clustered from scratch, and a person's reference encoding
//! is fixed at creation time.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod detector;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod processor;
pub mod store;
pub mod thumbnails;

pub use config::Config;
pub use coordinator::{QueueCoordinator, RunSummary};
pub use db::Database;
pub use detector::{CommandDetector, DetectedFace, FaceDetector};
pub use error::ProcessError;
pub use matcher::{match_face, MatchOutcome};
pub use processor::{PhotoProcessor, ProcessOutcome};
pub use store::{LocalStore, ObjectStore, StoreError};
