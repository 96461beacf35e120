//! Facedex worker for background photo processing.
//!
//! The worker polls the processing queue, leases pending entries, and
//! runs face detection and identity matching over each photo. It also
//! handles ingest (upload a directory of images into the store and
//! queue), statistics, and data export.
//!
//! ## Usage
//!
//! ```bash
//! facedex-worker                 # Poll the queue continuously
//! facedex-worker --once          # Drain one batch and exit
//! facedex-worker --ingest DIR    # Upload a directory and enqueue it
//! facedex-worker --stats         # Print queue/library statistics
//! facedex-worker --export FILE   # Dump photos/persons/matches as JSON
//! ```

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use facedex::config::{Config, QueueConfig};
use facedex::db::Database;
use facedex::store::{LocalStore, ObjectStore};
use facedex::{CommandDetector, PhotoProcessor, QueueCoordinator};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "heif"];

enum Mode {
    Process,
    Ingest(PathBuf),
    Stats,
    Export(PathBuf),
}

struct WorkerArgs {
    mode: Mode,
    /// Poll interval override (seconds)
    interval: Option<u64>,
    /// Run once and exit
    once: bool,
    /// Config path override
    config_path: Option<PathBuf>,
}

impl Default for WorkerArgs {
    fn default() -> Self {
        Self {
            mode: Mode::Process,
            interval: None,
            once: false,
            config_path: None,
        }
    }
}

fn main() -> Result<()> {
    let args = parse_args();

    facedex::logging::init(None)?;

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)?;
    db.initialize()?;
    info!("Database opened at {:?}", config.db_path);

    let store = Arc::new(LocalStore::new(config.storage.root.clone()));

    match args.mode {
        Mode::Stats => print_statistics(&db),
        Mode::Export(path) => export_data(&db, &path),
        Mode::Ingest(dir) => ingest_directory(&db, store.as_ref(), &dir),
        Mode::Process => run_worker(args.once, args.interval, &config, db, store),
    }
}

fn parse_args() -> WorkerArgs {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = WorkerArgs::default();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--once" | "-1" => {
                args.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < argv.len() {
                    if let Ok(interval) = argv[i + 1].parse() {
                        args.interval = Some(interval);
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < argv.len() {
                    args.config_path = Some(PathBuf::from(&argv[i + 1]));
                    i += 1;
                }
            }
            "--ingest" => {
                if i + 1 < argv.len() {
                    args.mode = Mode::Ingest(PathBuf::from(&argv[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --ingest requires a directory argument");
                    std::process::exit(1);
                }
            }
            "--stats" => {
                args.mode = Mode::Stats;
            }
            "--export" => {
                if i + 1 < argv.len() {
                    args.mode = Mode::Export(PathBuf::from(&argv[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --export requires a file argument");
                    std::process::exit(1);
                }
            }
            "--version" | "-V" => {
                println!("facedex-worker {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", argv[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    args
}

fn print_help() {
    println!(
        r#"facedex-worker - Background photo processor for facedex

USAGE:
    facedex-worker [OPTIONS]

OPTIONS:
    --once, -1          Lease and process one batch, then exit
    --interval, -i N    Poll interval in seconds (default from config)
    --config, -c PATH   Path to config file
    --ingest DIR        Upload a directory of images and enqueue them
    --stats             Print queue and library statistics as JSON
    --export FILE       Dump photos, persons and face matches as JSON
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FACEDEX_CONFIG      Path to config file (overrides default location)
    FACEDEX_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/facedex/config.toml

The processing loop requires an external detector command configured
under [detector] in the config file. The worker pipes each image to
the command's stdin and expects a JSON array of detected faces
({{"encoding": [...], "bounding_box": [top, right, bottom, left]}})
on its stdout.
"#
    );
}

fn run_worker(
    once: bool,
    interval: Option<u64>,
    config: &Config,
    db: Database,
    store: Arc<LocalStore>,
) -> Result<()> {
    info!("Facedex worker starting...");

    let detector = Arc::new(
        CommandDetector::new(config.detector.command.clone())
            .context("the processing loop needs [detector] command in the config")?,
    );
    let processor = PhotoProcessor::new(
        db.clone(),
        store,
        detector,
        config.matching,
        config.thumbnails,
    );
    let coordinator = QueueCoordinator::new(db, processor, config.queue);

    let poll_interval = interval.unwrap_or(config.queue.poll_interval_secs);

    if once {
        info!("Running in single-shot mode");
        let summary = coordinator.run_once()?;
        info!(
            leased = summary.leased,
            completed = summary.completed,
            failed = summary.failed,
            "batch finished"
        );
        return Ok(());
    }

    info!("Polling every {} seconds", poll_interval);
    loop {
        if should_process_now(&config.queue) {
            match coordinator.run_once() {
                Ok(summary) if summary.leased > 0 => {
                    info!(
                        leased = summary.leased,
                        completed = summary.completed,
                        failed = summary.failed,
                        "batch finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Error processing batch: {}", e),
            }
        } else {
            info!("Outside hours of operation, skipping this cycle");
        }

        thread::sleep(Duration::from_secs(poll_interval));
    }
}

fn should_process_now(queue: &QueueConfig) -> bool {
    let (start, end) = match (queue.hours_start, queue.hours_end) {
        (Some(s), Some(e)) => (s, e),
        _ => return true, // No hours configured, always process
    };

    let now = Local::now().time();
    let start_time = NaiveTime::from_hms_opt(start as u32, 0, 0).unwrap_or(NaiveTime::MIN);
    let end_time = NaiveTime::from_hms_opt(end as u32, 0, 0).unwrap_or(NaiveTime::MIN);

    if start <= end {
        // Normal range: 9:00 - 17:00
        now >= start_time && now < end_time
    } else {
        // Overnight range: 22:00 - 06:00
        now >= start_time || now < end_time
    }
}

fn ingest_directory(db: &Database, store: &LocalStore, dir: &PathBuf) -> Result<()> {
    info!("Ingesting directory: {:?}", dir);
    let mut count = 0;

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Skipping unreadable file {:?}: {}", path, e);
                continue;
            }
        };

        // The final key embeds the photo id, so the row is created
        // first under a pending key derived from the source path.
        let pending_key = format!("pending/{}", path.display());
        let photo_id = match db.create_photo(&pending_key, &file_name, Some(bytes.len() as i64)) {
            Ok(id) => id,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };
        let storage_key = format!("photos/{photo_id}/{file_name}");
        let content_type = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        };
        store
            .put(&storage_key, &bytes, content_type)
            .map_err(|e| anyhow::anyhow!("failed to store {file_name}: {e}"))?;
        db.set_photo_storage_key(photo_id, &storage_key)?;
        db.enqueue_photo(photo_id)?;
        count += 1;
    }

    info!("Ingest complete: {} photos enqueued", count);
    println!("Ingested {count} photos");
    Ok(())
}

#[derive(Serialize)]
struct StatisticsReport {
    queue: facedex::db::QueueStatistics,
    library: facedex::db::LibraryStatistics,
}

fn print_statistics(db: &Database) -> Result<()> {
    let report = StatisticsReport {
        queue: db.queue_statistics()?,
        library: db.library_statistics()?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct ExportDump {
    photos: Vec<facedex::db::Photo>,
    persons: Vec<facedex::db::Person>,
    face_matches: Vec<facedex::db::FaceMatch>,
    export_date: String,
}

fn export_data(db: &Database, path: &PathBuf) -> Result<()> {
    let dump = ExportDump {
        photos: db.list_photos()?,
        persons: db.list_persons()?,
        face_matches: db.list_face_matches()?,
        export_date: chrono::Utc::now().to_rfc3339(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&dump)?)
        .with_context(|| format!("failed to write export to {path:?}"))?;
    println!("Exported to {}", path.display());
    Ok(())
}
