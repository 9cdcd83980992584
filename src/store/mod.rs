//! On-disk stage-file stores.
//!
//! The pipeline's only shared mutable resource is a handful of stage files
//! under one data directory. Discipline is whole-file read, full in-memory
//! transform, whole-file overwrite, written once per stage pass; runs are
//! sequential and single-writer, so no locking is used.
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! ├── process/
//! │   ├── article_collection.tsv   # collection table (one row per article)
//! │   └── structured_events.json   # extraction results, append-only
//! ├── subscribe/                   # published ICS calendars
//! └── archive/
//!     ├── articles/                # timestamped TSV backups
//!     └── events/                  # timestamped JSON backups
//! ```

pub mod archive;
pub mod collection;
pub mod events;

use crate::utils::ensure_writable_dir;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::info;

/// Paths of every stage file and directory, rooted at the CLI data dir.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub process_dir: PathBuf,
    pub subscribe_dir: PathBuf,
    pub article_archive_dir: PathBuf,
    pub events_archive_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        DataLayout {
            process_dir: root.join("process"),
            subscribe_dir: root.join("subscribe"),
            article_archive_dir: root.join("archive").join("articles"),
            events_archive_dir: root.join("archive").join("events"),
        }
    }

    pub fn collection_file(&self) -> PathBuf {
        self.process_dir.join("article_collection.tsv")
    }

    pub fn events_file(&self) -> PathBuf {
        self.process_dir.join("structured_events.json")
    }

    /// Create the directory tree (idempotent) and verify the process dir
    /// is writable before any stage runs.
    pub async fn ensure(&self) -> Result<(), Box<dyn Error>> {
        for dir in [
            &self.process_dir,
            &self.subscribe_dir,
            &self.article_archive_dir,
            &self.events_archive_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        ensure_writable_dir(&self.process_dir).await?;
        info!(process = %self.process_dir.display(), "Data layout ready");
        Ok(())
    }
}
