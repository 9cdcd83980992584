//! The structured-events file.
//!
//! A JSON array of extraction results, one entry per successfully
//! processed article. The file is append-only across runs: each extraction
//! pass loads what exists, extends it with the new batch, and writes the
//! whole array back.

use crate::models::ExtractionResult;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug)]
pub struct EventsStore {
    path: PathBuf,
    results: Vec<ExtractionResult>,
}

impl EventsStore {
    /// Load the events file, or start empty when it does not exist.
    ///
    /// An unreadable (non-JSON) file starts a fresh array rather than
    /// aborting: the archive rotator keeps timestamped copies, so the
    /// damaged file is recoverable out of band.
    pub fn load(path: &Path) -> io::Result<Self> {
        let results = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Vec<ExtractionResult>>(&text) {
                Ok(results) => results,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Events file is not valid JSON; starting fresh");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(EventsStore {
            path: path.to_path_buf(),
            results,
        })
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ExtractionResult] {
        &self.results
    }

    pub fn extend(&mut self, batch: Vec<ExtractionResult>) {
        self.results.extend(batch);
    }

    /// Overwrite the whole file with the current array.
    #[instrument(level = "info", skip_all)]
    pub fn save(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.results)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, json)?;
        info!(path = %self.path.display(), results = self.results.len(), "Saved events file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedEvent;
    use crate::store::test_support::scratch_dir;

    fn result_with_link(link: &str) -> ExtractionResult {
        ExtractionResult {
            events: vec![ExtractedEvent {
                article_link: link.to_string(),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = scratch_dir("events");
        let store = EventsStore::load(&dir.join("absent.json")).unwrap();
        assert!(store.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_extend_appends_across_saves() {
        let dir = scratch_dir("events");
        let path = dir.join("events.json");

        let mut store = EventsStore::load(&path).unwrap();
        store.extend(vec![result_with_link("https://a")]);
        store.save().unwrap();

        let mut store = EventsStore::load(&path).unwrap();
        store.extend(vec![result_with_link("https://b")]);
        store.save().unwrap();

        let store = EventsStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.results()[0].events[0].article_link, "https://a");
        assert_eq!(store.results()[1].events[0].article_link, "https://b");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_json_starts_fresh() {
        let dir = scratch_dir("events");
        let path = dir.join("events.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = EventsStore::load(&path).unwrap();
        assert!(store.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
