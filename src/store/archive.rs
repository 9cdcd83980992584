//! Stage-file archiving with bounded retention.
//!
//! After each run the collection table and events file are copied into
//! their archive directories with a timestamp-suffixed name, then the
//! directory is pruned so at most `keep` matching backups remain. Recency
//! is decided by modification time, with the file name (which embeds the
//! timestamp) breaking ties deterministically.

use std::io;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Copy `file` into `dest_dir` as `{stem}_{stamp}{ext}` and prune old
/// backups of the same stem down to `keep`.
///
/// A missing source file is not an error; there is simply nothing to
/// archive yet. Failures deleting individual old backups are logged and
/// do not abort the prune of the remaining candidates.
#[instrument(level = "info", skip_all, fields(file = %file.display()))]
pub fn archive_file(file: &Path, dest_dir: &Path, stamp: &str, keep: usize) -> io::Result<()> {
    if !file.exists() {
        debug!("Nothing to archive");
        return Ok(());
    }
    std::fs::create_dir_all(dest_dir)?;

    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("backup")
        .to_string();
    let ext = file
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| format!(".{s}"))
        .unwrap_or_default();

    let backup_path = dest_dir.join(format!("{stem}_{stamp}{ext}"));
    std::fs::copy(file, &backup_path)?;
    info!(backup = %backup_path.display(), "Archived stage file");

    prune_old_backups(dest_dir, &stem, &ext, keep);
    Ok(())
}

/// Delete the oldest backups matching `{stem}_*{ext}`, keeping `keep`.
fn prune_old_backups(dest_dir: &Path, stem: &str, ext: &str, keep: usize) {
    let prefix = format!("{stem}_");
    let entries = match std::fs::read_dir(dest_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dest_dir.display(), error = %e, "Failed to list archive directory");
            return;
        }
    };

    let mut backups: Vec<(std::time::SystemTime, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            if !name.starts_with(&prefix) || !name.ends_with(ext) {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, name))
        })
        .collect();

    // Newest first; the embedded timestamp in the name settles mtime ties.
    backups.sort_by(|a, b| b.cmp(a));
    debug!(count = backups.len(), "Found backups");

    for (_, name) in backups.into_iter().skip(keep) {
        let old_path = dest_dir.join(&name);
        match std::fs::remove_file(&old_path) {
            Ok(()) => info!(path = %old_path.display(), "Removed old backup"),
            Err(e) => warn!(path = %old_path.display(), error = %e, "Failed to remove old backup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::scratch_dir;

    #[test]
    fn test_archive_copies_with_stamp_suffix() {
        let dir = scratch_dir("archive");
        let src = dir.join("collection.tsv");
        std::fs::write(&src, "header\nrow\n").unwrap();
        let dest = dir.join("backups");

        archive_file(&src, &dest, "250110_080000", 6).unwrap();

        let backup = dest.join("collection_250110_080000.tsv");
        assert!(backup.is_file());
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "header\nrow\n");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_source_is_not_an_error() {
        let dir = scratch_dir("archive");
        let result = archive_file(&dir.join("absent.tsv"), &dir.join("backups"), "x", 6);
        assert!(result.is_ok());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_prune_keeps_most_recent_backups() {
        let dir = scratch_dir("archive");
        let src = dir.join("collection.tsv");
        std::fs::write(&src, "data").unwrap();
        let dest = dir.join("backups");

        for stamp in [
            "250110_080000",
            "250110_090000",
            "250110_100000",
            "250110_110000",
        ] {
            archive_file(&src, &dest, stamp, 2).unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(&dest)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "collection_250110_100000.tsv".to_string(),
                "collection_250110_110000.tsv".to_string(),
            ]
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_prune_only_touches_matching_stem() {
        let dir = scratch_dir("archive");
        let src = dir.join("collection.tsv");
        std::fs::write(&src, "data").unwrap();
        let dest = dir.join("backups");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("events_250101_000000.json"), "[]").unwrap();

        for stamp in ["250110_080000", "250110_090000"] {
            archive_file(&src, &dest, stamp, 1).unwrap();
        }

        assert!(dest.join("events_250101_000000.json").is_file());
        assert!(dest.join("collection_250110_090000.tsv").is_file());
        assert!(!dest.join("collection_250110_080000.tsv").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
