//! The article collection table.
//!
//! A tab-separated file with one row per discovered article, keyed by
//! `link`. This store is the dedup primitive the collector relies on:
//! [`CollectionStore::insert_new`] computes the existing-link set once and
//! filters the candidate batch against it, so membership checks stay O(1)
//! per record and a link appearing twice in one batch is kept only once
//! (first occurrence wins).
//!
//! Rows are single-line by construction: titles are cleaned before
//! insertion and bodies carry `///` in place of line breaks. Optional
//! fields serialize as empty cells.

use crate::models::{ArticleRecord, ProcessStatus};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const HEADER: &str = "exchange\tlink\tcategory\ttitle\tdiscovered_at\tbody\tpublish_datetime\tllm_processed";
const COLUMN_COUNT: usize = 8;

/// In-memory view of the collection table, read once per run.
#[derive(Debug)]
pub struct CollectionStore {
    path: PathBuf,
    records: Vec<ArticleRecord>,
}

impl CollectionStore {
    /// Load the table, or start empty when the file does not exist yet.
    ///
    /// A malformed row is a whole-file failure: silently dropping a row
    /// here would delete it on the next save.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CollectionStore {
                    path: path.to_path_buf(),
                    records: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let mut records = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line_no == 0 || line.is_empty() {
                continue;
            }
            let record = parse_row(line).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed collection row at line {}", line_no + 1),
                )
            })?;
            records.push(record);
        }
        Ok(CollectionStore {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.records.iter().any(|r| r.link == link)
    }

    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ArticleRecord] {
        &mut self.records
    }

    /// Append only records whose link is not yet in the table.
    ///
    /// Returns the number of records actually inserted. The existing-link
    /// set is computed once per call; links duplicated within `batch`
    /// collapse to their first occurrence.
    #[instrument(level = "info", skip_all, fields(batch = batch.len()))]
    pub fn insert_new(&mut self, batch: Vec<ArticleRecord>) -> usize {
        let mut existing: HashSet<String> =
            self.records.iter().map(|r| r.link.clone()).collect();
        let before = self.records.len();
        for record in batch {
            if existing.contains(&record.link) {
                continue;
            }
            existing.insert(record.link.clone());
            self.records.push(record);
        }
        let inserted = self.records.len() - before;
        info!(inserted, total = self.records.len(), "Inserted new article records");
        inserted
    }

    /// Overwrite the whole table on disk.
    pub fn save(&self) -> io::Result<()> {
        let mut out = String::with_capacity(1024 + self.records.len() * 256);
        out.push_str(HEADER);
        out.push('\n');
        for record in &self.records {
            out.push_str(&serialize_row(record));
            out.push('\n');
        }
        std::fs::write(&self.path, out)?;
        info!(path = %self.path.display(), rows = self.records.len(), "Saved collection table");
        Ok(())
    }
}

/// Keep a cell single-line even if an upstream cleaner missed something.
fn sanitize_cell(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

fn serialize_row(record: &ArticleRecord) -> String {
    [
        sanitize_cell(&record.exchange),
        sanitize_cell(&record.link),
        sanitize_cell(&record.category),
        sanitize_cell(&record.title),
        sanitize_cell(&record.discovered_at),
        sanitize_cell(record.body.as_deref().unwrap_or("")),
        sanitize_cell(record.publish_datetime.as_deref().unwrap_or("")),
        record.status.as_str().to_string(),
    ]
    .join("\t")
}

fn parse_row(line: &str) -> Option<ArticleRecord> {
    let cells: Vec<&str> = line.split('\t').collect();
    if cells.len() != COLUMN_COUNT {
        return None;
    }
    let optional = |cell: &str| {
        if cell.is_empty() {
            None
        } else {
            Some(cell.to_string())
        }
    };
    Some(ArticleRecord {
        exchange: cells[0].to_string(),
        link: cells[1].to_string(),
        category: cells[2].to_string(),
        title: cells[3].to_string(),
        discovered_at: cells[4].to_string(),
        body: optional(cells[5]),
        publish_datetime: optional(cells[6]),
        status: ProcessStatus::parse(cells[7])?,
    })
}
