//! Data models for the announcement pipeline.
//!
//! This module defines the records that flow through the stage files:
//! - [`ArticleRecord`]: one row of the collection table, from discovery
//!   through body fill and LLM extraction
//! - [`ArticleStub`]: a freshly parsed listing-page entry, before dedup
//! - [`ExtractionResult`] / [`ExtractedEvent`]: the structured output of
//!   the LLM extraction pass, persisted to the events JSON file
//!
//! The event structs use snake_case field names matching the JSON schema
//! the extraction prompts instruct the model to emit, so they round-trip
//! through `serde_json` without rename attributes (except `UID`, which the
//! schema spells in caps).

use serde::{Deserialize, Serialize};

/// Processing status of an article in the collection table.
///
/// Serialized as `"No"` / `"Yes"` in the `llm_processed` column. The
/// transition is monotonic: once `Done`, a record is never selected for
/// extraction again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Not yet (successfully) run through the extraction pass.
    Pending,
    /// Extraction completed and events were persisted.
    Done,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "No",
            ProcessStatus::Done => "Yes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "No" => Some(ProcessStatus::Pending),
            "Yes" => Some(ProcessStatus::Done),
            _ => None,
        }
    }
}

/// An article stub parsed from a category listing page.
///
/// Stubs carry everything known at discovery time; the body and publish
/// time are filled in later from the article detail page.
#[derive(Debug, Clone)]
pub struct ArticleStub {
    /// Canonical absolute URL of the article.
    pub link: String,
    /// Category label from the source configuration, immutable once set.
    pub category: String,
    /// Cleaned display title.
    pub title: String,
}

/// One row of the collection table.
///
/// `link` is the primary key; the collection store guarantees no two rows
/// share it. `body` and `publish_datetime` start empty and are written at
/// most once by the body-fill pass. Line breaks inside `body` are encoded
/// as `///` so the row stays single-line in the TSV file.
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    /// Exchange display name, e.g. "Gate.io".
    pub exchange: String,
    /// Canonical article URL; primary key of the collection table.
    pub link: String,
    /// Category label assigned at discovery time.
    pub category: String,
    /// Cleaned article title.
    pub title: String,
    /// When the record was first observed, `YYYY-MM-DD HH:MM:SS`.
    pub discovered_at: String,
    /// Article body; absent until the fill pass succeeds, then immutable.
    pub body: Option<String>,
    /// Publication time as stated on the article page; fill-once like `body`.
    pub publish_datetime: Option<String>,
    /// Extraction status, drives the extractor's work queue.
    pub status: ProcessStatus,
}

impl ArticleRecord {
    /// Build a fresh record from a listing-page stub.
    pub fn from_stub(stub: ArticleStub, exchange: &str, discovered_at: &str) -> Self {
        ArticleRecord {
            exchange: exchange.to_string(),
            link: stub.link,
            category: stub.category,
            title: stub.title,
            discovered_at: discovered_at.to_string(),
            body: None,
            publish_datetime: None,
            status: ProcessStatus::Pending,
        }
    }

    /// A record is ready for extraction once both detail fields are filled
    /// and it has not been processed yet.
    pub fn extraction_ready(&self) -> bool {
        self.status == ProcessStatus::Pending
            && self.body.as_deref().is_some_and(|b| !b.is_empty())
            && self
                .publish_datetime
                .as_deref()
                .is_some_and(|p| !p.is_empty())
    }
}

/// The extraction output for one article: zero or more structured events.
///
/// The events file on disk is a JSON array of these.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub events: Vec<ExtractedEvent>,
}

/// A structured event extracted from an announcement article.
///
/// Datetimes are kept as strings in storage (the events file is shared
/// state consumed by calendar clients across runs); they are parsed into
/// timezone-aware instants at the extraction boundary for validation and
/// again when materializing calendar entries.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractedEvent {
    /// Back-reference to the owning article's link.
    #[serde(default)]
    pub article_link: String,
    #[serde(default)]
    pub exchange_name: String,
    /// Ordered category tags, e.g. `["Listing"]`.
    #[serde(default)]
    pub event_type: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub trading_pairs: Vec<String>,
    #[serde(default)]
    pub markets: Vec<String>,
    #[serde(default)]
    pub start_datetime: String,
    #[serde(default)]
    pub end_datetime: String,
    #[serde(default)]
    pub event_summary: String,
    #[serde(default)]
    pub numerical_data: Vec<String>,
    #[serde(default)]
    pub user_action_required: Option<String>,
    #[serde(default)]
    pub separate_event_link: Option<String>,
    /// Assigned after extraction: `<fingerprint>@<occurrence>`.
    #[serde(rename = "UID", default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}
