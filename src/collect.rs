//! The article-collection stage.
//!
//! Fetches every configured category listing page, parses it into stubs,
//! and appends only unseen links to the collection table. One failing
//! source never aborts the others; each failure is logged and the pass
//! moves on.

use crate::config::SourceEntry;
use crate::models::ArticleRecord;
use crate::retry::RetryPolicy;
use crate::scrapers::{self, gateio, polite_delay};
use crate::store::collection::CollectionStore;
use crate::utils::table_timestamp;
use chrono::{DateTime, Utc};
use std::error::Error;
use tracing::{error, info, instrument, warn};

/// Scrape all sources and persist the grown collection table.
///
/// Returns the number of newly inserted records.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn collect_articles(
    http: &reqwest::Client,
    policy: &RetryPolicy,
    sources: &[SourceEntry],
    exchange: &str,
    store: &mut CollectionStore,
    now: DateTime<Utc>,
) -> Result<usize, Box<dyn Error>> {
    let discovered_at = table_timestamp(now);
    let mut batch: Vec<ArticleRecord> = Vec::new();

    for (i, source) in sources.iter().enumerate() {
        if i > 0 {
            polite_delay().await;
        }
        info!(category = %source.category, url = %source.url, "Scraping listing page");

        let Some(html) = scrapers::fetch_html(http, &source.url, policy).await else {
            error!(category = %source.category, url = %source.url, "Failed to fetch listing page");
            continue;
        };
        let Some(stubs) = gateio::parse_listing(&html, &source.category) else {
            warn!(category = %source.category, "Listing container absent; layout mismatch?");
            continue;
        };
        if stubs.is_empty() {
            info!(category = %source.category, "No articles on listing page");
            continue;
        }
        batch.extend(
            stubs
                .into_iter()
                .map(|stub| ArticleRecord::from_stub(stub, exchange, &discovered_at)),
        );
    }

    let inserted = store.insert_new(batch);
    store.save()?;
    info!(inserted, total = store.len(), "Collection pass complete");
    Ok(inserted)
}
