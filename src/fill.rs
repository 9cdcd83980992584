//! The body-fill stage.
//!
//! Selects every record still missing a body OR a publish time (either
//! one missing makes it eligible), fetches the article detail page, and
//! writes both fields back together. Partial parses commit nothing: a row
//! with a body but no publish time could later be misread as fully
//! processed, so the record stays untouched and fully eligible for retry.
//!
//! The whole batch is persisted once at the end of the pass. A mid-run
//! crash loses the pass, which is acceptable: the selection is recomputed
//! from the file on the next run.

use crate::models::ArticleRecord;
use crate::retry::RetryPolicy;
use crate::scrapers::{self, gateio, polite_delay};
use crate::store::collection::CollectionStore;
use std::error::Error;
use tracing::{error, info, instrument, warn};

/// Whether the record still needs a detail fetch.
fn needs_fill(record: &ArticleRecord) -> bool {
    record.body.as_deref().is_none_or(str::is_empty)
        || record.publish_datetime.as_deref().is_none_or(str::is_empty)
}

/// Commit both detail fields, or neither.
///
/// Already-populated fields are never overwritten, so a re-fetch with
/// different upstream content cannot change a filled row.
fn apply_detail(record: &mut ArticleRecord, body: &str, publish_datetime: &str) -> bool {
    if body.is_empty() || publish_datetime.is_empty() {
        return false;
    }
    if record.body.as_deref().is_none_or(str::is_empty) {
        record.body = Some(body.to_string());
    }
    if record.publish_datetime.as_deref().is_none_or(str::is_empty) {
        record.publish_datetime = Some(publish_datetime.to_string());
    }
    true
}

/// Fetch detail pages for every eligible record and persist the table.
///
/// Returns the number of records filled.
#[instrument(level = "info", skip_all)]
pub async fn fill_bodies(
    http: &reqwest::Client,
    policy: &RetryPolicy,
    store: &mut CollectionStore,
) -> Result<usize, Box<dyn Error>> {
    let pending: Vec<usize> = store
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| needs_fill(r))
        .map(|(i, _)| i)
        .collect();

    if pending.is_empty() {
        info!("No articles need detail filling");
        return Ok(0);
    }
    info!(count = pending.len(), "Filling article details");

    let mut filled = 0usize;
    for (i, idx) in pending.into_iter().enumerate() {
        if i > 0 {
            polite_delay().await;
        }
        let link = store.records()[idx].link.clone();

        let Some(html) = scrapers::fetch_html(http, &link, policy).await else {
            error!(%link, "Failed to fetch article detail page");
            continue;
        };
        let Some((body, publish_datetime)) = gateio::parse_article_detail(&html) else {
            warn!(%link, "Detail container absent; layout mismatch?");
            continue;
        };
        if apply_detail(&mut store.records_mut()[idx], &body, &publish_datetime) {
            filled += 1;
        } else {
            warn!(%link, "Detail parse was partial; leaving record for retry");
        }
    }

    store.save()?;
    info!(filled, "Fill pass complete");
    Ok(filled)
}
