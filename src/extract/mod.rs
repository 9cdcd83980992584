//! LLM event extraction.
//!
//! Each eligible article runs through a small per-record state machine:
//!
//! ```text
//! Unprocessed -> ExtractedRaw -> Refined -> Done
//!        \             \            \
//!         +-------------+------------+--> Failed
//! ```
//!
//! - `Unprocessed -> ExtractedRaw`: the article content goes to one of two
//!   prompts, selected by a title-substring rule (periodic digest reports
//!   get a single-pass prompt).
//! - `ExtractedRaw -> Refined`: non-digest articles get a second
//!   critique-and-correct pass over the raw JSON plus the original
//!   content; digest articles skip straight to Done.
//! - Any parse failure or terminal LLM error lands in `Failed`: the
//!   record's status stays `Pending` (eligible for retry next run) and no
//!   partial event list is kept.
//!
//! A response that fails to parse with an EOF error was likely truncated
//! by the token limit and is re-asked once before giving up; a known
//! model quirk of double-nesting the event list (`{"events": {"events":
//! [...]}}`) is flattened before validation.

pub mod facets;
pub mod prompts;

use crate::api::AskAsync;
use crate::models::{ArticleRecord, ExtractionResult, ProcessStatus};
use crate::store::collection::CollectionStore;
use crate::store::events::EventsStore;
use crate::text::{parse_flexible_datetime, restore_line_breaks};
use crate::uid::assign_uids;
use crate::utils::{looks_truncated, truncate_for_log};
use itertools::Itertools;
use std::collections::HashMap;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};

/// Which extraction strategy the stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Schema-shaped extraction with the two-pass refine protocol.
    Full,
    /// Independent per-facet sub-queries joined into one event.
    Facets,
}

/// Per-record progress through the extraction protocol. Terminal states
/// are `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Unprocessed,
    ExtractedRaw,
    Refined,
    Done,
    Failed,
}

/// Whether the title marks a periodic digest article.
pub fn is_digest(title: &str, digest_marker: &str) -> bool {
    title.contains(digest_marker)
}

/// Prepare the article material sent alongside the instructions.
pub fn prepare_content(record: &ArticleRecord) -> String {
    let body = restore_line_breaks(record.body.as_deref().unwrap_or(""));
    format!(
        "exchange_name: {}\npublish_datetime: {}\narticle_title: {}\narticle_link: {}\narticle: {}",
        record.exchange,
        record.publish_datetime.as_deref().unwrap_or(""),
        record.title,
        record.link,
        body
    )
}

/// Flatten the known double-nesting quirk in place.
fn flatten_nested_events(value: &mut serde_json::Value) {
    let Some(events) = value.get("events") else {
        return;
    };
    if let Some(inner) = events.get("events")
        && inner.is_array()
    {
        let inner = inner.clone();
        value["events"] = inner;
    }
}

/// One structured LLM call: ask, parse JSON, re-ask once on truncation,
/// flatten the nested-events quirk. `None` means this record failed for
/// the run (already logged).
async fn ask_structured(
    ask: &impl AskAsync,
    instructions: &str,
    content: &str,
) -> Option<serde_json::Value> {
    let response = match ask.ask(instructions, content).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "LLM call failed");
            return None;
        }
    };

    let mut parsed = serde_json::from_str::<serde_json::Value>(&response);
    if let Err(e) = &parsed
        && looks_truncated(e)
    {
        warn!(error = %e, "EOF while parsing response; re-asking once");
        match ask.ask(instructions, content).await {
            Ok(second) => parsed = serde_json::from_str::<serde_json::Value>(&second),
            Err(e2) => {
                error!(error = %e2, "Re-ask failed");
                return None;
            }
        }
    }

    match parsed {
        Ok(mut value) => {
            flatten_nested_events(&mut value);
            Some(value)
        }
        Err(e) => {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&response, 300),
                "Model returned non-conforming JSON"
            );
            None
        }
    }
}

/// Drop duplicate entries, preserving first-seen order.
fn dedup_in_place(list: &mut Vec<String>) {
    let deduped: Vec<String> = std::mem::take(list).into_iter().unique().collect();
    *list = deduped;
}

/// Validate a parsed response at the stage boundary.
///
/// Fills missing back-references from the record, dedupes the tag and
/// asset lists (order preserved), and requires every event to carry a
/// parseable `start <= end` window. Any invalid event fails the whole
/// record; no partial list is kept.
fn validate_result(value: serde_json::Value, record: &ArticleRecord) -> Option<ExtractionResult> {
    let mut result: ExtractionResult = match serde_json::from_value(value) {
        Ok(result) => result,
        Err(e) => {
            warn!(link = %record.link, error = %e, "Response shape does not match the event schema");
            return None;
        }
    };

    for event in result.events.iter_mut() {
        if event.article_link.is_empty() {
            event.article_link = record.link.clone();
        }
        if event.exchange_name.is_empty() {
            event.exchange_name = record.exchange.clone();
        }
        dedup_in_place(&mut event.event_type);
        dedup_in_place(&mut event.tokens);
        dedup_in_place(&mut event.trading_pairs);
        dedup_in_place(&mut event.markets);

        let Some(start) = parse_flexible_datetime(&event.start_datetime) else {
            warn!(link = %record.link, value = %event.start_datetime, "Event start datetime is unparseable");
            return None;
        };
        let Some(end) = parse_flexible_datetime(&event.end_datetime) else {
            warn!(link = %record.link, value = %event.end_datetime, "Event end datetime is unparseable");
            return None;
        };
        if start > end {
            warn!(link = %record.link, start = %event.start_datetime, end = %event.end_datetime, "Event window is inverted");
            return None;
        }
    }
    Some(result)
}

/// Run one record through the full extraction protocol.
///
/// Returns the validated extraction on success; `None` leaves the record
/// eligible for retry on a future run.
#[instrument(level = "info", skip_all, fields(link = %record.link))]
pub async fn process_record(
    ask: &impl AskAsync,
    record: &ArticleRecord,
    digest_marker: &str,
) -> Option<ExtractionResult> {
    let mut state = ExtractionState::Unprocessed;
    let content = prepare_content(record);
    let digest = is_digest(&record.title, digest_marker);
    debug!(?state, digest, "Starting extraction");
    let instructions: &str = if digest {
        &prompts::DIGEST_INSTRUCTIONS
    } else {
        &prompts::SINGLE_EVENT_INSTRUCTIONS
    };

    let Some(mut raw) = ask_structured(ask, instructions, &content).await else {
        state = ExtractionState::Failed;
        debug!(?state, "Extraction failed at first pass");
        return None;
    };
    state = ExtractionState::ExtractedRaw;
    debug!(?state, digest, "Raw extraction complete");

    if !digest {
        let pretty = serde_json::to_string_pretty(&raw).unwrap_or_else(|_| raw.to_string());
        let refine_input = format!("JSON:\n{pretty}\n**Additional data:**\n{content}");
        let Some(refined) = ask_structured(ask, prompts::REFINE_INSTRUCTIONS, &refine_input).await
        else {
            state = ExtractionState::Failed;
            debug!(?state, "Extraction failed at refine pass");
            return None;
        };
        raw = refined;
        state = ExtractionState::Refined;
        debug!(?state, "Refine pass complete");
    }

    let Some(result) = validate_result(raw, record) else {
        state = ExtractionState::Failed;
        debug!(?state, "Extraction failed validation");
        return None;
    };
    state = ExtractionState::Done;
    debug!(?state, events = result.events.len(), "Extraction complete");
    Some(result)
}

/// The extraction stage: process every eligible record, assign UIDs over
/// the whole new batch, and persist both stage files once.
#[instrument(level = "info", skip_all)]
pub async fn extract_events(
    ask: &impl AskAsync,
    store: &mut CollectionStore,
    events: &mut EventsStore,
    digest_marker: &str,
    mode: ExtractionMode,
) -> Result<usize, Box<dyn Error>> {
    let eligible: Vec<usize> = store
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.extraction_ready())
        .map(|(i, _)| i)
        .collect();

    if eligible.is_empty() {
        info!("No articles ready for extraction");
        return Ok(0);
    }
    info!(count = eligible.len(), ?mode, "Extracting events");

    let mut batch: Vec<ExtractionResult> = Vec::new();
    let mut succeeded = 0usize;
    for idx in eligible {
        let record = store.records()[idx].clone();
        let outcome = match mode {
            ExtractionMode::Full => process_record(ask, &record, digest_marker).await,
            ExtractionMode::Facets => facets::process_record(ask, &record).await,
        };
        match outcome {
            Some(result) => {
                store.records_mut()[idx].status = ProcessStatus::Done;
                batch.push(result);
                succeeded += 1;
            }
            None => {
                warn!(link = %record.link, "Record failed extraction; will retry next run");
            }
        }
    }

    let mut counters = HashMap::new();
    assign_uids(&mut batch, &mut counters);

    events.extend(batch);
    store.save()?;
    events.save()?;
    info!(succeeded, "Extraction pass complete");
    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LlmError;
    use crate::models::ArticleStub;
    use crate::store::test_support::scratch_dir;
    use std::sync::Mutex;

    /// Plays back a fixed list of responses, one per call.
    struct ScriptedAsk {
        responses: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl ScriptedAsk {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            ScriptedAsk {
                responses: Mutex::new(responses),
            }
        }

        fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    impl AskAsync for ScriptedAsk {
        async fn ask(&self, _instructions: &str, _content: &str) -> Result<String, LlmError> {
            let mut guard = self.responses.lock().unwrap();
            if guard.is_empty() {
                Err(LlmError::NoContent)
            } else {
                guard.remove(0)
            }
        }
    }

    fn ready_record(link: &str, title: &str) -> ArticleRecord {
        let mut record = ArticleRecord::from_stub(
            ArticleStub {
                link: link.to_string(),
                category: "Listing".to_string(),
                title: title.to_string(),
            },
            "Gate.io",
            "2025-01-10 08:00:00",
        );
        record.body = Some("Gate.io will list PEPE.///Trading opens soon.".to_string());
        record.publish_datetime = Some("2025-01-09 12:00:00".to_string());
        record
    }

    fn good_events_json() -> String {
        r#"{"events": [{
            "article_link": "",
            "exchange_name": "",
            "event_type": ["Listing", "Listing"],
            "tokens": ["PEPE"],
            "trading_pairs": ["PEPE/USDT"],
            "markets": ["Spot"],
            "start_datetime": "2025-01-10 08:00:00",
            "end_datetime": "2025-01-10 09:00:00",
            "event_summary": "PEPE listed",
            "numerical_data": [],
            "user_action_required": "",
            "separate_event_link": ""
        }]}"#
            .to_string()
    }

    #[test]
    fn test_is_digest() {
        assert!(is_digest("Gate.io Bi-Weekly Report #42", "Bi-Weekly Report"));
        assert!(!is_digest("Gate.io Will List PEPE", "Bi-Weekly Report"));
    }

    #[test]
    fn test_prepare_content_restores_line_breaks() {
        let record = ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE");
        let content = prepare_content(&record);
        assert!(content.contains("exchange_name: Gate.io"));
        assert!(content.contains("article_link: https://www.gate.io/article/1"));
        assert!(content.contains("Gate.io will list PEPE.\nTrading opens soon."));
        assert!(!content.contains("///"));
    }

    #[test]
    fn test_flatten_nested_events() {
        let mut value: serde_json::Value =
            serde_json::from_str(r#"{"events": {"events": [{"event_summary": "x"}]}}"#).unwrap();
        flatten_nested_events(&mut value);
        assert!(value["events"].is_array());
        assert_eq!(value["events"][0]["event_summary"], "x");
    }

    #[tokio::test]
    async fn test_two_pass_protocol_for_single_event_articles() {
        let ask = ScriptedAsk::new(vec![Ok(good_events_json()), Ok(good_events_json())]);
        let record = ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE");
        let result = process_record(&ask, &record, "Bi-Weekly Report").await.unwrap();
        // Both passes consumed.
        assert_eq!(ask.remaining(), 0);
        assert_eq!(result.events.len(), 1);
        let event = &result.events[0];
        // Back-references filled from the record.
        assert_eq!(event.article_link, "https://www.gate.io/article/1");
        assert_eq!(event.exchange_name, "Gate.io");
        // Duplicate tags collapsed, order preserved.
        assert_eq!(event.event_type, vec!["Listing".to_string()]);
    }

    #[tokio::test]
    async fn test_digest_articles_skip_refine_pass() {
        let ask = ScriptedAsk::new(vec![Ok(good_events_json()), Ok(good_events_json())]);
        let record = ready_record(
            "https://www.gate.io/article/2",
            "Gate.io Bi-Weekly Report #42",
        );
        let result = process_record(&ask, &record, "Bi-Weekly Report").await;
        assert!(result.is_some());
        // Only the first response was consumed.
        assert_eq!(ask.remaining(), 1);
    }

    #[tokio::test]
    async fn test_truncated_response_is_reasked_once() {
        let truncated = r#"{"events": [{"event_summary": "PE"#.to_string();
        let ask = ScriptedAsk::new(vec![
            Ok(truncated),
            Ok(good_events_json()),
            Ok(good_events_json()),
        ]);
        let record = ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE");
        let result = process_record(&ask, &record, "Bi-Weekly Report").await;
        assert!(result.is_some());
        assert_eq!(ask.remaining(), 0);
    }

    #[tokio::test]
    async fn test_malformed_response_fails_the_record() {
        let ask = ScriptedAsk::new(vec![Ok("not json at all".to_string())]);
        let record = ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE");
        assert!(process_record(&ask, &record, "Bi-Weekly Report").await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_llm_error_fails_the_record() {
        let ask = ScriptedAsk::new(vec![Err(LlmError::MalformedRequest {
            status: 400,
            message: "bad".to_string(),
        })]);
        let record = ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE");
        assert!(process_record(&ask, &record, "Bi-Weekly Report").await.is_none());
    }

    #[tokio::test]
    async fn test_inverted_window_fails_validation() {
        let inverted = r#"{"events": [{
            "event_type": ["Listing"],
            "start_datetime": "2025-01-12 08:00:00",
            "end_datetime": "2025-01-10 08:00:00",
            "event_summary": "backwards"
        }]}"#;
        let ask = ScriptedAsk::new(vec![
            Ok(inverted.to_string()),
            Ok(inverted.to_string()),
        ]);
        let record = ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE");
        assert!(process_record(&ask, &record, "Bi-Weekly Report").await.is_none());
    }

    #[tokio::test]
    async fn test_extract_stage_updates_status_and_assigns_uids() {
        let dir = scratch_dir("extract");
        let mut store = CollectionStore::load(&dir.join("collection.tsv")).unwrap();
        store.insert_new(vec![
            ready_record("https://www.gate.io/article/1", "Gate.io Will List PEPE"),
            ready_record("https://www.gate.io/article/2", "Gate.io Will List DOGE"),
        ]);
        let mut events = EventsStore::load(&dir.join("events.json")).unwrap();

        // First record succeeds (two passes); second fails terminally.
        let ask = ScriptedAsk::new(vec![
            Ok(good_events_json()),
            Ok(good_events_json()),
            Err(LlmError::NoContent),
        ]);

        let succeeded = extract_events(
            &ask,
            &mut store,
            &mut events,
            "Bi-Weekly Report",
            ExtractionMode::Full,
        )
        .await
        .unwrap();
        assert_eq!(succeeded, 1);

        assert_eq!(store.records()[0].status, ProcessStatus::Done);
        assert_eq!(store.records()[1].status, ProcessStatus::Pending);

        assert_eq!(events.len(), 1);
        let uid = events.results()[0].events[0].uid.as_deref().unwrap();
        assert!(uid.ends_with("@1"));

        // The failed record stays eligible for the next pass.
        let reloaded = CollectionStore::load(&dir.join("collection.tsv")).unwrap();
        assert!(reloaded.records()[1].extraction_ready());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
