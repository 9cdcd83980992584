//! Facet extraction mode.
//!
//! Instead of one schema-shaped extraction call, this mode runs six
//! independent sub-prompts per record — summary, event types, tokens,
//! trading pairs, markets, action window — through a bounded worker pool
//! and joins the answers into a single event. The sub-queries share no
//! mutable state, so the only synchronization is collecting the results.
//!
//! After the join, a feature-count sanity check rejects the record if any
//! sub-result failed or if the answers do not cover all six facets; a
//! rejected record is excluded from this run's output and stays eligible
//! for reprocessing.

use super::{prepare_content, prompts};
use crate::api::AskAsync;
use crate::models::{ArticleRecord, ExtractedEvent, ExtractionResult};
use crate::text::parse_flexible_datetime;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Sub-queries issued per record.
const FACET_COUNT: usize = 6;
/// Worker-pool bound for concurrent sub-queries.
const FACET_POOL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Facet {
    Summary,
    EventTypes,
    Tokens,
    Pairs,
    Markets,
    Window,
}

fn facet_instructions(facet: Facet) -> &'static str {
    match facet {
        Facet::Summary => prompts::FACET_SUMMARY,
        Facet::EventTypes => prompts::FACET_EVENT_TYPES,
        Facet::Tokens => prompts::FACET_TOKENS,
        Facet::Pairs => prompts::FACET_PAIRS,
        Facet::Markets => prompts::FACET_MARKETS,
        Facet::Window => prompts::FACET_WINDOW,
    }
}

/// Split a comma-separated facet answer into a list.
fn split_list(answer: &str) -> Vec<String> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the `start|end` window answer.
fn parse_window(answer: &str) -> Option<(String, String)> {
    let (start, end) = answer.trim().split_once('|')?;
    let start = start.trim();
    let end = end.trim();
    let start_dt = parse_flexible_datetime(start)?;
    let end_dt = parse_flexible_datetime(end)?;
    if start_dt > end_dt {
        return None;
    }
    Some((start.to_string(), end.to_string()))
}

/// Run the six sub-prompts for one record and join the answers.
///
/// `None` rejects the record for this run; its status is left untouched
/// by the caller so it is retried later.
#[instrument(level = "info", skip_all, fields(link = %record.link))]
pub async fn process_record(
    ask: &impl AskAsync,
    record: &ArticleRecord,
) -> Option<ExtractionResult> {
    let content = prepare_content(record);
    let facets = [
        Facet::Summary,
        Facet::EventTypes,
        Facet::Tokens,
        Facet::Pairs,
        Facet::Markets,
        Facet::Window,
    ];

    let answers: Vec<(Facet, Option<String>)> = stream::iter(facets)
        .map(|facet| {
            let content = content.as_str();
            async move {
                match ask.ask(facet_instructions(facet), content).await {
                    Ok(answer) => (facet, Some(answer)),
                    Err(e) => {
                        warn!(?facet, error = %e, "Facet sub-query failed");
                        (facet, None)
                    }
                }
            }
        })
        .buffer_unordered(FACET_POOL)
        .collect()
        .await;

    // Feature-count sanity check: every facet answered, none errored.
    let mut joined: HashMap<Facet, String> = HashMap::new();
    for (facet, answer) in answers {
        joined.insert(facet, answer?);
    }
    if joined.len() != FACET_COUNT {
        warn!(got = joined.len(), expected = FACET_COUNT, "Facet join incomplete; rejecting record");
        return None;
    }

    let summary = joined[&Facet::Summary].trim().to_string();
    if summary.is_empty() {
        warn!("Empty summary facet; rejecting record");
        return None;
    }
    let event_type = split_list(&joined[&Facet::EventTypes]);
    if event_type.is_empty() {
        warn!("Empty event-type facet; rejecting record");
        return None;
    }
    let Some((start_datetime, end_datetime)) = parse_window(&joined[&Facet::Window]) else {
        warn!(answer = %joined[&Facet::Window], "Unusable window facet; rejecting record");
        return None;
    };

    let event = ExtractedEvent {
        article_link: record.link.clone(),
        exchange_name: record.exchange.clone(),
        event_type,
        tokens: split_list(&joined[&Facet::Tokens]),
        trading_pairs: split_list(&joined[&Facet::Pairs]),
        markets: split_list(&joined[&Facet::Markets]),
        start_datetime,
        end_datetime,
        event_summary: summary,
        ..Default::default()
    };
    debug!("Facet join complete");
    Some(ExtractionResult {
        events: vec![event],
    })
}
