//! Calendar materialization.
//!
//! Converts [`ExtractedEvent`]s into disposable [`CalendarEntry`] views.
//! Entries are recomputed on every build and never persisted as
//! authoritative state; the events file remains the source of truth.
//!
//! # Single-day vs multi-day
//!
//! The split compares the calendar *date* of the start and end instants,
//! not the instants themselves:
//! - same date: one entry, begin floored to the hour, end shown at minute
//!   30 of its hour, so every single-day event gets a readable window
//! - different dates: a "Period Starts" marker spanning the first 30
//!   minutes and a "Period Ends" marker spanning the last 30, with `_start`
//!   / `_end` appended to the UID

use crate::models::ExtractedEvent;
use crate::text::parse_flexible_datetime;
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

/// One ICS-style entry, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEntry {
    pub name: String,
    pub begin: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub uid: String,
    pub description: String,
    /// "Period Starts" / "Period Ends" on multi-day markers.
    pub location: Option<String>,
    pub url: String,
}

/// Materialize one event into one or two calendar entries.
///
/// Returns `None` for events that cannot be placed on a calendar: missing
/// UID (not yet assigned) or undecodable datetimes. Such events are logged
/// and skipped; they never abort the build.
pub fn materialize(event: &ExtractedEvent) -> Option<Vec<CalendarEntry>> {
    let Some(uid) = event.uid.as_deref() else {
        warn!(link = %event.article_link, "Event has no UID; skipping");
        return None;
    };
    let Some(start) = parse_flexible_datetime(&event.start_datetime) else {
        warn!(link = %event.article_link, value = %event.start_datetime, "Unparseable start datetime");
        return None;
    };
    let Some(end) = parse_flexible_datetime(&event.end_datetime) else {
        warn!(link = %event.article_link, value = %event.end_datetime, "Unparseable end datetime");
        return None;
    };

    let assets = combined_assets(event);
    let name = entry_name(&event.exchange_name, &event.event_type, &assets);
    let description = entry_description(event, &assets);

    if start.date_naive() == end.date_naive() {
        let begin = start.with_minute(0)?.with_second(0)?.with_nanosecond(0)?;
        let end = end.with_minute(30)?.with_second(0)?.with_nanosecond(0)?;
        Some(vec![CalendarEntry {
            name,
            begin,
            end,
            uid: uid.to_string(),
            description,
            location: None,
            url: event.article_link.clone(),
        }])
    } else {
        let start_marker = CalendarEntry {
            name: name.clone(),
            begin: start,
            end: start + Duration::minutes(30),
            uid: format!("{uid}_start"),
            description: description.clone(),
            location: Some("Period Starts".to_string()),
            url: event.article_link.clone(),
        };
        let end_marker = CalendarEntry {
            name,
            begin: end - Duration::minutes(30),
            end,
            uid: format!("{uid}_end"),
            description,
            location: Some("Period Ends".to_string()),
            url: event.article_link.clone(),
        };
        Some(vec![start_marker, end_marker])
    }
}

/// Tokens and trading pairs concatenated in source order, not deduplicated.
fn combined_assets(event: &ExtractedEvent) -> Vec<String> {
    event
        .tokens
        .iter()
        .chain(event.trading_pairs.iter())
        .cloned()
        .collect()
}

/// `"{exchange}: {event types}"`, plus the asset list when it stays
/// readable (10 or fewer entries) or a placeholder when it does not.
fn entry_name(exchange: &str, event_types: &[String], assets: &[String]) -> String {
    let types = event_types.join(", ");
    if assets.is_empty() {
        format!("{exchange}: {types}")
    } else if assets.len() > 10 {
        format!("{exchange}: {types} of Various Assets")
    } else {
        format!("{exchange}: {types} of {}", assets.join(", "))
    }
}

/// Assemble the description from non-empty parts in fixed order: summary,
/// assets, markets, numerical data, user action, external link.
fn entry_description(event: &ExtractedEvent, assets: &[String]) -> String {
    let mut parts: Vec<String> = vec![event.event_summary.clone()];
    if !assets.is_empty() {
        parts.push(format!("\nAssets: {}", assets.join(", ")));
    }
    if !event.markets.is_empty() {
        parts.push(format!("Markets: {}", event.markets.join(", ")));
    }
    if !event.numerical_data.is_empty() {
        parts.push(event.numerical_data.join(",\n"));
    }
    if let Some(action) = event.user_action_required.as_deref()
        && !action.is_empty()
    {
        parts.push(format!("\n{action}"));
    }
    if let Some(link) = event.separate_event_link.as_deref()
        && !link.is_empty()
    {
        parts.push(link.to_string());
    }
    parts.retain(|p| !p.is_empty());
    parts.join("\n")
}

/// Criteria for one named subscription calendar.
///
/// Criteria are ANDed; an empty criterion is "no constraint". Event types
/// match on intersection, the set-valued fields on the request being a
/// subset of the event's values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarRequest {
    pub name: String,
    #[serde(default)]
    pub event_type: Vec<String>,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub trading_pairs: Vec<String>,
    #[serde(default)]
    pub markets: Vec<String>,
}

impl CalendarRequest {
    pub fn for_event_type(event_type: &str) -> Self {
        CalendarRequest {
            name: event_type.to_string(),
            event_type: vec![event_type.to_string()],
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &ExtractedEvent) -> bool {
        let type_ok = self.event_type.is_empty()
            || self
                .event_type
                .iter()
                .any(|t| event.event_type.iter().any(|e| e == t));
        type_ok
            && is_subset(&self.tokens, &event.tokens)
            && is_subset(&self.trading_pairs, &event.trading_pairs)
            && is_subset(&self.markets, &event.markets)
    }
}

fn is_subset(requested: &[String], present: &[String]) -> bool {
    if requested.is_empty() {
        return true;
    }
    let have: HashSet<&str> = present.iter().map(String::as_str).collect();
    requested.iter().all(|r| have.contains(r.as_str()))
}

/// The rolling cutoff below which events are considered stale.
pub fn recency_threshold(now: DateTime<Utc>, recency_days: i64) -> DateTime<Utc> {
    now - Duration::days(recency_days)
}

/// Select the events for one subscription calendar.
///
/// An event qualifies when its start is not older than the threshold AND
/// it matches the request. Events with an undecodable start are skipped.
pub fn filter_events<'a>(
    events: impl IntoIterator<Item = &'a ExtractedEvent>,
    request: &CalendarRequest,
    threshold: DateTime<Utc>,
) -> Vec<&'a ExtractedEvent> {
    events
        .into_iter()
        .filter(|event| {
            let Some(start) = parse_flexible_datetime(&event.start_datetime) else {
                warn!(link = %event.article_link, "Unparseable start datetime in filter; skipping");
                return false;
            };
            start.with_timezone(&Utc) >= threshold && request.matches(event)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start: &str, end: &str) -> ExtractedEvent {
        ExtractedEvent {
            article_link: "https://www.gate.io/article/1".to_string(),
            exchange_name: "Gate.io".to_string(),
            event_type: vec!["Listing".to_string()],
            tokens: vec!["PEPE".to_string()],
            trading_pairs: vec!["PEPE/USDT".to_string()],
            markets: vec!["Spot".to_string()],
            start_datetime: start.to_string(),
            end_datetime: end.to_string(),
            event_summary: "PEPE spot listing".to_string(),
            numerical_data: vec![],
            user_action_required: None,
            separate_event_link: None,
            uid: Some("deadbeef@1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_day_rounding() {
        let entries =
            materialize(&event("2025-01-10 08:17:42", "2025-01-10 09:03:10")).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.uid, "deadbeef@1");
        assert_eq!(entry.begin.to_rfc3339(), "2025-01-10T08:00:00+00:00");
        assert_eq!(entry.end.to_rfc3339(), "2025-01-10T09:30:00+00:00");
        assert!(entry.location.is_none());
    }

    #[test]
    fn test_multi_day_split() {
        let entries =
            materialize(&event("2025-01-10 08:00:00", "2025-01-12 08:00:00")).unwrap();
        assert_eq!(entries.len(), 2);

        let start = &entries[0];
        assert_eq!(start.uid, "deadbeef@1_start");
        assert_eq!(start.begin.to_rfc3339(), "2025-01-10T08:00:00+00:00");
        assert_eq!(start.end.to_rfc3339(), "2025-01-10T08:30:00+00:00");
        assert_eq!(start.location.as_deref(), Some("Period Starts"));

        let end = &entries[1];
        assert_eq!(end.uid, "deadbeef@1_end");
        assert_eq!(end.begin.to_rfc3339(), "2025-01-12T07:30:00+00:00");
        assert_eq!(end.end.to_rfc3339(), "2025-01-12T08:00:00+00:00");
        assert_eq!(end.location.as_deref(), Some("Period Ends"));
    }

    #[test]
    fn test_unassigned_uid_is_skipped() {
        let mut e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");
        e.uid = None;
        assert!(materialize(&e).is_none());
    }

    #[test]
    fn test_name_lists_up_to_ten_assets() {
        let mut e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");
        e.tokens = (1..=10).map(|i| format!("TOK{i}")).collect();
        e.trading_pairs = vec![];
        let entries = materialize(&e).unwrap();
        assert_eq!(
            entries[0].name,
            "Gate.io: Listing of TOK1, TOK2, TOK3, TOK4, TOK5, TOK6, TOK7, TOK8, TOK9, TOK10"
        );
    }

    #[test]
    fn test_name_truncates_above_ten_assets() {
        let mut e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");
        e.tokens = (1..=11).map(|i| format!("TOK{i}")).collect();
        e.trading_pairs = vec![];
        let entries = materialize(&e).unwrap();
        assert_eq!(entries[0].name, "Gate.io: Listing of Various Assets");
    }

    #[test]
    fn test_name_without_assets() {
        let mut e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");
        e.tokens = vec![];
        e.trading_pairs = vec![];
        e.event_type = vec!["Maintenance".to_string(), "Upgrade".to_string()];
        let entries = materialize(&e).unwrap();
        assert_eq!(entries[0].name, "Gate.io: Maintenance, Upgrade");
    }

    #[test]
    fn test_description_skips_empty_parts() {
        let mut e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");
        e.numerical_data = vec![];
        e.user_action_required = Some(String::new());
        e.separate_event_link = None;
        let entries = materialize(&e).unwrap();
        let description = &entries[0].description;
        assert!(description.starts_with("PEPE spot listing"));
        assert!(description.contains("Assets: PEPE, PEPE/USDT"));
        assert!(description.contains("Markets: Spot"));
        assert!(!description.contains("\n\n\n"));
    }

    #[test]
    fn test_description_orders_all_parts() {
        let mut e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");
        e.numerical_data = vec!["Supply: 420T".to_string(), "Fee: 0.2%".to_string()];
        e.user_action_required = Some("Deposit before listing".to_string());
        e.separate_event_link = Some("https://www.gate.io/trade/PEPE_USDT".to_string());
        let entries = materialize(&e).unwrap();
        let description = &entries[0].description;
        let summary_pos = description.find("PEPE spot listing").unwrap();
        let assets_pos = description.find("Assets:").unwrap();
        let markets_pos = description.find("Markets:").unwrap();
        let numeric_pos = description.find("Supply: 420T,\nFee: 0.2%").unwrap();
        let action_pos = description.find("Deposit before listing").unwrap();
        let link_pos = description.find("https://www.gate.io/trade/PEPE_USDT").unwrap();
        assert!(summary_pos < assets_pos);
        assert!(assets_pos < markets_pos);
        assert!(markets_pos < numeric_pos);
        assert!(numeric_pos < action_pos);
        assert!(action_pos < link_pos);
    }

    #[test]
    fn test_request_matching() {
        let e = event("2025-01-10 08:00:00", "2025-01-10 09:00:00");

        let listing = CalendarRequest::for_event_type("Listing");
        assert!(listing.matches(&e));

        let delisting = CalendarRequest::for_event_type("Delisting");
        assert!(!delisting.matches(&e));

        // Empty criteria always match.
        let unconstrained = CalendarRequest {
            name: "All".to_string(),
            ..Default::default()
        };
        assert!(unconstrained.matches(&e));

        // Subset criteria must all be present on the event.
        let subset = CalendarRequest {
            name: "Pepe spot".to_string(),
            tokens: vec!["PEPE".to_string()],
            markets: vec!["Spot".to_string()],
            ..Default::default()
        };
        assert!(subset.matches(&e));

        let missing_token = CalendarRequest {
            name: "Doge".to_string(),
            tokens: vec!["DOGE".to_string()],
            ..Default::default()
        };
        assert!(!missing_token.matches(&e));
    }

    #[test]
    fn test_recency_filter_excludes_stale_events() {
        let now = Utc.with_ymd_and_hms(2025, 1, 13, 12, 0, 0).unwrap();
        let threshold = recency_threshold(now, 3);

        let fresh = event("2025-01-11 08:00:00", "2025-01-11 09:00:00");
        let stale = event("2025-01-09 08:00:00", "2025-01-09 09:00:00");
        let events = [fresh, stale];

        let request = CalendarRequest::for_event_type("Listing");
        let selected = filter_events(events.iter(), &request, threshold);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].start_datetime, "2025-01-11 08:00:00");
    }
}
