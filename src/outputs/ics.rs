//! ICS serialization and subscription-file writing.
//!
//! Emits RFC 5545 text directly: a VCALENDAR wrapping one VEVENT per
//! [`CalendarEntry`], each with two fixed display alarms (one day and one
//! hour before the start) and `TRANSP:TRANSPARENT` so entries never block
//! "busy" time in calendar clients.

use crate::calendar::{CalendarEntry, CalendarRequest, filter_events, materialize, recency_threshold};
use crate::models::ExtractionResult;
use chrono::{DateTime, FixedOffset, Utc};
use std::error::Error;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Escape a TEXT value per RFC 5545 §3.3.11.
fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\r', "")
        .replace('\n', "\\n")
}

/// UTC date-time in the `YYYYMMDDTHHMMSSZ` basic format.
fn format_datetime(dt: &DateTime<FixedOffset>) -> String {
    dt.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string()
}

/// Serialize entries into one VCALENDAR.
pub fn to_ics(entries: &[CalendarEntry], dtstamp: DateTime<Utc>) -> String {
    let stamp = dtstamp.format("%Y%m%dT%H%M%SZ").to_string();
    let mut out = String::new();
    let _ = write!(out, "BEGIN:VCALENDAR\r\n");
    let _ = write!(out, "VERSION:2.0\r\n");
    let _ = write!(out, "PRODID:-//coincal//coincal {}//EN\r\n", env!("CARGO_PKG_VERSION"));
    for entry in entries {
        let _ = write!(out, "BEGIN:VEVENT\r\n");
        let _ = write!(out, "UID:{}\r\n", escape_text(&entry.uid));
        let _ = write!(out, "DTSTAMP:{stamp}\r\n");
        let _ = write!(out, "DTSTART:{}\r\n", format_datetime(&entry.begin));
        let _ = write!(out, "DTEND:{}\r\n", format_datetime(&entry.end));
        let _ = write!(out, "SUMMARY:{}\r\n", escape_text(&entry.name));
        let _ = write!(out, "DESCRIPTION:{}\r\n", escape_text(&entry.description));
        if let Some(location) = &entry.location {
            let _ = write!(out, "LOCATION:{}\r\n", escape_text(location));
        }
        if !entry.url.is_empty() {
            let _ = write!(out, "URL:{}\r\n", entry.url);
        }
        let _ = write!(out, "TRANSP:TRANSPARENT\r\n");
        for trigger in ["-P1D", "-PT1H"] {
            let _ = write!(out, "BEGIN:VALARM\r\n");
            let _ = write!(out, "ACTION:DISPLAY\r\n");
            let _ = write!(out, "DESCRIPTION:Reminder\r\n");
            let _ = write!(out, "TRIGGER:{trigger}\r\n");
            let _ = write!(out, "END:VALARM\r\n");
        }
        let _ = write!(out, "END:VEVENT\r\n");
    }
    let _ = write!(out, "END:VCALENDAR\r\n");
    out
}

/// `Gate.io` + `New Listings` → `Gateio_New_Listings.ics`
fn subscription_file_name(exchange: &str, request_name: &str) -> String {
    let exchange = exchange.replace('.', "").replace(' ', "_");
    let name = request_name.replace(' ', "_");
    format!("{exchange}_{name}.ics")
}

/// Build and write every configured subscription calendar.
///
/// Each request filters the full event corpus by recency and criteria,
/// materializes the survivors, and overwrites its ICS file. Requests that
/// match nothing are logged and produce no file. Returns the number of
/// files written.
#[instrument(level = "info", skip_all, fields(dir = %subscribe_dir.display()))]
pub async fn publish_calendars(
    results: &[ExtractionResult],
    requests: &[CalendarRequest],
    recency_days: i64,
    now: DateTime<Utc>,
    subscribe_dir: &Path,
    exchange: &str,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let threshold = recency_threshold(now, recency_days);
    let all_events = results.iter().flat_map(|r| r.events.iter());
    let mut written = Vec::new();

    for request in requests {
        let selected = filter_events(all_events.clone(), request, threshold);
        if selected.is_empty() {
            info!(request = %request.name, "No matching events for calendar request");
            continue;
        }
        let entries: Vec<CalendarEntry> = selected
            .iter()
            .filter_map(|event| materialize(event))
            .flatten()
            .collect();
        if entries.is_empty() {
            info!(request = %request.name, "No materializable events for calendar request");
            continue;
        }

        let path = subscribe_dir.join(subscription_file_name(exchange, &request.name));
        tokio::fs::write(&path, to_ics(&entries, now)).await?;
        info!(path = %path.display(), entries = entries.len(), "Saved calendar");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedEvent;
    use crate::store::test_support::scratch_dir;
    use chrono::TimeZone;

    fn entry() -> CalendarEntry {
        CalendarEntry {
            name: "Gate.io: Listing of PEPE".to_string(),
            begin: DateTime::parse_from_rfc3339("2025-01-10T08:00:00+00:00").unwrap(),
            end: DateTime::parse_from_rfc3339("2025-01-10T09:30:00+00:00").unwrap(),
            uid: "deadbeef@1".to_string(),
            description: "PEPE listed; trading opens,\nfees apply".to_string(),
            location: None,
            url: "https://www.gate.io/article/1".to_string(),
        }
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a;b,c\\d\ne"), "a\\;b\\,c\\\\d\\ne");
    }

    #[test]
    fn test_to_ics_structure() {
        let now = Utc.with_ymd_and_hms(2025, 1, 13, 12, 0, 0).unwrap();
        let ics = to_ics(&[entry()], now);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("UID:deadbeef@1\r\n"));
        assert!(ics.contains("DTSTAMP:20250113T120000Z\r\n"));
        assert!(ics.contains("DTSTART:20250110T080000Z\r\n"));
        assert!(ics.contains("DTEND:20250110T093000Z\r\n"));
        assert!(ics.contains("SUMMARY:Gate.io: Listing of PEPE\r\n"));
        assert!(ics.contains("DESCRIPTION:PEPE listed\\; trading opens\\,\\nfees apply\r\n"));
        assert!(ics.contains("TRANSP:TRANSPARENT\r\n"));
        assert_eq!(ics.matches("BEGIN:VALARM\r\n").count(), 2);
        assert!(ics.contains("TRIGGER:-P1D\r\n"));
        assert!(ics.contains("TRIGGER:-PT1H\r\n"));
    }

    #[test]
    fn test_location_only_on_markers() {
        let mut marker = entry();
        marker.location = Some("Period Starts".to_string());
        let now = Utc.with_ymd_and_hms(2025, 1, 13, 12, 0, 0).unwrap();
        assert!(!to_ics(&[entry()], now).contains("LOCATION:"));
        assert!(to_ics(&[marker], now).contains("LOCATION:Period Starts\r\n"));
    }

    #[test]
    fn test_subscription_file_name() {
        assert_eq!(subscription_file_name("Gate.io", "Listing"), "Gateio_Listing.ics");
        assert_eq!(
            subscription_file_name("Gate.io", "New Listings"),
            "Gateio_New_Listings.ics"
        );
    }

    #[tokio::test]
    async fn test_publish_writes_one_file_per_matching_request() {
        let dir = scratch_dir("ics");
        let now = Utc.with_ymd_and_hms(2025, 1, 13, 12, 0, 0).unwrap();

        let event = ExtractedEvent {
            article_link: "https://www.gate.io/article/1".to_string(),
            exchange_name: "Gate.io".to_string(),
            event_type: vec!["Listing".to_string()],
            start_datetime: "2025-01-12 08:00:00".to_string(),
            end_datetime: "2025-01-12 09:00:00".to_string(),
            event_summary: "PEPE listed".to_string(),
            uid: Some("deadbeef@1".to_string()),
            ..Default::default()
        };
        let results = vec![ExtractionResult { events: vec![event] }];
        let requests = vec![
            CalendarRequest::for_event_type("Listing"),
            CalendarRequest::for_event_type("Delisting"),
        ];

        let written = publish_calendars(&results, &requests, 3, now, &dir, "Gate.io")
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert!(dir.join("Gateio_Listing.ics").is_file());
        assert!(!dir.join("Gateio_Delisting.ics").exists());

        let ics = std::fs::read_to_string(dir.join("Gateio_Listing.ics")).unwrap();
        assert!(ics.contains("UID:deadbeef@1\r\n"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
