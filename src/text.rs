//! Text normalization for scraped titles and article bodies.
//!
//! The announcement pages mix markdown artifacts, emoji, fullwidth CJK
//! punctuation, and trailing marketing signature blocks into the article
//! text. Everything here is a deterministic pure string transform so the
//! cleaning can run in any stage without side effects.
//!
//! Bodies are stored single-line in the TSV collection table: every line
//! break is encoded as `///` on the way in ([`clean_body`]) and expanded
//! back before the text is shown to the LLM ([`restore_line_breaks`]).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static QUOTES: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["“”‘’]"#).unwrap());
static TABS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+").unwrap());
static SPACE_BANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+!").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static TIGHT_OPEN_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S)\(").unwrap());
static TIGHT_CLOSE_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)(\S)").unwrap());
static PAREN_INNER_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s+").unwrap());
static PAREN_INNER_TRAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\)").unwrap());

static MD_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[([^\]]+)\]\(\s*[^\s)]+(?:\s+"[^"]*")?\s*\)"#).unwrap());
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[.*?\]\(.*?\)").unwrap());
static MD_CONTENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[//\]:content-type-MARKDOWN-DONOT-DELETE\s*\n?").unwrap());
static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\u{1F600}-\u{1F64F}\u{1F300}-\u{1F5FF}\u{1F680}-\u{1F6FF}\u{1F700}-\u{1F77F}\u{2700}-\u{27BF}\u{2600}-\u{26FF}\u{FE0F}]",
    )
    .unwrap()
});
static CIRCLES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{25CB}-\u{25EF}\u{2B55}]").unwrap());
static BRACKETED_CJK: Lazy<Regex> = Lazy::new(|| Regex::new(r"【.*?】").unwrap());
static LINE_LEAD_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s+").unwrap());
static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static LINE_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\r\n|\r|\n|\u{2028}|\u{2029})+").unwrap());
static ENCODED_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{3,}").unwrap());

/// Trailing boilerplate signature blocks appended to every announcement.
/// Matching any of these phrases truncates the body from that point on.
static SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?s)\s*Gateway to Crypto.*",
        r"(?s)\s*Gate\.io is your gateway to crypto.*",
        r"(?s)\s*Gate\.io is a Cryptocurrency Trading Platform Since 2013.*",
        r"(?s)\s*The gateway to cryptocurrency.*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Normalize a scraped article title for display and storage.
pub fn clean_title(title: &str) -> String {
    let mut t = QUOTES.replace_all(title, "").into_owned();
    t = TABS.replace_all(&t, " ").into_owned();
    t = t
        .replace('：', ": ")
        .replace("..", ".")
        .replace(" –", "–")
        .replace("– ", "–")
        .replace(" ,", ",")
        .replace(" :", ":");
    t = SPACE_BANG.replace_all(&t, "!").into_owned();
    t = MULTI_SPACE.replace_all(&t, " ").into_owned();
    t = TIGHT_OPEN_PAREN.replace_all(&t, "$1 (").into_owned();
    t = TIGHT_CLOSE_PAREN.replace_all(&t, ") $1").into_owned();
    t = PAREN_INNER_LEAD.replace_all(&t, "(").into_owned();
    t = PAREN_INNER_TRAIL.replace_all(&t, ")").into_owned();
    t.trim().to_string()
}

/// Normalize an article body and encode it single-line for TSV storage.
///
/// Strips markdown link/image syntax, emoji and decorative glyphs,
/// normalizes fullwidth punctuation and quotes, cuts the trailing
/// signature block, collapses whitespace, and finally replaces every run
/// of line breaks with the `///` delimiter sequence.
pub fn clean_body(text: &str) -> String {
    let mut b = MD_LINK.replace_all(text, "$1").into_owned();
    b = MD_IMAGE.replace_all(&b, "").into_owned();

    b = EMOJI.replace_all(&b, "").into_owned();
    b = b.replace('\u{00A0}', " ");
    b = CIRCLES.replace_all(&b, "").into_owned();

    b = b
        .replace('：', ": ")
        .replace('！', "! ")
        .replace("..", ".")
        .replace(" ,", ",")
        .replace(" :", ":");

    b = b.replace('\u{2013}', "-");
    b = QUOTES.replace_all(&b, "").into_owned();
    b = TABS.replace_all(&b, " ").into_owned();
    b = b.replace('&', "and");

    b = BRACKETED_CJK.replace_all(&b, "").into_owned();
    b = b.replace('＆', "and").replace('（', "(").replace('）', ")").replace('●', "•");

    b = LINE_LEAD_SPACE.replace_all(&b, "\n").into_owned();
    b = MULTI_NEWLINE.replace_all(&b, "\n").into_owned();

    b = MD_CONTENT_MARKER.replace_all(&b, "").into_owned();

    for signature in SIGNATURES.iter() {
        b = signature.replace(&b, "").into_owned();
        b = b.trim_end().to_string();
    }

    LINE_BREAKS.replace_all(&b, "///").into_owned()
}

/// Expand the `///` single-line delimiter back into newlines.
pub fn restore_line_breaks(body: &str) -> String {
    ENCODED_BREAKS.replace_all(body, "\n").into_owned()
}

/// Parse the datetime formats seen in announcement pages and LLM output.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (taken as UTC), and a bare
/// date (taken as UTC midnight).
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_quotes_and_spacing() {
        assert_eq!(
            clean_title("“PEPE” Listing  Announcement !"),
            "PEPE Listing Announcement!"
        );
        assert_eq!(clean_title("Update： New Pairs"), "Update: New Pairs");
    }

    #[test]
    fn test_clean_title_paren_spacing() {
        assert_eq!(clean_title("Token(ABC) Launch"), "Token (ABC) Launch");
        assert_eq!(clean_title("( ABC )Launch"), "(ABC) Launch");
    }

    #[test]
    fn test_clean_body_strips_markdown() {
        let cleaned = clean_body("See [the details](https://example.com) here ![img](x.png)");
        assert_eq!(cleaned, "See the details here");
    }

    #[test]
    fn test_clean_body_strips_emoji_and_ampersand() {
        let cleaned = clean_body("Big 🚀 news & more");
        assert_eq!(cleaned, "Big  news and more");
    }

    #[test]
    fn test_clean_body_truncates_signature() {
        let cleaned = clean_body("ABC listed today.\nGateway to Crypto\nTrade over 1700 coins");
        assert_eq!(cleaned, "ABC listed today.");
    }

    #[test]
    fn test_clean_body_encodes_line_breaks() {
        let cleaned = clean_body("line one\nline two\r\nline three");
        assert_eq!(cleaned, "line one///line two///line three");
    }

    #[test]
    fn test_restore_line_breaks() {
        assert_eq!(restore_line_breaks("a///b/////c"), "a\nb\nc");
        assert_eq!(restore_line_breaks("no breaks"), "no breaks");
    }

    #[test]
    fn test_parse_flexible_datetime_formats() {
        assert!(parse_flexible_datetime("2025-01-10 08:17:42").is_some());
        assert!(parse_flexible_datetime("2025-01-10 08:17").is_some());
        assert!(parse_flexible_datetime("2025-01-10T08:17:42+00:00").is_some());
        assert!(parse_flexible_datetime("2025-01-10").is_some());
        assert!(parse_flexible_datetime("").is_none());
        assert!(parse_flexible_datetime("soon").is_none());
    }

    #[test]
    fn test_parse_flexible_datetime_naive_is_utc() {
        let dt = parse_flexible_datetime("2025-01-10 08:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-10T08:00:00+00:00");
    }
}
