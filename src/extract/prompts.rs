//! Instruction strings for the extraction calls.
//!
//! Two article-level variants (single-event announcements vs periodic
//! digest reports) plus the second-pass critique prompt, and the six
//! facet instructions used by the optional facet extraction mode.

use once_cell::sync::Lazy;

/// Shared schema description appended to both article-level prompts.
const EVENT_SCHEMA: &str = r#"Respond with JSON only, no prose and no code fences, shaped as:
{"events": [{
  "article_link": string,
  "exchange_name": string,
  "event_type": [string],
  "tokens": [string],
  "trading_pairs": [string],
  "markets": [string],
  "start_datetime": "YYYY-MM-DD HH:MM:SS",
  "end_datetime": "YYYY-MM-DD HH:MM:SS",
  "event_summary": string,
  "numerical_data": [string],
  "user_action_required": string,
  "separate_event_link": string
}]}
Use an empty list or empty string when a field does not apply. Use the
article's publish time as the start when no explicit time is given, and
set end_datetime equal to start_datetime for instantaneous events."#;

/// Single-event announcement articles.
pub static SINGLE_EVENT_INSTRUCTIONS: Lazy<String> = Lazy::new(|| {
    format!(
        "You extract structured calendar events from a cryptocurrency \
         exchange announcement. The input gives the exchange name, publish \
         time, title, link, and article text. Extract every concrete, \
         dated event (listing, delisting, trading-pair launch, fee change, \
         maintenance, airdrop, and similar). Skip marketing content with \
         no date. Classify each event with one or more event_type tags \
         such as Listing, Delisting, Trading, Fee Change, Maintenance, \
         Airdrop.\n\n{EVENT_SCHEMA}"
    )
});

/// Periodic digest articles summarizing many events at once.
pub static DIGEST_INSTRUCTIONS: Lazy<String> = Lazy::new(|| {
    format!(
        "You extract structured calendar events from a periodic digest \
         report published by a cryptocurrency exchange. The report covers \
         many independent events; emit one entry per event, keeping the \
         report's order. Do not merge unrelated events and do not invent \
         dates that the report does not state.\n\n{EVENT_SCHEMA}"
    )
});

/// Second pass: critique and correct the raw extraction.
pub const REFINE_INSTRUCTIONS: &str = "You review a JSON extraction of \
calendar events against the original article it was extracted from. Fix \
wrong or missing datetimes, wrong token and trading-pair symbols, events \
that were merged or split incorrectly, and summaries that contradict the \
article. Keep the JSON shape exactly as given and respond with the \
corrected JSON only, no prose and no code fences.";

/// Facet-mode instructions; each asks for one narrow answer.
pub const FACET_SUMMARY: &str = "Summarize the announcement below in one \
or two plain sentences. Respond with the summary text only.";

pub const FACET_EVENT_TYPES: &str = "Classify the announcement below with \
one or more of: Listing, Delisting, Trading, Fee Change, Maintenance, \
Airdrop. Respond with a comma-separated list only.";

pub const FACET_TOKENS: &str = "List the token symbols the announcement \
below concerns (e.g. BTC, PEPE). Respond with a comma-separated list \
only, or an empty line if none.";

pub const FACET_PAIRS: &str = "List the trading pairs the announcement \
below concerns (e.g. PEPE/USDT). Respond with a comma-separated list \
only, or an empty line if none.";

pub const FACET_MARKETS: &str = "List the markets the announcement below \
concerns (e.g. Spot, Futures, Margin). Respond with a comma-separated \
list only, or an empty line if none.";

pub const FACET_WINDOW: &str = "Extract the action window of the \
announcement below. Respond with exactly one line shaped as \
'YYYY-MM-DD HH:MM:SS|YYYY-MM-DD HH:MM:SS' (start|end). Use the publish \
time for both when no explicit window is stated.";
