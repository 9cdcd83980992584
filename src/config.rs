//! Run configuration.
//!
//! One YAML file describes everything a run needs: the exchange name, the
//! category listing pages to scrape, LLM settings, retry schedules, the
//! calendar subscription requests, and retention counts. A missing or
//! unparseable config file is fatal at startup, before any stage runs.
//!
//! ```yaml
//! exchange: Gate.io
//! sources:
//!   - url: https://www.gate.io/announcements/newlisted
//!     category: Listing
//!   - url: https://www.gate.io/announcements/delisted
//!     category: Delisting
//! calendars:
//!   - name: Listing
//!     event_type: [Listing]
//!   - name: Delisting
//!     event_type: [Delisting]
//! ```

use crate::calendar::CalendarRequest;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// A category listing page and the label stamped on its articles.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    pub category: String,
}

/// LLM endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    /// Wall-clock budget per call, in seconds.
    pub call_timeout_secs: u64,
    /// Title substring selecting the digest (multi-event summary) prompt.
    pub digest_marker: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            call_timeout_secs: 60,
            digest_marker: "Bi-Weekly Report".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Retry schedule in config form; converted to a [`RetryPolicy`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

fn default_llm_retry() -> RetrySettings {
    RetrySettings {
        max_retries: 3,
        base_delay_ms: 2000,
        max_delay_ms: 30_000,
    }
}

fn default_recency_days() -> i64 {
    3
}

fn default_archive_keep() -> usize {
    6
}

/// Top-level run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Exchange display name used in prompts and calendar entry names.
    pub exchange: String,
    /// Category listing pages to scrape.
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub fetch_retry: RetrySettings,
    #[serde(default = "default_llm_retry")]
    pub llm_retry: RetrySettings,
    /// Named subscription calendars; defaults to Listing + Delisting.
    #[serde(default)]
    pub calendars: Vec<CalendarRequest>,
    /// Events whose start is older than this many days are not published.
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
    /// Backups kept per stage file.
    #[serde(default = "default_archive_keep")]
    pub archive_keep: usize,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
        let mut config: AppConfig = serde_yaml::from_str(&text)
            .map_err(|e| format!("cannot parse config {}: {e}", path.display()))?;
        config.validate()?;
        if config.calendars.is_empty() {
            config.calendars = default_calendars();
        }
        info!(
            exchange = %config.exchange,
            sources = config.sources.len(),
            calendars = config.calendars.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.exchange.trim().is_empty() {
            return Err("config: exchange must not be empty".into());
        }
        if self.sources.is_empty() {
            return Err("config: at least one source is required".into());
        }
        for source in &self.sources {
            if source.url.trim().is_empty() || source.category.trim().is_empty() {
                return Err("config: every source needs a url and a category".into());
            }
        }
        Ok(())
    }
}

fn default_calendars() -> Vec<CalendarRequest> {
    vec![
        CalendarRequest::for_event_type("Listing"),
        CalendarRequest::for_event_type("Delisting"),
    ]
}
