//! # coincal
//!
//! A pipeline that scrapes cryptocurrency-exchange announcement pages,
//! extracts structured events from the articles through an LLM, and
//! publishes the results as ICS calendar subscriptions.
//!
//! ## Architecture
//!
//! The application runs sequential batch passes over a chain of stage
//! files, each pass idempotent against its file:
//! 1. **Collect**: scrape category listing pages, append unseen article
//!    links to the collection table
//! 2. **Fill**: fetch detail pages for records missing a body or publish
//!    time, committing both fields or neither
//! 3. **Extract**: run eligible articles through the LLM extraction
//!    protocol and assign UIDs to the new events
//! 4. **Publish**: rebuild the filtered ICS subscription calendars
//! 5. **Archive**: snapshot the stage files into bounded-size archives
//!
//! Per-record failures are contained at the record level; only missing
//! configuration or whole-file I/O aborts a run.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=sk-... coincal -d ./data -c ./coincal.yaml
//! ```

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod calendar;
mod cli;
mod collect;
mod config;
mod extract;
mod fill;
mod models;
mod outputs;
mod retry;
mod scrapers;
mod store;
mod text;
mod uid;
mod utils;

use api::{ChatClient, RetryAsk};
use cli::Cli;
use config::AppConfig;
use extract::ExtractionMode;
use store::DataLayout;
use store::archive::archive_file;
use store::collection::CollectionStore;
use store::events::EventsStore;
use utils::archive_stamp;

/// Browser-like user agent; the announcement pages refuse the default
/// library UA.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("coincal starting up");

    let args = Cli::parse();

    // --- Configuration (fatal before any stage runs) ---
    let app_config = AppConfig::load(Path::new(&args.config))?;
    let Some(api_key) = args.api_key.clone().filter(|k| !k.is_empty()) else {
        error!("No API key configured; set OPENAI_API_KEY or pass --api-key");
        return Err("missing API key".into());
    };

    let layout = DataLayout::new(Path::new(&args.data_dir));
    layout.ensure().await?;

    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let fetch_policy = app_config.fetch_retry.to_policy();
    let llm_policy = app_config.llm_retry.to_policy();

    // ---- Collect ----
    let mut collection = CollectionStore::load(&layout.collection_file())?;
    info!(known = collection.len(), "Loaded collection table");
    let inserted = collect::collect_articles(
        &http,
        &fetch_policy,
        &app_config.sources,
        &app_config.exchange,
        &mut collection,
        Utc::now(),
    )
    .await?;

    // ---- Fill ----
    let filled = fill::fill_bodies(&http, &fetch_policy, &mut collection).await?;

    // ---- Extract ----
    let chat = ChatClient::new(
        app_config.llm.api_base.as_str(),
        api_key,
        app_config.llm.model.as_str(),
        app_config.llm.call_timeout(),
    )?;
    let ask = RetryAsk::new(chat, llm_policy);
    let mode = if args.facet_extraction {
        ExtractionMode::Facets
    } else {
        ExtractionMode::Full
    };
    let mut events = EventsStore::load(&layout.events_file())?;
    info!(known = events.len(), "Loaded events file");
    let extracted = extract::extract_events(
        &ask,
        &mut collection,
        &mut events,
        &app_config.llm.digest_marker,
        mode,
    )
    .await?;

    // ---- Publish calendars ----
    let written = outputs::ics::publish_calendars(
        events.results(),
        &app_config.calendars,
        app_config.recency_days,
        Utc::now(),
        &layout.subscribe_dir,
        &app_config.exchange,
    )
    .await?;

    // ---- Archive ----
    let stamp = archive_stamp(Utc::now());
    if let Err(e) = archive_file(
        &layout.collection_file(),
        &layout.article_archive_dir,
        &stamp,
        app_config.archive_keep,
    ) {
        warn!(error = %e, "Failed to archive collection table");
    }
    if let Err(e) = archive_file(
        &layout.events_file(),
        &layout.events_archive_dir,
        &stamp,
        app_config.archive_keep,
    ) {
        warn!(error = %e, "Failed to archive events file");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        inserted,
        filled,
        extracted,
        calendars = written.len(),
        "Run complete"
    );

    Ok(())
}
