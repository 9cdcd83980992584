//! Announcement-page fetching.
//!
//! This module owns the HTTP side of scraping: a retrying fetch helper
//! shared by the listing and detail passes, and the polite randomized
//! delay that separates consecutive requests to the same host.
//!
//! Parsing lives in per-exchange submodules ([`gateio`]); parsers are pure
//! functions over HTML text so they are testable without a network.

pub mod gateio;

use crate::retry::RetryPolicy;
use rand::{Rng, rng};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Failure categories for a page fetch.
#[derive(Debug)]
pub enum FetchError {
    /// Non-success HTTP status.
    Status(u16),
    /// Connection, DNS, or timeout failure before a status was received.
    Network(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "HTTP {code}"),
            FetchError::Network(message) => write!(f, "network error: {message}"),
        }
    }
}

impl FetchError {
    /// Server overload and connection problems are retryable; a 404 will
    /// not become a 200 by asking again.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

/// Run a fallible operation under the retry policy.
///
/// Transient failures back off and retry up to the policy's attempt
/// budget; terminal failures and exhaustion both degrade to `None` so a
/// single bad page never aborts the batch.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    for attempt in 1..=policy.max_retries {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) if !e.is_transient() => {
                error!(attempt, error = %e, "Fetch failed terminally");
                return None;
            }
            Err(e) => {
                if attempt == policy.max_retries {
                    error!(
                        attempt,
                        max = policy.max_retries,
                        error = %e,
                        "Fetch exhausted retries"
                    );
                    return None;
                }
                let delay = policy.jittered_delay(attempt);
                warn!(attempt, max = policy.max_retries, ?delay, error = %e, "Fetch failed; backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
    None
}

/// Fetch a page body as text, retrying transient failures.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_html(
    client: &reqwest::Client,
    url: &str,
    policy: &RetryPolicy,
) -> Option<String> {
    with_retry(policy, || async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    })
    .await
}

/// Sleep 1.0–1.75 s between requests to the same host.
pub async fn polite_delay() {
    let millis: u64 = rng().random_range(1000..=1750);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
