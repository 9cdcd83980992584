//! Gate.io announcement-page parsers.
//!
//! The announcement center serves one listing page per category plus a
//! detail page per article. Both parsers return `None` when the expected
//! container is absent, which the callers treat as a structural mismatch
//! (logged, skipped), not a hard failure.
//!
//! # Page structure
//!
//! - Listing: `div.article-list-box` holding `div.article-list-item`
//!   entries; each entry links the title through
//!   `a.article-list-item-title` with the heading in an `h3`.
//! - Detail: `div.article-details-box` with the publish time in the first
//!   `span` of `div.article-details-base-info` and the body text under
//!   `div.article-details-main`.

use crate::models::ArticleStub;
use crate::text::{clean_body, clean_title};
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

const BASE_URL: &str = "https://www.gate.io";

/// Parse a category listing page into article stubs.
///
/// Returns `None` when the listing container is missing (layout mismatch
/// or error page); an empty vector means the container was present but
/// held no articles.
#[instrument(level = "debug", skip_all, fields(%category))]
pub fn parse_listing(html: &str, category: &str) -> Option<Vec<ArticleStub>> {
    let document = Html::parse_document(html);
    let list_box_selector = Selector::parse("div.article-list-box").unwrap();
    let item_selector = Selector::parse("div.article-list-item").unwrap();
    let title_link_selector = Selector::parse("a.article-list-item-title").unwrap();
    let heading_selector = Selector::parse("h3").unwrap();

    let list_box = document.select(&list_box_selector).next()?;
    let base = Url::parse(BASE_URL).unwrap();

    let mut stubs = Vec::new();
    for item in list_box.select(&item_selector) {
        let Some(title_link) = item.select(&title_link_selector).next() else {
            continue;
        };
        let Some(href) = title_link.value().attr("href") else {
            continue;
        };
        let Some(heading) = title_link.select(&heading_selector).next() else {
            continue;
        };
        let title = clean_title(&heading.text().collect::<Vec<_>>().join(" "));
        let Ok(link) = base.join(href) else {
            continue;
        };
        stubs.push(ArticleStub {
            link: link.to_string(),
            category: category.to_string(),
            title,
        });
    }
    debug!(count = stubs.len(), "Parsed listing page");
    Some(stubs)
}

/// Parse an article detail page into `(cleaned_body, publish_datetime)`.
///
/// Returns `None` when the details container or the publish-time span is
/// missing. The body is cleaned and `///`-encoded, ready for the
/// collection table.
#[instrument(level = "debug", skip_all)]
pub fn parse_article_detail(html: &str) -> Option<(String, String)> {
    let document = Html::parse_document(html);
    let details_box_selector = Selector::parse("div.article-details-box").unwrap();
    let base_info_selector = Selector::parse("div.article-details-base-info span").unwrap();
    let main_selector = Selector::parse("div.article-details-main").unwrap();

    let details_box = document.select(&details_box_selector).next()?;

    let publish_datetime = details_box
        .select(&base_info_selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();

    let body = details_box
        .select(&main_selector)
        .next()
        .map(|main| {
            main.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    Some((clean_body(&body), publish_datetime))
}
