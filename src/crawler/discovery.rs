//! Link discovery over paginated search results
//!
//! Page 0 of the search tells us how many results exist; every search page is
//! then fetched concurrently and the detail links on it are pushed onto the
//! work queue. Discovery never fails a run: an unreadable count degrades to one
//! page, and a search page that keeps failing is skipped.

use crate::config::SourceConfig;
use crate::crawler::fetcher::{FetchResult, PageFetcher};
use crate::crawler::queue::LinkQueue;
use crate::crawler::retry::{RetryDecision, RetryPolicy, RetryState, Sleeper};
use crate::{ConfigError, HarvestError};
use futures::future::join_all;
use scraper::{Html, Selector};
use url::Url;

/// How the search site paginates and marks up its results
#[derive(Debug, Clone)]
pub struct SearchLayout {
    search_url: Url,
    origin: Url,
    page_size: u32,
    card_selector: Selector,
    total_count_selector: Selector,
}

fn parse_selector(selector: &str) -> Result<Selector, HarvestError> {
    Selector::parse(selector).map_err(|e| {
        HarvestError::Config(ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
    })
}

impl SearchLayout {
    pub fn from_config(source: &SourceConfig) -> Result<Self, HarvestError> {
        let search_url = Url::parse(&source.search_url)?;
        let origin = match &source.site_origin {
            Some(origin) => Url::parse(origin)?,
            None => Url::parse(&search_url.origin().ascii_serialization())?,
        };

        Ok(Self {
            search_url,
            origin,
            page_size: source.page_size.max(1),
            card_selector: parse_selector(&source.card_selector)?,
            total_count_selector: parse_selector(&source.total_count_selector)?,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// URL of a 0-indexed search page
    ///
    /// Any `page` parameter already on the search URL is replaced; the other
    /// query parameters are kept in order.
    pub fn page_url(&self, page: u32) -> String {
        let mut url = self.search_url.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "page")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("page", &page.to_string());

        url.to_string()
    }

    /// Reads the displayed total result count from a search page
    pub fn parse_total_results(&self, html: &str) -> Option<u64> {
        let document = Html::parse_document(html);
        let element = document.select(&self.total_count_selector).next()?;
        let digits: String = element
            .text()
            .flat_map(|t| t.chars())
            .filter(|c| c.is_ascii_digit())
            .collect();

        digits.parse().ok()
    }

    /// Collects absolute detail-page URLs from the result cards on a search page
    pub fn extract_card_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut links = Vec::new();

        for card in document.select(&self.card_selector) {
            let Some(href) = card.value().attr("href") else {
                continue;
            };
            match self.origin.join(href.trim()) {
                Ok(url) => links.push(url.to_string()),
                Err(e) => tracing::debug!("Skipping card link {}: {}", href, e),
            }
        }

        links
    }
}

/// Number of search pages needed to show `total` results
///
/// Saturates at `u32::MAX` for absurd counts.
pub fn total_pages_for(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total / page_size + u64::from(total % page_size != 0);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Fetches search page 0 and works out how many pages the search spans
///
/// Returns 1 when the page cannot be fetched or shows no readable count.
pub async fn discover_total_pages(fetcher: &dyn PageFetcher, layout: &SearchLayout) -> u32 {
    let url = layout.page_url(0);

    let body = match fetcher.fetch(&url).await {
        FetchResult::Success { body } => body,
        failure => {
            tracing::warn!(
                "Could not fetch {} to count results ({}), assuming a single page",
                url,
                failure
            );
            return 1;
        }
    };

    match layout.parse_total_results(&body) {
        Some(total) => {
            let pages = total_pages_for(total, layout.page_size());
            tracing::info!("Found {} results across {} pages", total, pages);
            pages
        }
        None => {
            tracing::warn!("No result count on {}, assuming a single page", url);
            1
        }
    }
}

/// Collects the detail links on one search page into the queue
///
/// Failed fetches are retried according to `policy`.
///
/// # Returns
///
/// * `Some(n)` - The page was read and `n` links were queued
/// * `None` - The page was given up on
pub async fn discover_page_links(
    page: u32,
    fetcher: &dyn PageFetcher,
    sleeper: &dyn Sleeper,
    queue: &LinkQueue,
    layout: &SearchLayout,
    policy: RetryPolicy,
) -> Option<usize> {
    let url = layout.page_url(page);
    let mut retry = RetryState::new(policy);

    loop {
        let failure = match fetcher.fetch(&url).await {
            FetchResult::Success { body } => {
                let links = layout.extract_card_links(&body);
                let count = links.len();
                queue.extend(links);
                tracing::debug!("Queued {} links from search page {}", count, page);
                return Some(count);
            }
            failure => failure,
        };

        match retry.record(failure.class(), 0.0) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    "Retry needed for search page {} ({}), waiting {:?}",
                    page,
                    failure,
                    delay
                );
                sleeper.sleep(delay).await;
            }
            _ => {
                tracing::warn!(
                    "Giving up on search page {} after {} attempts ({})",
                    page,
                    retry.attempts(),
                    failure
                );
                return None;
            }
        }
    }
}

/// Totals from one discovery pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub pages_scanned: u64,
    pub pages_failed: u64,
    pub links_queued: u64,
}

/// Runs discovery for pages `0..pages` concurrently and waits for all of them
pub async fn discover_all(
    pages: u32,
    fetcher: &dyn PageFetcher,
    sleeper: &dyn Sleeper,
    queue: &LinkQueue,
    layout: &SearchLayout,
    policy: RetryPolicy,
) -> DiscoverySummary {
    let tasks = (0..pages)
        .map(|page| discover_page_links(page, fetcher, sleeper, queue, layout, policy));

    let mut summary = DiscoverySummary::default();
    for outcome in join_all(tasks).await {
        match outcome {
            Some(count) => {
                summary.pages_scanned += 1;
                summary.links_queued += count as u64;
            }
            None => summary.pages_failed += 1,
        }
    }

    summary
}
