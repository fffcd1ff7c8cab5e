//! Source adapters: fetch listing pages and turn them into candidate articles.
//!
//! Each configured source is swept page by page, one request at a time:
//!
//! 1. **Fetching**: [`fetch::PageFetcher`] retrieves the page with the
//!    source's strategy (direct or through the render proxy)
//! 2. **Extraction**: [`extract::extract_candidates`] reads titles, links and
//!    surrounding text, trying fallback selectors when the markup changed
//!
//! Pagination for a source stops at the first page that brings no new
//! candidate, or after `max_pages` pages. Failures never leave this module:
//! a denied source is abandoned, a failed page is skipped, and the sweep
//! moves on to the next source.
//!
//! # Built-in Sources
//!
//! | Source | Strategy | Notes |
//! |--------|----------|-------|
//! | BourseNews | plain | `div.item-content` cards with an `h3` title |
//! | Médias24 - Le Boursier | hardened | Rendered client-side; 3 s delay before scraping |
//! | L'Economiste | plain | WordPress listing, fallback selectors do most of the work |

pub mod extract;
pub mod fetch;

use crate::config::{Settings, SourceConfig};
use crate::dates::DateWindow;
use crate::error::FetchError;
use crate::models::{CandidateArticle, SourceOutcome};
use extract::{ExtractRules, extract_candidates};
use fetch::PageFetcher;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Sweeps the configured sources sequentially.
#[derive(Debug)]
pub struct SourceCrawler<'a> {
    fetcher: &'a PageFetcher,
    settings: &'a Settings,
}

impl<'a> SourceCrawler<'a> {
    pub fn new(fetcher: &'a PageFetcher, settings: &'a Settings) -> Self {
        Self { fetcher, settings }
    }

    /// Crawl every source in configuration order.
    ///
    /// Returns all candidates in discovery order plus one outcome per source.
    #[instrument(level = "info", skip_all, fields(sources = self.settings.sources.len()))]
    pub async fn crawl_all(&self, window: &DateWindow) -> (Vec<CandidateArticle>, Vec<SourceOutcome>) {
        let results: Vec<(Vec<CandidateArticle>, SourceOutcome)> =
            stream::iter(self.settings.sources.iter())
                .then(|source| self.crawl_source(source, window))
                .collect()
                .await;

        let mut candidates = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        for (found, outcome) in results {
            candidates.extend(found);
            outcomes.push(outcome);
        }
        info!(count = candidates.len(), "Collected candidates from all sources");
        (candidates, outcomes)
    }

    /// Crawl one source page by page.
    ///
    /// Pagination stops at the first page that yields no new link, after
    /// `max_pages` pages, or, with `stop_on_stale_page`, at the first page
    /// with nothing dated inside the window. An access denial abandons the
    /// rest of the source while any other page failure only skips that page.
    ///
    /// # Arguments
    ///
    /// * `source` - The listing to crawl.
    /// * `window` - Date window used by the stale-page stop. Candidates are
    ///   returned unfiltered; the pipeline applies the window itself.
    ///
    /// # Returns
    ///
    /// The candidates found, deduplicated by link across pages, and the
    /// [`SourceOutcome`] recording pages visited, page errors and any skip reason.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let window = DateWindow::new(today, 2, true);
    /// let (found, outcome) = crawler.crawl_source(&settings.sources[0], &window).await;
    /// assert_eq!(outcome.candidates, found.len());
    /// ```
    #[instrument(level = "info", skip_all, fields(source = %source.id))]
    pub async fn crawl_source(
        &self,
        source: &SourceConfig,
        window: &DateWindow,
    ) -> (Vec<CandidateArticle>, SourceOutcome) {
        let mut outcome = SourceOutcome {
            source_id: source.id.clone(),
            ..SourceOutcome::default()
        };
        let mut candidates = Vec::new();

        if !self.fetcher.supports(source.strategy) {
            let reason = FetchError::StrategyUnavailable.to_string();
            warn!(reason = %reason, "Skipping source");
            outcome.skipped_reason = Some(reason);
            return (candidates, outcome);
        }

        if source.render_delay_secs > 0 {
            debug!(delay_secs = source.render_delay_secs, "Waiting for dynamic content");
            sleep(Duration::from_secs(source.render_delay_secs)).await;
        }

        let rules = ExtractRules {
            min_title_chars: self.settings.min_title_chars,
            loading_markers: &self.settings.loading_markers,
        };
        let mut seen: HashSet<String> = HashSet::new();
        let last_page = source.first_page.saturating_add(self.settings.max_pages);

        for page in source.first_page..last_page {
            let url = match source.page_url(page) {
                Ok(url) => url,
                Err(e) => {
                    let reason = FetchError::InvalidUrl(e.to_string()).to_string();
                    warn!(page, reason = %reason, "Skipping source");
                    outcome.skipped_reason = Some(reason);
                    break;
                }
            };

            outcome.pages_visited += 1;
            let html = match self.fetcher.fetch(&url, source.strategy).await {
                Ok(html) => html,
                Err(e) if e.abandons_source() => {
                    warn!(page, %url, error = %e, "Source refused access; skipping remaining pages");
                    outcome.skipped_reason = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    warn!(page, %url, error = %e, "Page fetch failed; skipping page");
                    outcome.page_errors.push(format!("page {page}: {e}"));
                    continue;
                }
            };

            let fresh: Vec<CandidateArticle> = extract_candidates(&html, source, &rules)
                .into_iter()
                .filter(|c| seen.insert(c.link.clone()))
                .collect();

            if fresh.is_empty() {
                info!(page, "No new candidates; stopping pagination");
                break;
            }

            let in_window = fresh
                .iter()
                .filter(|c| window.matches(&c.raw_context_text))
                .count();
            debug!(page, count = fresh.len(), in_window, "Extracted page candidates");
            candidates.extend(fresh);

            if self.settings.stop_on_stale_page && in_window == 0 {
                info!(page, "No candidate in the date window; stopping pagination");
                break;
            }
        }

        outcome.candidates = candidates.len();
        info!(
            pages = outcome.pages_visited,
            count = outcome.candidates,
            "Finished source"
        );
        (candidates, outcome)
    }
}
