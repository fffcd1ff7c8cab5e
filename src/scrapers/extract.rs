//! Candidate extraction from listing page HTML.
//!
//! The primary pass walks the source's card containers and takes the first
//! heading anchor inside each one; the card's whole text becomes the context
//! that the date matcher reads. When no card selector yields anything, the
//! fallback anchor selectors are tried over the whole document, using the
//! text around the anchor as context. The first selector that produces at
//! least one candidate wins.

use crate::config::SourceConfig;
use crate::models::CandidateArticle;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

/// Title anchors looked up inside a card, most specific first.
static CARD_TITLE_ANCHORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h3 a[href]", "h2 a[href]", "h4 a[href]", "h1 a[href]", "a[href]"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});

/// Filters applied to extracted titles.
#[derive(Debug, Clone)]
pub struct ExtractRules<'a> {
    pub min_title_chars: usize,
    pub loading_markers: &'a [String],
}

impl ExtractRules<'_> {
    /// Placeholder or loading elements are not real articles.
    fn is_placeholder(&self, title: &str) -> bool {
        if title.chars().count() < self.min_title_chars {
            return true;
        }
        let lowered = title.to_lowercase();
        self.loading_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn anchor_title(anchor: &ElementRef) -> String {
    let text = element_text(anchor);
    if text.trim().is_empty() {
        anchor.value().attr("title").unwrap_or_default().to_string()
    } else {
        text
    }
}

/// Resolve an href against the source origin; only http(s) links are kept.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn parse_selector(source_id: &str, raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!(source = source_id, selector = raw, error = %e, "Ignoring invalid selector");
            None
        }
    }
}

fn candidate_from_anchor(
    anchor: &ElementRef,
    context: &str,
    base: &Url,
    source: &SourceConfig,
    rules: &ExtractRules,
) -> Option<CandidateArticle> {
    let title = anchor_title(anchor);
    if rules.is_placeholder(title.trim()) {
        debug!(source = %source.id, title = %title.trim(), "Skipping placeholder element");
        return None;
    }
    let link = resolve_link(base, anchor.value().attr("href")?)?;
    CandidateArticle::new(&title, &link, context, &source.id)
}

fn from_cards(
    document: &Html,
    selector: &Selector,
    base: &Url,
    source: &SourceConfig,
    rules: &ExtractRules,
) -> Vec<CandidateArticle> {
    document
        .select(selector)
        .filter_map(|card| {
            let anchor = CARD_TITLE_ANCHORS
                .iter()
                .find_map(|s| card.select(s).next())?;
            candidate_from_anchor(&anchor, &element_text(&card), base, source, rules)
        })
        .collect()
}

/// Text of the anchor's surroundings: the heading's container when there is one.
fn surrounding_text(anchor: &ElementRef) -> String {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .nth(1)
        .map(|container| element_text(&container))
        .unwrap_or_else(|| element_text(anchor))
}

fn from_anchors(
    document: &Html,
    selector: &Selector,
    base: &Url,
    source: &SourceConfig,
    rules: &ExtractRules,
) -> Vec<CandidateArticle> {
    document
        .select(selector)
        .filter_map(|anchor| {
            candidate_from_anchor(&anchor, &surrounding_text(&anchor), base, source, rules)
        })
        .collect()
}

/// Extract the candidates of one listing page, deduplicated by link.
///
/// Card selectors are tried in order and the first one that yields a
/// candidate wins. Fallback anchor selectors are only tried when no card
/// selector matched anything.
///
/// # Arguments
///
/// * `html` - The raw page body.
/// * `source` - Supplies the selectors and the origin that relative links
///   are resolved against.
/// * `rules` - Minimum title length and the placeholder markers to reject.
///
/// # Returns
///
/// The candidates in page order, or an empty list when the base URL is not
/// absolute or no selector matched.
///
/// # Examples
///
/// ```ignore
/// let found = extract_candidates(&html, &settings.sources[0], &rules);
/// assert!(found.iter().all(|c| c.link.starts_with("https://")));
/// ```
pub fn extract_candidates(
    html: &str,
    source: &SourceConfig,
    rules: &ExtractRules,
) -> Vec<CandidateArticle> {
    let Ok(base) = Url::parse(&source.base_url) else {
        warn!(source = %source.id, base_url = %source.base_url, "Source base URL is not absolute");
        return Vec::new();
    };
    let document = Html::parse_document(html);

    for raw in &source.card_selectors {
        let Some(selector) = parse_selector(&source.id, raw) else {
            continue;
        };
        let found = from_cards(&document, &selector, &base, source, rules);
        if !found.is_empty() {
            debug!(source = %source.id, selector = %raw, count = found.len(), "Extracted from cards");
            return found.into_iter().unique_by(|c| c.link.clone()).collect();
        }
    }

    for raw in &source.fallback_selectors {
        let Some(selector) = parse_selector(&source.id, raw) else {
            continue;
        };
        let found = from_anchors(&document, &selector, &base, source, rules);
        if !found.is_empty() {
            debug!(source = %source.id, selector = %raw, count = found.len(), "Extracted with fallback selector");
            return found.into_iter().unique_by(|c| c.link.clone()).collect();
        }
    }

    debug!(source = %source.id, "No usable markup on page");
    Vec::new()
}
