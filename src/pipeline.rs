//! One digest run, from source sweep to formatted text.
//!
//! The run walks `fetching → classifying → ranking → aggregating →
//! formatting → done`. A stage that received partial results from the
//! previous one (a source skipped, the generator down) is entered as
//! degraded, but every stage is always reached. A panic anywhere in the run
//! is caught by [`Pipeline::run_guarded`] and becomes a [`RunAborted`] for
//! the caller to report.

use crate::aggregator::group_by_entity;
use crate::classifier::RelevanceClassifier;
use crate::config::Settings;
use crate::dates::DateWindow;
use crate::digest::DigestFormatter;
use crate::error::{FetchError, RunAborted};
use crate::generator::{NarrativeGenerator, build_prompt};
use crate::lexicon::Haystack;
use crate::models::{
    CandidateArticle, ClassifiedArticle, Digest, EntityGroup, RunReport, RunStage,
};
use crate::ranker::{ImportanceRanker, rank};
use crate::scrapers::SourceCrawler;
use crate::scrapers::fetch::PageFetcher;
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use futures::FutureExt;
use itertools::Itertools;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Everything a run needs apart from the generator.
#[derive(Debug)]
pub struct Pipeline<'a> {
    settings: &'a Settings,
    fetcher: PageFetcher,
    classifier: RelevanceClassifier,
    ranker: ImportanceRanker,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings) -> Result<Self, FetchError> {
        let fetcher = PageFetcher::new(
            Duration::from_secs(settings.request_timeout_secs),
            settings.render_proxy.clone(),
        )?;
        Ok(Self {
            settings,
            fetcher,
            classifier: RelevanceClassifier::new(settings.lexicons.clone()),
            ranker: ImportanceRanker::new(settings.lexicons.clone()),
        })
    }

    fn source_label(&self, source_id: &str) -> String {
        self.settings
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| source_id.to_string())
    }

    /// Keep candidates that are in the date window and relevant, in discovery order.
    fn classify(
        &self,
        candidates: Vec<CandidateArticle>,
        window: &DateWindow,
        report: &mut RunReport,
    ) -> Vec<ClassifiedArticle> {
        let mut kept = Vec::new();
        for candidate in candidates
            .into_iter()
            .unique_by(|c| c.link.clone())
            .unique_by(|c| c.title.to_lowercase())
        {
            let Some(date) = window.find_in(&candidate.raw_context_text) else {
                debug!(title = %candidate.title, "Outside the date window");
                continue;
            };
            report.date_matches += 1;

            let haystack = Haystack::from_parts(&candidate.title, &candidate.raw_context_text);
            let relevance = self.classifier.classify_haystack(&haystack);
            debug!(
                title = %candidate.title,
                date,
                relevant = relevance.is_relevant,
                reason = %relevance.match_reason,
                "Classified candidate"
            );
            if !relevance.is_relevant {
                continue;
            }

            let importance = self.ranker.score_haystack(&haystack);
            kept.push(ClassifiedArticle {
                source_label: self.source_label(&candidate.source_id),
                candidate,
                relevance,
                importance,
            });
        }
        report.relevant = kept.len();
        kept
    }

    async fn format<G: NarrativeGenerator>(
        &self,
        articles: &[ClassifiedArticle],
        groups: &[EntityGroup],
        formatter: &DigestFormatter,
        generator: &G,
        report: &mut RunReport,
    ) -> Digest {
        if articles.is_empty() {
            info!("No relevant article; sending the empty-day notice");
            return formatter.empty();
        }

        let prompt = build_prompt(articles, groups, self.settings.language);
        match generator.generate(&prompt).await {
            Ok(raw) => match formatter.from_narrative(&raw, articles, groups) {
                Some(digest) => digest,
                None => {
                    warn!(
                        response_preview = %truncate_for_log(&raw, 300),
                        "Generator output lacks block markers; using fallback template"
                    );
                    report.generator_degraded = true;
                    formatter.fallback(articles)
                }
            },
            Err(e) => {
                warn!(error = %e, "Generator unavailable; using fallback template");
                report.generator_degraded = true;
                formatter.fallback(articles)
            }
        }
    }

    /// Run the whole pipeline for `today`.
    #[instrument(level = "info", skip_all, fields(%today))]
    pub async fn run<G: NarrativeGenerator>(
        &self,
        today: NaiveDate,
        generator: &G,
    ) -> (Digest, RunReport) {
        let settings = self.settings;
        let mut report = RunReport {
            date: today.to_string(),
            language: settings.language,
            ..RunReport::default()
        };

        report.enter(RunStage::Fetching, false);
        let window = DateWindow::new(today, settings.window_days, settings.case_insensitive_dates);
        report.date_patterns = window.patterns().len();
        let crawler = SourceCrawler::new(&self.fetcher, settings);
        let (candidates, outcomes) = crawler.crawl_all(&window).await;
        let fetch_degraded = outcomes.iter().any(|o| o.is_degraded());
        report.candidates = candidates.len();
        report.sources = outcomes;

        report.enter(RunStage::Classifying, fetch_degraded);
        let mut articles = self.classify(candidates, &window, &mut report);
        info!(
            candidates = report.candidates,
            in_window = report.date_matches,
            relevant = report.relevant,
            "Classification complete"
        );

        report.enter(RunStage::Ranking, false);
        rank(&mut articles);

        report.enter(RunStage::Aggregating, false);
        let groups = group_by_entity(&articles, &settings.lexicons.entities);

        report.enter(RunStage::Formatting, false);
        let formatter = DigestFormatter::new(settings.language, today);
        let digest = self
            .format(&articles, &groups, &formatter, generator, &mut report)
            .await;

        report.enter(RunStage::Done, report.generator_degraded);
        report.digest_kind = Some(digest.kind());
        report.articles = articles;
        report.groups = groups;
        (digest, report)
    }

    /// Run the pipeline, turning a panic anywhere inside it into an error.
    pub async fn run_guarded<G: NarrativeGenerator>(
        &self,
        today: NaiveDate,
        generator: &G,
    ) -> Result<(Digest, RunReport), RunAborted> {
        match AssertUnwindSafe(self.run(today, generator)).catch_unwind().await {
            Ok(result) => Ok(result),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "pipeline panicked".to_string());
                error!(reason = %panic_msg, "Run aborted");
                Err(RunAborted(panic_msg))
            }
        }
    }
}
