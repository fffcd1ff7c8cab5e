//! Data models for one pipeline run.
//!
//! Everything here lives for a single run and is dropped afterwards:
//! - [`CandidateArticle`]: a title/link pair extracted from a listing page
//! - [`ClassifiedArticle`]: a candidate with its relevance verdict and importance
//! - [`EntityGroup`]: articles that talk about the same company or topic
//! - [`Digest`]: the final text handed to the delivery sink
//! - [`RunReport`]: what happened during the run, for logs and the JSON report

use serde::{Deserialize, Serialize};
use std::fmt;

/// A title and resolved link extracted from a source listing page.
///
/// Construction goes through [`CandidateArticle::new`], which refuses records
/// with an empty title or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArticle {
    pub title: String,
    /// Absolute URL of the article.
    pub link: String,
    /// Text surrounding the title on the listing page (usually holds the date).
    pub raw_context_text: String,
    /// Identifier of the source that produced the candidate.
    pub source_id: String,
}

impl CandidateArticle {
    pub fn new(
        title: &str,
        link: &str,
        raw_context_text: &str,
        source_id: &str,
    ) -> Option<Self> {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        let link = link.trim();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        Some(Self {
            title,
            link: link.to_string(),
            raw_context_text: raw_context_text.split_whitespace().collect::<Vec<_>>().join(" "),
            source_id: source_id.to_string(),
        })
    }
}

/// Why the relevance classifier decided the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "term", rename_all = "snake_case")]
pub enum MatchReason {
    /// An exclusion term matched; exclusions win over everything else.
    Excluded(String),
    /// An exchange-specific term matched.
    Direct(String),
    /// A listed company or alias matched.
    Entity(String),
    /// Nothing matched.
    NoMatch,
}

impl MatchReason {
    pub fn is_relevant(&self) -> bool {
        matches!(self, MatchReason::Direct(_) | MatchReason::Entity(_))
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchReason::Excluded(term) => write!(f, "excluded: {term}"),
            MatchReason::Direct(term) => write!(f, "direct: {term}"),
            MatchReason::Entity(term) => write!(f, "entity: {term}"),
            MatchReason::NoMatch => write!(f, "no direct relevance"),
        }
    }
}

/// Relevance verdict; the reason is always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relevance {
    pub is_relevant: bool,
    pub match_reason: MatchReason,
}

impl From<MatchReason> for Relevance {
    fn from(match_reason: MatchReason) -> Self {
        Self {
            is_relevant: match_reason.is_relevant(),
            match_reason,
        }
    }
}

/// Ordinal importance of a relevant article.
///
/// The derived ordering follows declaration order, so `Standard < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceTier {
    Standard,
    Medium,
    High,
}

impl ImportanceTier {
    /// Marker opening the article's block in the digest.
    pub fn marker(&self) -> &'static str {
        match self {
            ImportanceTier::High => "🔴",
            ImportanceTier::Medium => "🟠",
            ImportanceTier::Standard => "🔵",
        }
    }
}

/// Importance tier plus the keyword that put the article there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Importance {
    pub tier: ImportanceTier,
    /// Matched keyword, or `None` for the default standard tier.
    pub keyword: Option<String>,
}

/// A candidate enriched with its relevance verdict and importance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedArticle {
    #[serde(flatten)]
    pub candidate: CandidateArticle,
    /// Display label of the originating source.
    pub source_label: String,
    pub relevance: Relevance,
    pub importance: Importance,
}

/// Articles sharing a detected entity, by position in the ranked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGroup {
    pub entity: String,
    pub members: Vec<usize>,
}

impl EntityGroup {
    /// Only groups with at least two articles call for a merged statement.
    pub fn is_mergeable(&self) -> bool {
        self.members.len() >= 2
    }
}

/// How the digest text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestKind {
    /// No relevant article; the fixed sentinel was produced.
    Empty,
    /// Built from the generator's narrative.
    Narrative,
    /// Built by the deterministic fallback template.
    Fallback,
}

/// Final delivery text. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    text: String,
    kind: DigestKind,
}

impl Digest {
    pub fn new(text: String, kind: DigestKind) -> Self {
        Self { text, kind }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> DigestKind {
        self.kind
    }
}

/// Output language of the digest and the generator prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    En,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Fr => f.write_str("fr"),
            Language::En => f.write_str("en"),
        }
    }
}

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Fetching,
    Classifying,
    Ranking,
    Aggregating,
    Formatting,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Fetching => "fetching",
            RunStage::Classifying => "classifying",
            RunStage::Ranking => "ranking",
            RunStage::Aggregating => "aggregating",
            RunStage::Formatting => "formatting",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A stage entered during the run; `degraded` is set when the previous stage
/// handed over partial results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: RunStage,
    pub degraded: bool,
}

/// What happened to one source during the sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub pages_visited: usize,
    pub candidates: usize,
    /// Pages that failed and were skipped, with the error text.
    pub page_errors: Vec<String>,
    /// Set when the whole source was abandoned.
    pub skipped_reason: Option<String>,
}

impl SourceOutcome {
    pub fn is_degraded(&self) -> bool {
        self.skipped_reason.is_some() || !self.page_errors.is_empty()
    }
}

/// Summary of one run, logged at the end and optionally written as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub date: String,
    pub language: Language,
    pub date_patterns: usize,
    pub sources: Vec<SourceOutcome>,
    pub stages: Vec<StageTransition>,
    pub candidates: usize,
    pub date_matches: usize,
    pub relevant: usize,
    pub articles: Vec<ClassifiedArticle>,
    pub groups: Vec<EntityGroup>,
    pub generator_degraded: bool,
    pub digest_kind: Option<DigestKind>,
}

impl RunReport {
    pub fn enter(&mut self, stage: RunStage, degraded: bool) {
        tracing::info!(%stage, degraded, "Entering stage");
        self.stages.push(StageTransition { stage, degraded });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_requires_title_and_link() {
        assert!(CandidateArticle::new("  ", "https://x.ma/a", "", "src").is_none());
        assert!(CandidateArticle::new("Titre", "", "", "src").is_none());
        let c = CandidateArticle::new("  Un   titre\n", " https://x.ma/a ", "ctx", "src").unwrap();
        assert_eq!(c.title, "Un titre");
        assert_eq!(c.link, "https://x.ma/a");
    }

    #[test]
    fn test_tier_ordering() {
        assert!(ImportanceTier::High > ImportanceTier::Medium);
        assert!(ImportanceTier::Medium > ImportanceTier::Standard);
    }

    #[test]
    fn test_match_reason_display_never_empty() {
        let reasons = [
            MatchReason::Excluded("nasdaq".into()),
            MatchReason::Direct("masi".into()),
            MatchReason::Entity("ocp".into()),
            MatchReason::NoMatch,
        ];
        for reason in reasons {
            assert!(!reason.to_string().is_empty());
        }
        assert_eq!(MatchReason::NoMatch.to_string(), "no direct relevance");
    }

    #[test]
    fn test_relevance_from_reason() {
        assert!(Relevance::from(MatchReason::Entity("ocp".into())).is_relevant);
        assert!(!Relevance::from(MatchReason::Excluded("fmi".into())).is_relevant);
        assert!(!Relevance::from(MatchReason::NoMatch).is_relevant);
    }

    #[test]
    fn test_classified_article_serialization() {
        let article = ClassifiedArticle {
            candidate: CandidateArticle::new("OCP lève 2 MMDH", "https://x.ma/ocp", "", "boursenews")
                .unwrap(),
            source_label: "BourseNews".to_string(),
            relevance: MatchReason::Entity("ocp".into()).into(),
            importance: Importance {
                tier: ImportanceTier::High,
                keyword: Some("levée de fonds".into()),
            },
        };
        let json = serde_json::to_string(&article).unwrap();
        assert!(json.contains("\"title\":\"OCP lève 2 MMDH\""));
        assert!(json.contains("\"kind\":\"entity\""));
        assert!(json.contains("\"tier\":\"high\""));
    }

    #[test]
    fn test_entity_group_mergeable() {
        let single = EntityGroup {
            entity: "ocp".into(),
            members: vec![0],
        };
        let pair = EntityGroup {
            entity: "ocp".into(),
            members: vec![0, 2],
        };
        assert!(!single.is_mergeable());
        assert!(pair.is_mergeable());
    }
}
