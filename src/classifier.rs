//! Relevance classification against the exchange lexicons.
//!
//! The walk is strict and ordered: exclusions, then exchange vocabulary, then
//! listed companies. The first lexicon that matches decides, and the matched
//! term becomes the verdict's reason.

use crate::lexicon::{Haystack, Lexicons};
use crate::models::{MatchReason, Relevance};

/// Decides whether a title and its context concern the exchange.
#[derive(Debug, Clone)]
pub struct RelevanceClassifier {
    lexicons: Lexicons,
}

impl RelevanceClassifier {
    pub fn new(lexicons: Lexicons) -> Self {
        Self { lexicons }
    }

    pub fn classify(&self, title: &str, context: &str) -> Relevance {
        self.classify_haystack(&Haystack::from_parts(title, context))
    }

    pub fn classify_haystack(&self, haystack: &Haystack) -> Relevance {
        let reason = if let Some(term) = self.lexicons.exclusions.first_match(haystack) {
            MatchReason::Excluded(term.to_string())
        } else if let Some(term) = self.lexicons.direct.first_match(haystack) {
            MatchReason::Direct(term.to_string())
        } else if let Some(term) = self.lexicons.entities.first_match(haystack) {
            MatchReason::Entity(term.to_string())
        } else {
            MatchReason::NoMatch
        };
        reason.into()
    }
}
