//! Importance tiers for relevant articles.

use crate::lexicon::{Haystack, Lexicons};
use crate::models::{ClassifiedArticle, Importance, ImportanceTier};

/// Assigns exactly one tier per article: high if a major corporate action
/// keyword matches, medium if a financial performance keyword matches,
/// standard otherwise.
#[derive(Debug, Clone)]
pub struct ImportanceRanker {
    lexicons: Lexicons,
}

impl ImportanceRanker {
    pub fn new(lexicons: Lexicons) -> Self {
        Self { lexicons }
    }

    pub fn score(&self, title: &str, context: &str) -> Importance {
        self.score_haystack(&Haystack::from_parts(title, context))
    }

    pub fn score_haystack(&self, haystack: &Haystack) -> Importance {
        if let Some(keyword) = self.lexicons.high.first_match(haystack) {
            return Importance {
                tier: ImportanceTier::High,
                keyword: Some(keyword.to_string()),
            };
        }
        if let Some(keyword) = self.lexicons.medium.first_match(haystack) {
            return Importance {
                tier: ImportanceTier::Medium,
                keyword: Some(keyword.to_string()),
            };
        }
        Importance {
            tier: ImportanceTier::Standard,
            keyword: None,
        }
    }
}

/// Order articles by tier, highest first, keeping discovery order within a tier.
pub fn rank(articles: &mut [ClassifiedArticle]) {
    // sort_by is stable
    articles.sort_by(|a, b| b.importance.tier.cmp(&a.importance.tier));
}
