//! Digest rendering.
//!
//! Three outputs are possible:
//! - the fixed sentinel when no article survived the filters
//! - the narrative digest, built from the generator's text cut into blocks
//! - the fallback digest, a deterministic list used when the generator failed
//!   or answered without any recognizable block
//!
//! The narrative is segmented by [`segment_narrative`], kept separate so the
//! heuristic can be tested and swapped on its own. A block opens on a line
//! starting with an importance marker followed by an emphasized title, or
//! with a bare emphasized title; the following lines are its body.
//!
//! Everything is sent with Telegram's legacy Markdown, which rejects the
//! whole message on one unbalanced `*` or `_`. Generated prose is therefore
//! stripped of emphasis and escaped, titles go through [`markdown_bold`] and
//! link labels through [`plain_label`].

use crate::aggregator::merge_groups;
use crate::models::{ClassifiedArticle, Digest, DigestKind, EntityGroup, ImportanceTier, Language};
use crate::utils::{escape_markdown, markdown_bold, markdown_prose, normalize_paragraph, plain_label};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

static BLOCK_OPENING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(🔴|🟠|🔵)\s*)?\*{1,2}([^*\s][^*\n]*?)\*{1,2}\s*(.*)$").expect("static regex")
});

/// One block of generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeBlock {
    pub marker: Option<String>,
    pub title: String,
    pub body: String,
}

/// Bullet markers the generator puts in front of body lines.
fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    match line.strip_prefix(['*', '-', '•']) {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => line,
    }
}

/// Cut raw generator text into ordered blocks.
///
/// Text before the first block opening is dropped. Bullet markers at the
/// start of body lines are removed.
pub fn segment_narrative(raw: &str) -> Vec<NarrativeBlock> {
    let mut blocks: Vec<NarrativeBlock> = Vec::new();
    for line in raw.lines() {
        if let Some(caps) = BLOCK_OPENING.captures(line) {
            blocks.push(NarrativeBlock {
                marker: caps.get(1).map(|m| m.as_str().to_string()),
                title: caps[2].trim().to_string(),
                body: caps[3].trim().to_string(),
            });
        } else if let Some(current) = blocks.last_mut() {
            let line = strip_bullet(line);
            if !line.is_empty() {
                if !current.body.is_empty() {
                    current.body.push(' ');
                }
                current.body.push_str(line);
            }
        }
    }
    blocks
}

fn tier_label(tier: ImportanceTier, language: Language) -> &'static str {
    match (language, tier) {
        (Language::Fr, ImportanceTier::High) => "Priorité haute",
        (Language::Fr, ImportanceTier::Medium) => "Priorité moyenne",
        (Language::Fr, ImportanceTier::Standard) => "Actualité",
        (Language::En, ImportanceTier::High) => "High priority",
        (Language::En, ImportanceTier::Medium) => "Medium priority",
        (Language::En, ImportanceTier::Standard) => "Market news",
    }
}

/// The text sent when no relevant article was found.
pub fn sentinel(language: Language) -> &'static str {
    match language {
        Language::Fr => "📭 Aucun article pertinent pour aujourd'hui.",
        Language::En => "📭 No relevant market news today.",
    }
}

/// Renders the final digest for one run.
#[derive(Debug, Clone)]
pub struct DigestFormatter {
    language: Language,
    date: NaiveDate,
}

impl DigestFormatter {
    pub fn new(language: Language, date: NaiveDate) -> Self {
        Self { language, date }
    }

    pub fn empty(&self) -> Digest {
        Digest::new(sentinel(self.language).to_string(), DigestKind::Empty)
    }

    fn source_line(&self, article: &ClassifiedArticle) -> String {
        let label = match plain_label(&article.source_label) {
            label if label.is_empty() => "source".to_string(),
            label => label,
        };
        format!("🔗 [{label}]({})", article.candidate.link)
    }

    /// Build the digest from generator text.
    ///
    /// Blocks map to articles by position. When the block count matches the
    /// list with every mergeable group collapsed onto its first member, the
    /// merged block carries the links of the whole group and later blocks keep
    /// their own articles. Extra blocks reuse the last article.
    ///
    /// # Returns
    ///
    /// `None` when the text holds no block at all, or when there is no
    /// article to link to.
    pub fn from_narrative(
        &self,
        raw: &str,
        articles: &[ClassifiedArticle],
        groups: &[EntityGroup],
    ) -> Option<Digest> {
        let last = articles.last()?;
        let blocks = segment_narrative(raw);
        if blocks.is_empty() {
            warn!("Generator output has no recognizable block");
            return None;
        }

        let merged = block_slots(articles.len(), groups);
        let slots = if blocks.len() == merged.len() {
            merged
        } else {
            debug!(
                blocks = blocks.len(),
                articles = articles.len(),
                "Block count differs from article count"
            );
            (0..articles.len()).map(|i| vec![i]).collect()
        };

        let date = self.date.format("%d/%m/%Y");
        let mut text = match self.language {
            Language::Fr => format!("📰 *Résumé des nouvelles boursières du {date}*\n"),
            Language::En => format!("📰 *Casablanca market news for {date}*\n"),
        };

        for (i, block) in blocks.iter().enumerate() {
            let linked: Vec<&ClassifiedArticle> = match slots.get(i) {
                Some(members) => members.iter().filter_map(|&m| articles.get(m)).collect(),
                None => vec![last],
            };
            let lead = linked.first().copied().unwrap_or(last);
            let marker = block
                .marker
                .as_deref()
                .unwrap_or_else(|| lead.importance.tier.marker());
            text.push('\n');
            text.push_str(&format!("{marker} {}\n", markdown_bold(&block.title)));
            let paragraph = normalize_paragraph(&markdown_prose(&block.body));
            if !paragraph.is_empty() {
                text.push_str(&paragraph);
                text.push('\n');
            }
            for article in linked {
                text.push_str(&self.source_line(article));
                text.push('\n');
            }
        }

        Some(Digest::new(text.trim_end().to_string(), DigestKind::Narrative))
    }

    /// Deterministic digest: one block per article, no merging.
    pub fn fallback(&self, articles: &[ClassifiedArticle]) -> Digest {
        if articles.is_empty() {
            return self.empty();
        }
        let date = self.date.format("%d/%m/%Y");
        let count = articles.len();
        let mut text = match self.language {
            Language::Fr => format!(
                "📰 *{count} actualité(s) boursière(s) pertinente(s) du {date}*\n_Résumé automatique indisponible._\n"
            ),
            Language::En => format!(
                "📰 *{count} relevant market news item(s) for {date}*\n_Automatic summary unavailable._\n"
            ),
        };

        for article in articles {
            let tier = article.importance.tier;
            let label = tier_label(tier, self.language);
            text.push('\n');
            text.push_str(&format!(
                "{} {}\n",
                tier.marker(),
                markdown_bold(&article.candidate.title)
            ));
            match &article.importance.keyword {
                Some(keyword) => {
                    text.push_str(&format!("{label} ({})\n", escape_markdown(keyword)))
                }
                None => text.push_str(&format!("{label}\n")),
            }
            text.push_str(&self.source_line(article));
            text.push('\n');
        }

        Digest::new(text.trim_end().to_string(), DigestKind::Fallback)
    }
}

/// Article indexes behind each expected block once mergeable groups are
/// collapsed onto their first member.
fn block_slots(count: usize, groups: &[EntityGroup]) -> Vec<Vec<usize>> {
    let mut absorbed = HashSet::new();
    let mut slots: Vec<Vec<usize>> = (0..count).map(|i| vec![i]).collect();
    for group in merge_groups(groups) {
        let Some((&head, rest)) = group.members.split_first() else {
            continue;
        };
        if head >= count {
            continue;
        }
        for &member in rest.iter().filter(|&&m| m < count) {
            if absorbed.insert(member) {
                slots[head].push(member);
            }
        }
    }
    slots
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !absorbed.contains(i))
        .map(|(_, members)| members)
        .collect()
}
