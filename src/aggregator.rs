//! Entity grouping ahead of narrative generation.
//!
//! Articles are grouped by the first listed company they mention, using the
//! same entity lexicon as the classifier. Groups of two or more are passed to
//! the generator with an instruction to write one consolidated statement;
//! this module never rewrites any text itself.

use crate::lexicon::{Haystack, Lexicon};
use crate::models::{ClassifiedArticle, EntityGroup};
use tracing::debug;

/// Detect the entity groups of a ranked article list.
///
/// Groups come out in order of first appearance in the list, and member
/// indexes are positions in that list. Articles mentioning no entity belong to
/// no group.
pub fn group_by_entity(articles: &[ClassifiedArticle], entities: &Lexicon) -> Vec<EntityGroup> {
    let mut groups: Vec<EntityGroup> = Vec::new();
    for (index, article) in articles.iter().enumerate() {
        let haystack =
            Haystack::from_parts(&article.candidate.title, &article.candidate.raw_context_text);
        let Some(entity) = entities.first_match(&haystack) else {
            continue;
        };
        match groups.iter_mut().find(|g| g.entity == entity) {
            Some(group) => group.members.push(index),
            None => groups.push(EntityGroup {
                entity: entity.to_string(),
                members: vec![index],
            }),
        }
    }
    debug!(
        groups = groups.len(),
        mergeable = groups.iter().filter(|g| g.is_mergeable()).count(),
        "Grouped articles by entity"
    );
    groups
}

/// Only the groups that call for a merged statement.
pub fn merge_groups(groups: &[EntityGroup]) -> Vec<&EntityGroup> {
    groups.iter().filter(|g| g.is_mergeable()).collect()
}
