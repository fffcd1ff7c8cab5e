//! Narrative generation through the Gemini API.
//!
//! The pipeline talks to the generator through the [`NarrativeGenerator`]
//! trait: one prompt in, free-form text out. [`GeminiGenerator`] is the
//! production implementation; tests substitute their own.
//!
//! A failed call is never retried within a run. Any error, including a
//! response without the expected fields, sends the pipeline down the
//! deterministic fallback formatter instead.

use crate::aggregator::merge_groups;
use crate::config::{Credentials, GeneratorSettings};
use crate::error::GeneratorError;
use crate::models::{ClassifiedArticle, EntityGroup, Language};
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde_json::{Value, json};
use std::fmt::{self, Write};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Text-in, text-out narrative service.
pub trait NarrativeGenerator {
    /// Send a prompt and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiGenerator<'a> {
    client: Client,
    settings: &'a GeneratorSettings,
    credentials: &'a Credentials,
}

impl fmt::Debug for GeminiGenerator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("endpoint", &self.settings.endpoint)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl<'a> GeminiGenerator<'a> {
    pub fn new(
        settings: &'a GeneratorSettings,
        credentials: &'a Credentials,
    ) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }
}

/// Pull the generated text out of a `generateContent` response.
pub fn extract_text(payload: &Value) -> Result<String, GeneratorError> {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            GeneratorError::Malformed(format!(
                "no candidates[0].content.parts[0].text in {}",
                truncate_for_log(&payload.to_string(), 300)
            ))
        })?;
    if text.trim().is_empty() {
        return Err(GeneratorError::Malformed("empty generated text".into()));
    }
    Ok(text.to_string())
}

impl NarrativeGenerator for GeminiGenerator<'_> {
    #[instrument(level = "info", skip_all, fields(model = %self.settings.model))]
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let t0 = Instant::now();
        let body = json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.credentials.generator_api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                body = %truncate_for_log(&body, 300),
                "Generator returned an error status"
            );
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GeneratorError::Malformed(e.to_string()))?;
        let text = extract_text(&payload)?;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "Generator answered"
        );
        Ok(text)
    }
}

/// Build the generator prompt for a ranked article list.
///
/// Articles are numbered from 1 in ranked order. Each mergeable entity group
/// adds an instruction naming the entity and the article numbers to combine,
/// and asks for the merged block at the position of the group's first item so
/// the blocks that follow keep their order.
///
/// # Arguments
///
/// * `articles` - Ranked articles, listed to the model in this order.
/// * `groups` - Entity groups over `articles`; only groups with two or more
///   members produce a merge instruction.
/// * `language` - Language of the instructions and of the expected narrative.
///
/// # Returns
///
/// The full prompt text, ending with one numbered line per article.
///
/// # Examples
///
/// ```ignore
/// let groups = group_by_entity(&ranked, &lexicons.entities);
/// let prompt = build_prompt(&ranked, &groups, Language::Fr);
/// assert!(prompt.starts_with("Tu es un analyste"));
/// ```
pub fn build_prompt(
    articles: &[ClassifiedArticle],
    groups: &[EntityGroup],
    language: Language,
) -> String {
    let mut prompt = String::new();
    let merges = merge_groups(groups);

    match language {
        Language::Fr => {
            prompt.push_str(
                "Tu es un analyste de la Bourse de Casablanca. Résume en français les actualités \
                 suivantes pour un investisseur marocain.\n\n",
            );
            prompt.push_str(
                "Format obligatoire, un bloc par actualité, dans l'ordre donné:\n\
                 <marqueur> *Titre court*\n\
                 Deux ou trois phrases factuelles, sans lien ni liste.\n\n\
                 Le marqueur est celui indiqué pour l'actualité (🔴, 🟠 ou 🔵). \
                 N'ajoute ni introduction ni conclusion.\n\n",
            );
            if !merges.is_empty() {
                prompt.push_str("Regroupements obligatoires (un seul bloc par groupe):\n");
                for group in &merges {
                    let _ = writeln!(
                        prompt,
                        "- Actualités {} : même entité « {} », fusionne-les en un seul bloc \
                         placé à la position de l'actualité {}.",
                        numbers(&group.members),
                        group.entity,
                        first_number(&group.members)
                    );
                }
                prompt.push('\n');
            }
            prompt.push_str("Actualités:\n");
        }
        Language::En => {
            prompt.push_str(
                "You are a Casablanca Stock Exchange analyst. Summarize the following news in \
                 English for an investor in Moroccan equities.\n\n",
            );
            prompt.push_str(
                "Mandatory format, one block per news item, in the given order:\n\
                 <marker> *Short title*\n\
                 Two or three factual sentences, no links, no lists.\n\n\
                 Use the marker given for the item (🔴, 🟠 or 🔵). \
                 Do not add an introduction or a conclusion.\n\n",
            );
            if !merges.is_empty() {
                prompt.push_str("Mandatory merges (one block per group):\n");
                for group in &merges {
                    let _ = writeln!(
                        prompt,
                        "- Items {}: same entity \"{}\", merge them into a single block \
                         placed where item {} would be.",
                        numbers(&group.members),
                        group.entity,
                        first_number(&group.members)
                    );
                }
                prompt.push('\n');
            }
            prompt.push_str("News:\n");
        }
    }

    for (i, article) in articles.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. {} {} ({}) - {}",
            i + 1,
            article.importance.tier.marker(),
            article.candidate.title,
            article.source_label,
            article.candidate.link
        );
    }
    prompt
}

fn first_number(members: &[usize]) -> usize {
    members.first().map_or(1, |i| i + 1)
}

fn numbers(members: &[usize]) -> String {
    members
        .iter()
        .map(|i| (i + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateArticle, Importance, ImportanceTier, MatchReason};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials::new(Some("bot"), Some("@chan"), Some("test-key")).unwrap()
    }

    fn settings(endpoint: &str) -> GeneratorSettings {
        GeneratorSettings {
            endpoint: endpoint.to_string(),
            model: "gemini-test".into(),
            timeout_secs: 5,
        }
    }

    fn article(title: &str, tier: ImportanceTier) -> ClassifiedArticle {
        ClassifiedArticle {
            candidate: CandidateArticle::new(title, "https://boursenews.ma/a", "", "boursenews")
                .unwrap(),
            source_label: "BourseNews".into(),
            relevance: MatchReason::Entity("ocp".into()).into(),
            importance: Importance { tier, keyword: None },
        }
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [ { "content": { "parts": [ { "text": "🔴 *OCP*\nTexte." } ] } } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = settings(&server.uri());
        let creds = credentials();
        let generator = GeminiGenerator::new(&settings, &creds).unwrap();
        let text = generator.generate("prompt").await.unwrap();
        assert_eq!(text, "🔴 *OCP*\nTexte.");
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let settings = settings(&server.uri());
        let creds = credentials();
        let generator = GeminiGenerator::new(&settings, &creds).unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_missing_fields_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let settings = settings(&server.uri());
        let creds = credentials();
        let generator = GeminiGenerator::new(&settings, &creds).unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Malformed(_)));
    }

    #[test]
    fn test_extract_text_rejects_blank_text() {
        let payload = json!({ "candidates": [ { "content": { "parts": [ { "text": "  " } ] } } ] });
        assert!(matches!(extract_text(&payload), Err(GeneratorError::Malformed(_))));
    }

    #[test]
    fn test_prompt_lists_articles_in_order() {
        let articles = vec![
            article("OCP lève 5 MMDH", ImportanceTier::High),
            article("Cosumar: ventes en hausse", ImportanceTier::Medium),
        ];
        let prompt = build_prompt(&articles, &[], Language::Fr);
        assert!(prompt.contains("1. 🔴 OCP lève 5 MMDH (BourseNews) - https://boursenews.ma/a"));
        assert!(prompt.contains("2. 🟠 Cosumar: ventes en hausse"));
        assert!(!prompt.contains("Regroupements"));
    }

    #[test]
    fn test_prompt_carries_merge_instructions() {
        let articles = vec![
            article("OCP lève 5 MMDH", ImportanceTier::High),
            article("Cosumar: ventes en hausse", ImportanceTier::Medium),
            article("OCP signe avec l'Inde", ImportanceTier::Medium),
        ];
        let groups = vec![
            EntityGroup { entity: "ocp".into(), members: vec![0, 2] },
            EntityGroup { entity: "cosumar".into(), members: vec![1] },
        ];
        let prompt = build_prompt(&articles, &groups, Language::En);
        assert!(prompt.contains("Items 1, 3: same entity \"ocp\""));
        assert!(!prompt.contains("\"cosumar\""));
    }

    #[test]
    fn test_merged_block_position_is_requested() {
        let articles = vec![
            article("Cosumar: ventes en hausse", ImportanceTier::High),
            article("OCP lève 5 MMDH", ImportanceTier::Medium),
            article("OCP signe avec l'Inde", ImportanceTier::Medium),
        ];
        let groups = vec![EntityGroup { entity: "ocp".into(), members: vec![1, 2] }];
        let fr = build_prompt(&articles, &groups, Language::Fr);
        assert!(fr.contains("fusionne-les en un seul bloc placé à la position de l'actualité 2."));
        let en = build_prompt(&articles, &groups, Language::En);
        assert!(en.contains("merge them into a single block placed where item 2 would be."));
    }
}
