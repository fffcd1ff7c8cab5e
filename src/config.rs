//! Runtime settings and credentials.
//!
//! [`Settings`] holds every tunable of a run: the date window, the sources,
//! the lexicons and the collaborator endpoints. Built-in defaults describe the
//! production setup; a YAML file can override any subset of fields.
//!
//! [`Credentials`] holds the three secrets the run needs. They are checked
//! once, before any network activity, and then passed by reference to the
//! generator and delivery clients.

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::lexicon::Lexicons;
use crate::models::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, instrument};
use url::Url;

/// How listing pages of a source are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Direct request with the crate's user agent.
    #[default]
    Plain,
    /// Through the render proxy with browser-like headers.
    Hardened,
}

/// One news site and how to read its listing pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    /// Name shown next to the article link in the digest.
    pub label: String,
    /// Origin used to resolve relative links.
    pub base_url: String,
    /// Path of a listing page, with a `{page}` placeholder.
    pub page_template: String,
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Container selectors tried in order; the container's text is the candidate context.
    #[serde(default)]
    pub card_selectors: Vec<String>,
    /// Anchor selectors tried in order when no container produced a candidate.
    #[serde(default = "default_fallback_selectors")]
    pub fallback_selectors: Vec<String>,
    #[serde(default)]
    pub strategy: FetchStrategy,
    /// Pause before scraping a source that renders its listing client-side.
    #[serde(default)]
    pub render_delay_secs: u64,
}

fn default_first_page() -> u32 {
    1
}

fn default_fallback_selectors() -> Vec<String> {
    [
        "h3 a[href]",
        "h2 a[href]",
        "h4 a[href]",
        ".entry-title a[href]",
        ".post-title a[href]",
        ".title a[href]",
        "article a[href]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl SourceConfig {
    /// Build the absolute URL of a listing page.
    pub fn page_url(&self, page: u32) -> Result<Url, url::ParseError> {
        let base = Url::parse(&self.base_url)?;
        base.join(&self.page_template.replace("{page}", &page.to_string()))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            id: "boursenews".into(),
            label: "BourseNews".into(),
            base_url: "https://boursenews.ma".into(),
            page_template: "/articles/marches?page={page}".into(),
            first_page: 1,
            card_selectors: strings(&["div.item-content"]),
            fallback_selectors: default_fallback_selectors(),
            strategy: FetchStrategy::Plain,
            render_delay_secs: 0,
        },
        SourceConfig {
            id: "medias24".into(),
            label: "Médias24 - Le Boursier".into(),
            base_url: "https://medias24.com".into(),
            page_template: "/categorie/leboursier/page/{page}/".into(),
            first_page: 1,
            card_selectors: strings(&["article", "div.post-item"]),
            fallback_selectors: default_fallback_selectors(),
            strategy: FetchStrategy::Hardened,
            render_delay_secs: 3,
        },
        SourceConfig {
            id: "leseco".into(),
            label: "L'Economiste".into(),
            base_url: "https://www.leseco.ma".into(),
            page_template: "/business/page/{page}/".into(),
            first_page: 1,
            card_selectors: strings(&["article", "div.td_module_wrap"]),
            fallback_selectors: default_fallback_selectors(),
            strategy: FetchStrategy::Plain,
            render_delay_secs: 0,
        },
    ]
}

/// Narrative generator endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-1.5-flash".into(),
            timeout_secs: 60,
        }
    }
}

/// Delivery endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub endpoint: String,
    /// Suppress link previews in the delivered message.
    pub disable_preview: bool,
    /// Longest text sent in a single message.
    pub max_message_chars: usize,
    pub timeout_secs: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.telegram.org".into(),
            disable_preview: true,
            max_message_chars: 4096,
            timeout_secs: 20,
        }
    }
}

/// Longest accepted date window; the matcher generates dozens of patterns per day.
pub const MAX_WINDOW_DAYS: u32 = 31;

/// Every tunable of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of days in the trailing date window, today included.
    pub window_days: u32,
    pub language: Language,
    pub case_insensitive_dates: bool,
    /// Upper bound on listing pages visited per source.
    pub max_pages: u32,
    pub request_timeout_secs: u64,
    /// Extracted titles shorter than this are treated as placeholders.
    pub min_title_chars: usize,
    /// Text fragments identifying placeholder or loading elements.
    pub loading_markers: Vec<String>,
    /// Stop paginating a source after a page with no article in the date window.
    pub stop_on_stale_page: bool,
    /// Render proxy URL with a `{url}` placeholder, enabling hardened fetches.
    pub render_proxy: Option<String>,
    pub sources: Vec<SourceConfig>,
    pub lexicons: Lexicons,
    pub generator: GeneratorSettings,
    pub delivery: DeliverySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window_days: 2,
            language: Language::Fr,
            case_insensitive_dates: true,
            max_pages: 5,
            request_timeout_secs: 20,
            min_title_chars: 12,
            loading_markers: strings(&["chargement", "loading", "lire la suite", "voir plus"]),
            stop_on_stale_page: false,
            render_proxy: None,
            sources: default_sources(),
            lexicons: Lexicons::default(),
            generator: GeneratorSettings::default(),
            delivery: DeliverySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional YAML file, falling back to defaults.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No settings file given; using built-in defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings: Settings = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        info!(path, sources = settings.sources.len(), "Loaded settings file");
        Ok(settings)
    }

    /// Apply command-line overrides on top of the loaded settings.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(days) = cli.window_days {
            self.window_days = days;
        }
        if let Some(language) = cli.language {
            self.language = language;
        }
        if let Some(max_pages) = cli.max_pages {
            self.max_pages = max_pages;
        }
        if let Some(proxy) = &cli.render_proxy {
            self.render_proxy = Some(proxy.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_days > MAX_WINDOW_DAYS {
            return Err(ConfigError::Invalid(format!(
                "window_days must be at most {MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be at least 1".into()));
        }
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::Invalid("source with an empty id".into()));
            }
            if !source.page_template.contains("{page}") {
                return Err(ConfigError::Invalid(format!(
                    "source {}: page_template lacks a {{page}} placeholder",
                    source.id
                )));
            }
            if Url::parse(&source.base_url).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "source {}: base_url {} is not an absolute URL",
                    source.id, source.base_url
                )));
            }
        }
        if let Some(proxy) = &self.render_proxy {
            if !proxy.contains("{url}") {
                return Err(ConfigError::Invalid(
                    "render_proxy lacks a {url} placeholder".into(),
                ));
            }
        }
        Ok(())
    }
}

/// The secrets a run needs, checked before any network activity.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
    pub generator_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("generator_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        bot_token: Option<&str>,
        chat_id: Option<&str>,
        generator_api_key: Option<&str>,
    ) -> Result<Self, ConfigError> {
        fn present(value: Option<&str>) -> Option<String> {
            value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
        }

        let bot_token = present(bot_token);
        let chat_id = present(chat_id);
        let generator_api_key = present(generator_api_key);

        let mut missing = Vec::new();
        if bot_token.is_none() {
            missing.push("BOT_TOKEN");
        }
        if chat_id.is_none() {
            missing.push("CHAT_ID");
        }
        if generator_api_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }

        match (bot_token, chat_id, generator_api_key) {
            (Some(bot_token), Some(chat_id), Some(generator_api_key)) => Ok(Self {
                bot_token,
                chat_id,
                generator_api_key,
            }),
            _ => Err(ConfigError::MissingCredentials(missing)),
        }
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Self::new(
            cli.bot_token.as_deref(),
            cli.chat_id.as_deref(),
            cli.gemini_api_key.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.window_days, 2);
        assert_eq!(settings.sources.len(), 3);
        assert_eq!(settings.sources[0].id, "boursenews");
    }

    #[test]
    fn test_page_url_from_template() {
        let source = &Settings::default().sources[0];
        assert_eq!(
            source.page_url(3).unwrap().as_str(),
            "https://boursenews.ma/articles/marches?page=3"
        );
    }

    #[test]
    fn test_partial_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "window_days: 1\nlanguage: en\nlexicons:\n  entities:\n    - Acme\n"
        )
        .unwrap();
        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.window_days, 1);
        assert_eq!(settings.language, Language::En);
        assert_eq!(settings.lexicons.entities.terms(), &["acme".to_string()]);
        assert!(!settings.lexicons.direct.is_empty());
        assert_eq!(settings.max_pages, 5);
    }

    #[test]
    fn test_yaml_source_gets_selector_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sources:\n  - id: demo\n    label: Demo\n    base_url: https://demo.ma\n    page_template: /news/{{page}}\n"
        )
        .unwrap();
        let settings = Settings::load(file.path().to_str()).unwrap();
        let source = &settings.sources[0];
        assert_eq!(source.first_page, 1);
        assert_eq!(source.strategy, FetchStrategy::Plain);
        assert!(!source.fallback_selectors.is_empty());
        settings.validate().unwrap();
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let err = Settings::load(Some("/nonexistent/settings.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invalid_template_rejected() {
        let mut settings = Settings::default();
        settings.sources[0].page_template = "/articles".into();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_window_days_is_bounded() {
        let month = Settings {
            window_days: MAX_WINDOW_DAYS,
            ..Settings::default()
        };
        month.validate().unwrap();

        let cli = Cli::parse_from(["bourse_digest", "--window-days", "4000000000"]);
        let mut settings = Settings::default();
        settings.apply_cli(&cli);
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("window_days")));
    }

    #[test]
    fn test_zero_max_pages_rejected() {
        let settings = Settings {
            max_pages: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_listed_together() {
        let err = Credentials::new(Some("token"), None, Some("  ")).unwrap_err();
        match err {
            ConfigError::MissingCredentials(names) => {
                assert_eq!(names, vec!["CHAT_ID", "GEMINI_API_KEY"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials::new(Some("secret-token"), Some("@chan"), Some("secret-key")).unwrap();
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("@chan"));
    }
}
