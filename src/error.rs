//! Error types for each pipeline concern.
//!
//! Every collaborator that touches the network has its own error enum so the
//! pipeline can decide, per kind, whether a failure degrades the run or ends
//! it. Only [`ConfigError`] is allowed to stop a run before it starts.

use thiserror::Error;

/// Failure to obtain the HTML of one listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The origin answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The origin refused the request (bot protection, rate limiting).
    #[error("access denied with HTTP status {0}")]
    AccessDenied(u16),

    /// The source needs the hardened fetch strategy and no render proxy is configured.
    #[error("hardened fetch strategy unavailable (no render proxy configured)")]
    StrategyUnavailable,

    /// The page URL could not be built from the source definition.
    #[error("invalid page URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether the failure condemns the whole source rather than a single page.
    pub fn abandons_source(&self) -> bool {
        matches!(
            self,
            FetchError::AccessDenied(_) | FetchError::StrategyUnavailable | FetchError::InvalidUrl(_)
        )
    }
}

/// Failure of the external narrative generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generator answered with HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response did not carry the expected fields or structure.
    #[error("malformed generator response: {0}")]
    Malformed(String),
}

/// A run that stopped abnormally before producing a digest.
#[derive(Debug, Error)]
#[error("run aborted: {0}")]
pub struct RunAborted(pub String);

/// Failure of the outbound chat delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("delivery rejected with HTTP status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl DeliveryError {
    /// Telegram refused the text because its Markdown entities do not parse.
    pub fn is_markup_rejection(&self) -> bool {
        matches!(self, Self::Rejected { status: 400, body } if body.contains("can't parse entities"))
    }
}

/// Invalid or missing process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denial_abandons_source() {
        assert!(FetchError::AccessDenied(403).abandons_source());
        assert!(FetchError::StrategyUnavailable.abandons_source());
        assert!(!FetchError::Status(404).abandons_source());
        assert!(!FetchError::Status(500).abandons_source());
    }

    #[test]
    fn test_missing_credentials_lists_every_name() {
        let e = ConfigError::MissingCredentials(vec!["BOT_TOKEN", "CHAT_ID"]);
        assert_eq!(e.to_string(), "missing required configuration: BOT_TOKEN, CHAT_ID");
    }

    #[test]
    fn test_only_entity_parse_errors_are_markup_rejections() {
        let parse = DeliveryError::Rejected {
            status: 400,
            body: "Bad Request: can't parse entities: unclosed bold".to_string(),
        };
        let chat = DeliveryError::Rejected {
            status: 400,
            body: "Bad Request: chat not found".to_string(),
        };
        assert!(parse.is_markup_rejection());
        assert!(!chat.is_markup_rejection());
    }

    #[test]
    fn test_generator_status_display() {
        let e = GeneratorError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert!(e.to_string().contains("500"));
    }
}
