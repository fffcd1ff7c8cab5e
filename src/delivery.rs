//! Digest delivery to a Telegram channel.
//!
//! Delivery is fire-and-report: a failed send is logged and reported as
//! `false`, never retried. The one exception is a part Telegram refuses to
//! parse as Markdown: it is sent once more as plain text so the digest still
//! reaches the channel. Texts longer than Telegram's message limit are split
//! on blank lines so each digest block stays in one message.

use crate::config::{Credentials, DeliverySettings};
use crate::error::DeliveryError;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Rendering hints passed along with the text.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryHints {
    pub disable_preview: bool,
}

/// Side-effecting sink for the final text.
pub trait DeliverySink {
    /// Deliver the text; `true` when every part was accepted.
    async fn deliver(&self, text: &str, hints: DeliveryHints) -> bool;
}

/// Telegram Bot API `sendMessage` client.
pub struct TelegramSink<'a> {
    client: Client,
    settings: &'a DeliverySettings,
    credentials: &'a Credentials,
}

impl fmt::Debug for TelegramSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSink")
            .field("endpoint", &self.settings.endpoint)
            .field("chat_id", &self.credentials.chat_id)
            .finish()
    }
}

impl<'a> TelegramSink<'a> {
    pub fn new(
        settings: &'a DeliverySettings,
        credentials: &'a Credentials,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    async fn send_part(
        &self,
        text: &str,
        hints: DeliveryHints,
        markdown: bool,
    ) -> Result<(), DeliveryError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.settings.endpoint.trim_end_matches('/'),
            self.credentials.bot_token
        );
        let mut payload = json!({
            "chat_id": self.credentials.chat_id,
            "text": text,
            "disable_web_page_preview": hints.disable_preview,
        });
        if markdown {
            payload["parse_mode"] = json!("Markdown");
        }
        let response = self.client.post(url).json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body: truncate_for_log(&body, 300),
        })
    }
}

impl DeliverySink for TelegramSink<'_> {
    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    async fn deliver(&self, text: &str, hints: DeliveryHints) -> bool {
        let parts = split_message(text, self.settings.max_message_chars);
        let total = parts.len();
        for (i, part) in parts.iter().enumerate() {
            let mut sent = self.send_part(part, hints, true).await;
            if let Err(e) = &sent {
                if e.is_markup_rejection() {
                    warn!(part = i + 1, total, error = %e, "Markdown refused; resending as plain text");
                    sent = self.send_part(part, hints, false).await;
                }
            }
            if let Err(e) = sent {
                error!(part = i + 1, total, error = %e, "Delivery failed");
                return false;
            }
        }
        info!(parts = total, "Digest delivered");
        true
    }
}

/// Split text into parts of at most `max_chars` characters.
///
/// Cuts happen on blank lines when possible, then on line breaks, and only
/// inside a line when a single line is longer than the limit.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    let push_piece = |piece: &str, sep: &str, current: &mut String, parts: &mut Vec<String>| {
        let needed = if current.is_empty() {
            piece.chars().count()
        } else {
            current.chars().count() + sep.chars().count() + piece.chars().count()
        };
        if needed <= max_chars {
            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(piece);
        } else {
            if !current.is_empty() {
                parts.push(std::mem::take(current));
            }
            current.push_str(piece);
        }
    };

    for block in text.split("\n\n") {
        if block.chars().count() <= max_chars {
            push_piece(block, "\n\n", &mut current, &mut parts);
            continue;
        }
        for line in block.lines() {
            if line.chars().count() <= max_chars {
                push_piece(line, "\n", &mut current, &mut parts);
                continue;
            }
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(max_chars) {
                let chunk: String = chunk.iter().collect();
                push_piece(&chunk, "\n", &mut current, &mut parts);
            }
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials::new(Some("123:abc"), Some("@bourse"), Some("key")).unwrap()
    }

    fn settings(endpoint: &str, max_message_chars: usize) -> DeliverySettings {
        DeliverySettings {
            endpoint: endpoint.to_string(),
            disable_preview: true,
            max_message_chars,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": "@bourse",
                "text": "📭 Aucun article pertinent pour aujourd'hui.",
                "parse_mode": "Markdown",
                "disable_web_page_preview": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = settings(&server.uri(), 4096);
        let creds = credentials();
        let sink = TelegramSink::new(&settings, &creds).unwrap();
        let ok = sink
            .deliver(
                "📭 Aucun article pertinent pour aujourd'hui.",
                DeliveryHints { disable_preview: true },
            )
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_rejected_delivery_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: chat not found"))
            .expect(1)
            .mount(&server)
            .await;

        let settings = settings(&server.uri(), 4096);
        let creds = credentials();
        let sink = TelegramSink::new(&settings, &creds).unwrap();
        assert!(!sink.deliver("texte", DeliveryHints { disable_preview: true }).await);
    }

    #[tokio::test]
    async fn test_unparsable_markdown_is_resent_as_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "parse_mode": "Markdown" })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 12"
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "text": "* Point clé" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = settings(&server.uri(), 4096);
        let creds = credentials();
        let sink = TelegramSink::new(&settings, &creds).unwrap();
        assert!(sink.deliver("* Point clé", DeliveryHints { disable_preview: true }).await);

        let requests = server.received_requests().await.unwrap();
        let plain: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert!(plain.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn test_plain_text_resend_failure_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: can't parse entities"))
            .expect(2)
            .mount(&server)
            .await;

        let settings = settings(&server.uri(), 4096);
        let creds = credentials();
        let sink = TelegramSink::new(&settings, &creds).unwrap();
        assert!(!sink.deliver("*texte", DeliveryHints { disable_preview: true }).await);
    }

    #[tokio::test]
    async fn test_long_text_sent_in_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let settings = settings(&server.uri(), 20);
        let creds = credentials();
        let sink = TelegramSink::new(&settings, &creds).unwrap();
        let text = "premier bloc ici\n\nsecond bloc là";
        assert!(sink.deliver(text, DeliveryHints { disable_preview: false }).await);
    }

    #[test]
    fn test_split_keeps_short_text_whole() {
        assert_eq!(split_message("court", 4096), vec!["court".to_string()]);
    }

    #[test]
    fn test_split_on_block_boundaries() {
        let text = "aaaa\nbbbb\n\ncccc\ndddd\n\neeee";
        let parts = split_message(text, 12);
        assert_eq!(parts, vec!["aaaa\nbbbb", "cccc\ndddd", "eeee"]);
    }

    #[test]
    fn test_split_oversized_line() {
        let parts = split_message(&"x".repeat(25), 10);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 10));
    }
}
