//! Listing page retrieval.
//!
//! Two strategies exist. `plain` requests the page directly. `hardened` goes
//! through a render proxy with a browser-like header set, for sites that
//! block scripted clients. Without a proxy the hardened strategy reports
//! [`FetchError::StrategyUnavailable`] and the caller skips the source.

use crate::config::FetchStrategy;
use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

const APP_USER_AGENT: &str = concat!("bourse_digest/", env!("CARGO_PKG_VERSION"));

const BROWSER_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Map an HTTP status to the fetch outcome.
///
/// Statuses used by bot protection and rate limiting (401, 403, 429, 503 and
/// the 520-530 range served by CDN shields) are access denials.
pub fn check_status(status: u16) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 | 429 | 503 | 520..=530 => Err(FetchError::AccessDenied(status)),
        other => Err(FetchError::Status(other)),
    }
}

/// HTTP client shared by every source of a run.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    render_proxy: Option<String>,
}

impl PageFetcher {
    pub fn new(timeout: Duration, render_proxy: Option<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            render_proxy,
        })
    }

    pub fn supports(&self, strategy: FetchStrategy) -> bool {
        match strategy {
            FetchStrategy::Plain => true,
            FetchStrategy::Hardened => self.render_proxy.is_some(),
        }
    }

    /// Fetch the HTML of one page with the given strategy.
    #[instrument(level = "debug", skip_all, fields(url = %url, ?strategy))]
    pub async fn fetch(&self, url: &Url, strategy: FetchStrategy) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let request = match strategy {
            FetchStrategy::Plain => self
                .client
                .get(url.as_str())
                .header(USER_AGENT, APP_USER_AGENT),
            FetchStrategy::Hardened => {
                let proxy = self
                    .render_proxy
                    .as_deref()
                    .ok_or(FetchError::StrategyUnavailable)?;
                let target = proxy.replace("{url}", &urlencoding::encode(url.as_str()));
                let agent = BROWSER_USER_AGENTS[rng().random_range(0..BROWSER_USER_AGENTS.len())];
                self.client
                    .get(target)
                    .header(USER_AGENT, agent)
                    .header(
                        ACCEPT,
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .header(ACCEPT_LANGUAGE, "fr-FR,fr;q=0.9,en;q=0.8")
            }
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        check_status(status)?;
        let body = response.text().await?;
        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_check_status() {
        assert!(check_status(200).is_ok());
        assert!(matches!(check_status(403), Err(FetchError::AccessDenied(403))));
        assert!(matches!(check_status(429), Err(FetchError::AccessDenied(429))));
        assert!(matches!(check_status(522), Err(FetchError::AccessDenied(522))));
        assert!(matches!(check_status(404), Err(FetchError::Status(404))));
        assert!(matches!(check_status(500), Err(FetchError::Status(500))));
    }

    #[tokio::test]
    async fn test_plain_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/marches"))
            .and(header("user-agent", APP_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5), None).unwrap();
        let url = Url::parse(&format!("{}/marches", server.uri())).unwrap();
        let body = fetcher.fetch(&url, FetchStrategy::Plain).await.unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_forbidden_is_access_denial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_secs(5), None).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher.fetch(&url, FetchStrategy::Plain).await.unwrap_err();
        assert!(matches!(err, FetchError::AccessDenied(403)));
    }

    #[tokio::test]
    async fn test_hardened_without_proxy_is_unavailable() {
        let fetcher = PageFetcher::new(Duration::from_secs(5), None).unwrap();
        assert!(!fetcher.supports(FetchStrategy::Hardened));
        let url = Url::parse("https://medias24.com/categorie/leboursier/page/1/").unwrap();
        let err = fetcher.fetch(&url, FetchStrategy::Hardened).await.unwrap_err();
        assert!(matches!(err, FetchError::StrategyUnavailable));
    }

    #[tokio::test]
    async fn test_hardened_goes_through_proxy() {
        let server = MockServer::start().await;
        let target = "https://medias24.com/categorie/leboursier/page/1/";
        Mock::given(method("GET"))
            .and(path("/render"))
            .and(query_param("url", target))
            .and(header("accept-language", "fr-FR,fr;q=0.9,en;q=0.8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>rendered</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let proxy = format!("{}/render?url={{url}}", server.uri());
        let fetcher = PageFetcher::new(Duration::from_secs(5), Some(proxy)).unwrap();
        let body = fetcher
            .fetch(&Url::parse(target).unwrap(), FetchStrategy::Hardened)
            .await
            .unwrap();
        assert_eq!(body, "<html>rendered</html>");
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(Duration::from_millis(50), None).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher.fetch(&url, FetchStrategy::Plain).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
