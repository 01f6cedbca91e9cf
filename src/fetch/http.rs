//! Direct HTTP clip download
//!
//! The download URL is built from a template where `{id}` is replaced by the
//! clip id and `{url}` by the locator URL as written in the document.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, info, instrument};

use super::ClipFetcher;
use crate::document::Locator;

const USER_AGENT: &str = concat!("reelcat/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher backed by a pooled reqwest client
pub struct HttpFetcher {
    client: Client,
    url_template: String,
}

impl HttpFetcher {
    /// Create a fetcher for the given download URL template.
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains("{id}") && !url_template.contains("{url}") {
            return Err(anyhow!(
                "URL template must contain {{id}} or {{url}}: {url_template}"
            ));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            url_template,
        })
    }

    /// Download URL for a locator
    #[must_use]
    pub fn download_url(&self, locator: &Locator) -> String {
        self.url_template
            .replace("{id}", &locator.id().to_string())
            .replace("{url}", locator.url())
    }
}

#[async_trait]
impl ClipFetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self), fields(id = %locator.id()))]
    async fn fetch(&self, locator: &Locator) -> Result<Bytes> {
        let url = self.download_url(locator);
        debug!("GET {url}");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        info!(bytes = body.len(), "Clip downloaded");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> Locator {
        Locator::parse("https://www.tiktok.com/@a/video/123?lang=en").unwrap()
    }

    #[test]
    fn template_substitutes_id() {
        let fetcher = HttpFetcher::new("https://cdn.example.com/clips/{id}.mp4").unwrap();
        assert_eq!(
            fetcher.download_url(&locator()),
            "https://cdn.example.com/clips/123.mp4"
        );
    }

    #[test]
    fn template_substitutes_url() {
        let fetcher = HttpFetcher::new("http://localhost:8080/dl?src={url}").unwrap();
        assert_eq!(
            fetcher.download_url(&locator()),
            "http://localhost:8080/dl?src=https://www.tiktok.com/@a/video/123?lang=en"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        assert!(HttpFetcher::new("https://cdn.example.com/clip.mp4").is_err());
    }
}
