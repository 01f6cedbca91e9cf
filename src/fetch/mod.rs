//! Remote clip fetching.
//!
//! A [`ClipFetcher`] turns a [`Locator`] into the raw encoded bytes of the
//! clip. Two implementations are available:
//! [`HttpFetcher`](http::HttpFetcher) (direct download through a URL
//! template) and [`CommandFetcher`](command::CommandFetcher) (an external
//! downloader such as `yt-dlp` writing to stdout).
//!
//! The fetcher is handed to the [`Materializer`](crate::materialize::Materializer)
//! at construction time, so tests can substitute their own.

pub mod command;
pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::document::Locator;

pub use command::CommandFetcher;
pub use http::HttpFetcher;

/// Source of raw clip bytes.
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    /// Fetcher name for logs (e.g., "http", "yt-dlp").
    fn name(&self) -> &'static str;

    /// Download the clip behind `locator`.
    async fn fetch(&self, locator: &Locator) -> Result<Bytes>;
}

#[async_trait]
impl<F: ClipFetcher + ?Sized> ClipFetcher for Box<F> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes> {
        (**self).fetch(locator).await
    }
}
