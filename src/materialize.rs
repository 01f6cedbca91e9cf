//! Local clip cache
//!
//! Resolves an entry to `{output_dir}/{id}.mp4`, downloading only when that
//! file does not exist yet.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::document::{ClipId, Entry};
use crate::error::{AssemblyError, Result};
use crate::fetch::ClipFetcher;

/// Extension of downloaded, not yet normalized clips.
pub const RAW_EXTENSION: &str = "mp4";

/// An entry whose raw clip is on disk.
#[derive(Debug, Clone)]
pub struct FetchedClip {
    pub entry: Entry,
    pub raw_path: PathBuf,
}

/// Downloads clips into the output directory, once.
pub struct Materializer<F> {
    fetcher: F,
    output_dir: PathBuf,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl<F: ClipFetcher> Materializer<F> {
    /// Create a materializer writing into `output_dir`.
    pub fn new(fetcher: F, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(120),
            retries: 0,
            backoff: Duration::from_secs(1),
        }
    }

    /// Per-attempt time limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry failed downloads `retries` times, doubling `backoff` each time.
    #[must_use]
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Cache path for a clip id
    #[must_use]
    pub fn raw_path(&self, id: ClipId) -> PathBuf {
        self.output_dir.join(format!("{id}.{RAW_EXTENSION}"))
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Make the entry's raw clip available locally.
    pub async fn materialize(&self, entry: &Entry) -> Result<FetchedClip> {
        let locator = entry.locator();
        let raw_path = self.raw_path(locator.id());

        if fs::try_exists(&raw_path).await? {
            debug!("{} cached at {}", locator.id(), raw_path.display());
            return Ok(FetchedClip {
                entry: entry.clone(),
                raw_path,
            });
        }

        let data = self.fetch_with_retry(entry).await?;

        // Each attempt writes its own sibling, so an interrupted run never
        // leaves a truncated file that the cache check would accept.
        let partial = tempfile::Builder::new()
            .prefix(&format!("{}.", locator.id()))
            .suffix(".part")
            .tempfile_in(&self.output_dir)?
            .into_temp_path();
        fs::write(&partial, &data).await?;
        partial.persist(&raw_path).map_err(|e| e.error)?;

        info!(
            "{} fetched via {} ({} bytes)",
            locator.id(),
            self.fetcher.name(),
            data.len()
        );

        Ok(FetchedClip {
            entry: entry.clone(),
            raw_path,
        })
    }

    async fn fetch_with_retry(&self, entry: &Entry) -> Result<bytes::Bytes> {
        let mut delay = self.backoff;
        let mut attempt = 0;

        loop {
            match self.fetch_once(entry).await {
                Ok(data) => return Ok(data),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "{err}; retry {attempt}/{} in {:.1}s",
                        self.retries,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, entry: &Entry) -> Result<bytes::Bytes> {
        let locator = entry.locator();
        let fetch_error = |reason: String| AssemblyError::Fetch {
            locator: locator.url().to_string(),
            reason,
        };

        let data = tokio::time::timeout(self.timeout, self.fetcher.fetch(locator))
            .await
            .map_err(|_| fetch_error(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| fetch_error(format!("{e:#}")))?;

        if data.is_empty() {
            return Err(fetch_error("fetcher returned no data".to_string()));
        }

        Ok(data)
    }
}
