//! Run configuration.
//!
//! [`PipelineConfig`] drives a single run. Defaults for it (and for the tool
//! paths) can come from `~/.config/reelcat/config.toml`; command-line flags
//! override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// How clips are downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// External downloader writing the clip to stdout (yt-dlp)
    #[default]
    Command,
    /// Direct HTTP GET through a URL template
    Http,
}

/// Settings for one assembly run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the cache, intermediate files and the outputs
    pub output_dir: PathBuf,
    /// Clip inserted between consecutive entries
    pub transition: Option<PathBuf>,
    /// Entries fetched and normalized at the same time (1 = sequential)
    pub concurrency: usize,
    /// Time limit for one external call (download, ffmpeg, ffprobe)
    pub call_timeout: Duration,
    /// Extra download attempts after a failure
    pub fetch_retries: u32,
    /// Delay before the first retry, doubled for each further one
    pub retry_backoff: Duration,
    /// Also produce a copy of the video with captions rendered in
    pub burn_subtitles: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            transition: None,
            concurrency: 1,
            call_timeout: Duration::from_secs(300),
            fetch_retries: 0,
            retry_backoff: Duration::from_secs(2),
            burn_subtitles: false,
        }
    }
}

impl PipelineConfig {
    /// Config writing into `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_transition(mut self, transition: impl Into<PathBuf>) -> Self {
        self.transition = Some(transition.into());
        self
    }

    /// Set parallelism (clamped to at least 1)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fetch_retries(mut self, retries: u32) -> Self {
        self.fetch_retries = retries;
        self
    }

    #[must_use]
    pub fn with_burn_subtitles(mut self, enabled: bool) -> Self {
        self.burn_subtitles = enabled;
        self
    }
}

/// Contents of the optional TOML config file. Every key is optional.
///
/// ```toml
/// fetcher = "http"
/// url_template = "https://cdn.example.com/{id}.mp4"
/// ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
/// timeout_secs = 120
/// concurrency = 4
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub fetcher: Option<FetcherKind>,
    pub url_template: Option<String>,
    pub downloader: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub locator_prefix: Option<String>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub fetch_retries: Option<u32>,
    pub burn_subtitles: Option<bool>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid settings")
    }

    /// Load settings.
    ///
    /// With an explicit path the file must exist and parse. Without one, the
    /// default location is used and a missing file yields default settings.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = default_config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }
}

/// Return the path to the default config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reelcat")
        .join("config.toml")
}
