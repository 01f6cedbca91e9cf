//! External downloader bridge
//!
//! Runs a downloader (default `yt-dlp`) that writes the clip to stdout and
//! captures the bytes. Works for any site the downloader supports.

use std::process::Stdio;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use super::ClipFetcher;
use crate::document::Locator;

/// Downloader-subprocess fetcher
pub struct CommandFetcher {
    /// Path to the downloader binary
    program: String,
    /// Additional arguments placed before the output flags
    extra_args: Vec<String>,
}

impl CommandFetcher {
    /// Create a fetcher using `yt-dlp`, searching for the binary in PATH
    #[must_use]
    pub fn new() -> Self {
        let program = which::which("yt-dlp")
            .map_or_else(|_| "yt-dlp".to_string(), |p| p.to_string_lossy().to_string());

        Self {
            program,
            extra_args: Vec::new(),
        }
    }

    /// Specify a custom downloader binary
    #[must_use]
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Add extra downloader arguments
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_args(&self, locator: &Locator) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend(["--quiet", "--no-progress", "-o", "-"].map(String::from));
        args.push(locator.url().to_string());
        args
    }
}

impl Default for CommandFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClipFetcher for CommandFetcher {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn fetch(&self, locator: &Locator) -> Result<Bytes> {
        let args = self.build_args(locator);
        debug!("{} args: {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }

        Ok(Bytes::from(output.stdout))
    }
}
