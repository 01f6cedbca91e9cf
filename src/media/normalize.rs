//! Conversion to the concatenation-safe container
//!
//! Raw mobile clips carry non-monotonic timestamps that break stream-copy
//! concatenation, so every clip is first remuxed to MPEG-TS (`.mts`).

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use super::MediaToolkit;
use crate::error::{AssemblyError, Result};

/// Extension of normalized clips.
pub const NORMALIZED_EXTENSION: &str = "mts";

/// Output path for a normalized copy of `input`: same stem, `.mts` extension.
#[must_use]
pub fn normalized_path(input: &Path) -> PathBuf {
    input.with_extension(NORMALIZED_EXTENSION)
}

/// Cached transcoding into the intermediate container.
pub struct Normalizer<'a, M: ?Sized> {
    toolkit: &'a M,
}

impl<'a, M: MediaToolkit + ?Sized> Normalizer<'a, M> {
    pub fn new(toolkit: &'a M) -> Self {
        Self { toolkit }
    }

    /// Return the normalized sibling of `input`, transcoding only if it does
    /// not exist yet.
    pub async fn normalize(&self, input: &Path) -> Result<PathBuf> {
        let output = normalized_path(input);
        if output == input {
            // Already in the intermediate container.
            return Ok(output);
        }

        if fs::try_exists(&output).await? {
            debug!("{} already normalized", output.display());
            return Ok(output);
        }

        if let Err(err) = self.toolkit.transcode(input, &output).await {
            // Never leave a partial file that the existence check would accept.
            let _ = fs::remove_file(&output).await;
            return Err(err);
        }

        if !fs::try_exists(&output).await? {
            return Err(AssemblyError::Transcode {
                path: input.to_path_buf(),
                reason: format!("no output file at {}", output.display()),
            });
        }

        info!("Normalized {}", output.display());
        Ok(output)
    }
}
