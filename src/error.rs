//! Error types for the assembly pipeline
//!
//! Entry-scoped errors (locator, fetch, transcode, probe) exclude a single
//! clip from the run. Everything else aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Assembly pipeline errors
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("line {line}: cannot extract a clip id from locator '{text}'")]
    Locator { line: usize, text: String },

    #[error("fetch failed for {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("transcode failed for {}: {reason}", path.display())]
    Transcode { path: PathBuf, reason: String },

    #[error("probe failed for {}: {reason}", path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("cannot list {} in the concat descriptor: {reason}", path.display())]
    Descriptor { path: PathBuf, reason: String },

    #[error("concatenation failed: {reason}")]
    Concatenation { reason: String },

    #[error("transition {}: {source}", path.display())]
    Transition {
        path: PathBuf,
        #[source]
        source: Box<AssemblyError>,
    },

    #[error("output directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no clip survived fetch and normalization, nothing to concatenate")]
    NothingToAssemble,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    /// Whether this error only excludes one entry instead of aborting the run.
    #[must_use]
    pub fn is_entry_scoped(&self) -> bool {
        matches!(
            self,
            Self::Locator { .. } | Self::Fetch { .. } | Self::Transcode { .. } | Self::Probe { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
