//! Timeline assembly and the concat descriptor
//!
//! The timeline is the ordered list of normalized files handed to the concat
//! demuxer: every surviving entry in document order, with the transition (if
//! any) placed between consecutive entries but never before the first or
//! after the last.

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::document::Entry;
use crate::error::{AssemblyError, Result};

/// File name of the concat descriptor inside the output directory.
pub const DESCRIPTOR_FILENAME: &str = "ffmpeg_input.txt";

/// A fully processed entry: normalized on disk with a measured duration.
#[derive(Debug, Clone)]
pub struct TimedEntry {
    pub entry: Entry,
    /// Normalized clip
    pub path: PathBuf,
    /// Duration of the normalized clip, in seconds
    pub duration_secs: f64,
}

impl TimedEntry {
    #[must_use]
    pub fn new(entry: Entry, path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            entry,
            path: path.into(),
            duration_secs,
        }
    }
}

/// The normalized transition clip, shared by every insertion point.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedTransition {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Insert `separator` between every pair of consecutive items.
///
/// `n` items produce `2n - 1` elements; no items produce none.
pub fn intersperse<T: Clone>(items: impl IntoIterator<Item = T>, separator: &T) -> Vec<T> {
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(separator.clone());
        }
        out.push(item);
    }
    out
}

/// Ordered files to concatenate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    paths: Vec<PathBuf>,
}

impl Timeline {
    /// Build the timeline from surviving entries and an optional transition.
    #[must_use]
    pub fn assemble(entries: &[TimedEntry], transition: Option<&TimedTransition>) -> Self {
        let clips = entries.iter().map(|e| e.path.clone());
        let paths = match transition {
            Some(t) => intersperse(clips, &t.path),
            None => clips.collect(),
        };
        Self { paths }
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Render the descriptor: one `file '<basename>'` line per element.
    pub fn descriptor(&self) -> Result<String> {
        let mut out = String::new();
        for path in &self.paths {
            let line = descriptor_line(path)?;
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{line}");
        }
        Ok(out)
    }

    /// Write the descriptor to `{output_dir}/ffmpeg_input.txt`.
    pub async fn write_descriptor(&self, output_dir: &Path) -> Result<PathBuf> {
        let content = self.descriptor()?;
        let path = output_dir.join(DESCRIPTOR_FILENAME);
        tokio::fs::write(&path, content).await?;
        info!("Descriptor lists {} files: {}", self.len(), path.display());
        Ok(path)
    }
}

/// Descriptor line for one file, referenced by basename.
///
/// Single quotes are written as `'\''` (close quote, escaped quote, reopen).
/// Basenames with line breaks or NUL cannot be expressed in the line format.
pub fn descriptor_line(path: &Path) -> Result<String> {
    let descriptor_error = |reason: &str| AssemblyError::Descriptor {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let name = path
        .file_name()
        .ok_or_else(|| descriptor_error("path has no file name"))?
        .to_str()
        .ok_or_else(|| descriptor_error("file name is not valid UTF-8"))?;

    if name.contains(['\n', '\r', '\0']) {
        return Err(descriptor_error("file name contains a line break or NUL"));
    }

    Ok(format!("file '{}'", name.replace('\'', r"'\''")))
}
