//! Media tooling: transcode, probe, concatenate.
//!
//! [`MediaToolkit`] is the seam to the external media tools. The
//! [`FfmpegToolkit`](ffmpeg::FfmpegToolkit) implementation shells out to
//! `ffmpeg`/`ffprobe`; the [`Normalizer`] adds the cache check and the
//! output-path rule on top of any toolkit.

pub mod ffmpeg;
pub mod normalize;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use ffmpeg::{FfmpegConfig, FfmpegToolkit};
pub use normalize::{normalized_path, Normalizer, NORMALIZED_EXTENSION};

/// External media operations used by the pipeline.
///
/// Every call is one-shot and blocking from the caller's point of view: the
/// future resolves once the tool has exited.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Convert `input` into the intermediate container at `output`.
    /// Fails with `AssemblyError::Transcode`.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;

    /// Duration of a media file in seconds. Fails with `AssemblyError::Probe`.
    async fn probe_duration(&self, input: &Path) -> Result<f64>;

    /// Join the files listed in `descriptor` into `output` without
    /// re-encoding. Fails with `AssemblyError::Concatenation`.
    async fn concat(&self, descriptor: &Path, output: &Path) -> Result<()>;

    /// Render `subtitles` into the picture of `video`, writing `output`.
    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> Result<()>;
}
