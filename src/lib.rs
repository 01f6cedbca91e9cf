//! `reelcat` - stitch short remote clips into one captioned video
//!
//! # Features
//!
//! - **Annotated source lists**: one locator line per clip, caption lines below it
//! - **Idempotent cache**: downloads and conversions are skipped when already on disk
//! - **Lossless concat**: clips are remuxed to MPEG-TS and joined with stream copy
//! - **Transitions**: an optional clip placed between consecutive entries
//! - **Synced captions**: an SRT track whose cues follow the assembled timeline
//!
//! # Example
//!
//! ```rust,no_run
//! use reelcat::{AssemblyPipeline, CommandFetcher, Document, FfmpegToolkit, ParserOptions, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let document = Document::load("list.txt".as_ref(), ParserOptions::default()).await?;
//!     let config = PipelineConfig::new("out").with_transition("swoosh.mp4");
//!     let pipeline = AssemblyPipeline::new(config, CommandFetcher::new(), FfmpegToolkit::new());
//!
//!     let report = pipeline.run(&document).await?;
//!     println!("{} clips, {} cues", report.succeeded(), report.cue_count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod materialize;
pub mod media;
pub mod pipeline;
pub mod subtitle;
pub mod timeline;

pub use config::{FetcherKind, PipelineConfig, Settings};
pub use document::{parse_document, ClipId, Document, Entry, Locator, ParserOptions};
pub use error::{AssemblyError, Result};
pub use fetch::{ClipFetcher, CommandFetcher, HttpFetcher};
pub use materialize::{FetchedClip, Materializer};
pub use media::{FfmpegConfig, FfmpegToolkit, MediaToolkit, Normalizer};
pub use pipeline::{AssemblyPipeline, EntryFailure, EntryOutcome, PipelineReport, Stage};
pub use subtitle::{format_timestamp, synthesize, CaptionTrack, Cue, SrtWriter};
pub use timeline::{intersperse, TimedEntry, TimedTransition, Timeline};

/// Version of reelcat
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
