//! Full assembly pipeline: fetch -> normalize -> probe -> concat -> captions
//!
//! Orchestrates the complete workflow from a source document to the final
//! video and its caption track. A clip that fails to download, normalize or
//! probe is reported and left out; it never aborts the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::document::{ClipId, Document, Entry};
use crate::error::{AssemblyError, Result};
use crate::fetch::ClipFetcher;
use crate::materialize::Materializer;
use crate::media::{normalized_path, MediaToolkit, Normalizer, NORMALIZED_EXTENSION};
use crate::subtitle::{synthesize, SrtWriter, SUBTITLE_FILENAME};
use crate::timeline::{TimedEntry, TimedTransition, Timeline};

/// Base name of the final outputs.
pub const OUT_BASE_NAME: &str = "out";

/// Base name of the transition's copy in the output directory.
pub const TRANSITION_BASE_NAME: &str = "transition";

/// Pipeline step an entry failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Locator line without a usable clip id
    Parse,
    Fetch,
    Normalize,
    Probe,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Fetch => "fetch",
            Self::Normalize => "normalize",
            Self::Probe => "probe",
        }
    }
}

/// Why an entry was left out of the video.
#[derive(Debug)]
pub struct EntryFailure {
    /// Line of the locator in the source document, when known
    pub line: Option<usize>,
    /// Locator as written (or the offending line for parse failures)
    pub locator: String,
    pub stage: Stage,
    pub error: AssemblyError,
}

impl EntryFailure {
    fn at(entry: &Entry, stage: Stage, error: AssemblyError) -> Self {
        Self {
            line: Some(entry.line()),
            locator: entry.locator().url().to_string(),
            stage,
            error,
        }
    }

    fn parse(error: AssemblyError) -> Self {
        let (line, locator) = match &error {
            AssemblyError::Locator { line, text } => (Some(*line), text.clone()),
            other => (None, other.to_string()),
        };
        Self {
            line,
            locator,
            stage: Stage::Parse,
            error,
        }
    }
}

/// Result of processing one entry
#[derive(Debug)]
pub enum EntryOutcome {
    Assembled(TimedEntry),
    Failed(EntryFailure),
}

impl EntryOutcome {
    #[must_use]
    pub fn as_assembled(&self) -> Option<&TimedEntry> {
        match self {
            Self::Assembled(timed) => Some(timed),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn as_failure(&self) -> Option<&EntryFailure> {
        match self {
            Self::Assembled(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Result of a pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    /// One outcome per locator line, in document order
    pub outcomes: Vec<EntryOutcome>,
    /// Normalized transition, if one was configured
    pub transition: Option<TimedTransition>,
    /// Number of files in the concatenated timeline
    pub timeline_len: usize,
    /// Concatenated video
    pub video_path: PathBuf,
    /// Caption track
    pub subtitle_path: PathBuf,
    /// Video with captions rendered in, when requested
    pub burned_path: Option<PathBuf>,
    /// Number of cues written
    pub cue_count: usize,
    /// Running time covered by the caption clock, in seconds
    pub total_secs: f64,
    /// Wall-clock processing time
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Entries that made it into the video, in order
    pub fn assembled(&self) -> impl Iterator<Item = &TimedEntry> {
        self.outcomes.iter().filter_map(EntryOutcome::as_assembled)
    }

    /// Entries that were left out, in order
    pub fn failures(&self) -> impl Iterator<Item = &EntryFailure> {
        self.outcomes.iter().filter_map(EntryOutcome::as_failure)
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.assembled().count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures().count()
    }
}

/// One lock per clip id, so entries listing the same clip never download
/// or convert it at the same time.
#[derive(Default)]
struct ClipLocks {
    inner: Mutex<HashMap<ClipId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClipLocks {
    fn get(&self, id: ClipId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }
}

/// Full assembly pipeline
pub struct AssemblyPipeline<F, M> {
    config: PipelineConfig,
    materializer: Materializer<F>,
    toolkit: M,
    clip_locks: ClipLocks,
}

impl<F: ClipFetcher, M: MediaToolkit> AssemblyPipeline<F, M> {
    /// Create a pipeline from its collaborators
    pub fn new(config: PipelineConfig, fetcher: F, toolkit: M) -> Self {
        let materializer = Materializer::new(fetcher, config.output_dir.clone())
            .with_timeout(config.call_timeout)
            .with_retries(config.fetch_retries, config.retry_backoff);

        Self {
            config,
            materializer,
            toolkit,
            clip_locks: ClipLocks::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    /// Run the whole pipeline over a document
    pub async fn run(&self, document: &Document) -> Result<PipelineReport> {
        let start_time = Instant::now();
        let output_dir = &self.config.output_dir;

        // Prepared before any download so a broken transition fails fast.
        let transition = match &self.config.transition {
            Some(source) => Some(self.prepare_transition(source).await.map_err(|e| {
                AssemblyError::Transition {
                    path: source.clone(),
                    source: Box::new(e),
                }
            })?),
            None => None,
        };

        let items: Vec<Result<Entry>> = document.entries().collect();
        info!(
            "Processing {} entries (concurrency {})",
            items.len(),
            self.config.concurrency
        );

        // `buffered` keeps results in document order whatever the finish order.
        let outcomes: Vec<EntryOutcome> = stream::iter(items)
            .map(|item| async move {
                match item {
                    Ok(entry) => self.process_entry(entry).await,
                    Err(err) => EntryOutcome::Failed(EntryFailure::parse(err)),
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        for failure in outcomes.iter().filter_map(EntryOutcome::as_failure) {
            warn!(
                "{} failed at {}: {}",
                failure.locator,
                failure.stage.as_str(),
                failure.error
            );
        }

        let survivors: Vec<TimedEntry> = outcomes
            .iter()
            .filter_map(EntryOutcome::as_assembled)
            .cloned()
            .collect();

        if survivors.is_empty() {
            return Err(AssemblyError::NothingToAssemble);
        }

        let timeline = Timeline::assemble(&survivors, transition.as_ref());
        let descriptor = timeline.write_descriptor(output_dir).await?;

        let video_path = self.output_path(&format!("{OUT_BASE_NAME}.{NORMALIZED_EXTENSION}"));
        info!("Concatenating {} files", timeline.len());
        self.toolkit.concat(&descriptor, &video_path).await?;

        let transition_secs = transition.as_ref().map_or(0.0, |t| t.duration_secs);
        let track = synthesize(&survivors, transition_secs);
        let subtitle_path = self.output_path(SUBTITLE_FILENAME);
        SrtWriter::new().write_to_file(&track, &subtitle_path).await?;

        let burned_path = if self.config.burn_subtitles {
            let path =
                self.output_path(&format!("{OUT_BASE_NAME}_with_subs.{NORMALIZED_EXTENSION}"));
            self.toolkit
                .burn_subtitles(&video_path, &subtitle_path, &path)
                .await?;
            Some(path)
        } else {
            None
        };

        let report = PipelineReport {
            outcomes,
            transition,
            timeline_len: timeline.len(),
            video_path,
            subtitle_path,
            burned_path,
            cue_count: track.cues.len(),
            total_secs: track.total_secs,
            elapsed: start_time.elapsed(),
        };

        info!(
            "{} of {} entries assembled, {} failed, {} cues, {:.1}s of video",
            report.succeeded(),
            report.outcomes.len(),
            report.failed(),
            report.cue_count,
            report.total_secs
        );

        Ok(report)
    }

    /// Fetch, normalize and probe a single entry.
    pub async fn process_entry(&self, entry: Entry) -> EntryOutcome {
        match self.try_process_entry(&entry).await {
            Ok(timed) => EntryOutcome::Assembled(timed),
            Err(failure) => EntryOutcome::Failed(failure),
        }
    }

    async fn try_process_entry(
        &self,
        entry: &Entry,
    ) -> std::result::Result<TimedEntry, EntryFailure> {
        let id = entry.locator().id();
        let lock = self.clip_locks.get(id);
        let _guard = lock.lock().await;

        let fetched = self
            .materializer
            .materialize(entry)
            .await
            .map_err(|e| EntryFailure::at(entry, Stage::Fetch, e))?;

        let path = Normalizer::new(&self.toolkit)
            .normalize(&fetched.raw_path)
            .await
            .map_err(|e| EntryFailure::at(entry, Stage::Normalize, e))?;

        let duration_secs = self
            .toolkit
            .probe_duration(&path)
            .await
            .map_err(|e| EntryFailure::at(entry, Stage::Probe, e))?;

        info!("{id} ({duration_secs:.2}s) done");
        Ok(TimedEntry::new(fetched.entry, path, duration_secs))
    }

    /// Copy the transition into the output directory, normalize and probe it.
    async fn prepare_transition(&self, source: &Path) -> Result<TimedTransition> {
        let mut local = self.output_path(TRANSITION_BASE_NAME);
        if let Some(ext) = source.extension() {
            local.set_extension(ext);
        }

        if needs_copy(source, &local).await? {
            fs::copy(source, &local).await?;
            // A conversion of the previous transition must not be reused.
            let stale = normalized_path(&local);
            if stale != local {
                if let Err(err) = fs::remove_file(&stale).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        return Err(err.into());
                    }
                }
            }
            debug!("Copied transition to {}", local.display());
        }

        let path = Normalizer::new(&self.toolkit).normalize(&local).await?;
        let duration_secs = self.toolkit.probe_duration(&path).await?;
        info!("Transition {} ({duration_secs:.2}s)", path.display());

        Ok(TimedTransition {
            path,
            duration_secs,
        })
    }
}

/// Whether `source` must be copied to `dest`: skipped when `dest` is the same
/// file or already holds identical bytes.
async fn needs_copy(source: &Path, dest: &Path) -> Result<bool> {
    let source_meta = fs::metadata(source).await?;
    if !fs::try_exists(dest).await? {
        return Ok(true);
    }
    if fs::canonicalize(source).await? == fs::canonicalize(dest).await? {
        return Ok(false);
    }
    if fs::metadata(dest).await?.len() != source_meta.len() {
        return Ok(true);
    }
    Ok(fs::read(source).await? != fs::read(dest).await?)
}
