//! End-to-end pipeline tests with in-process fetcher and media doubles.
//!
//! The doubles write real files into a temporary output directory so the
//! on-disk cache rules are exercised exactly as in production.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use reelcat::{
    AssemblyError, AssemblyPipeline, ClipFetcher, Document, Locator, MediaToolkit, ParserOptions,
    PipelineConfig, Stage,
};

/// Serves `clip-<id>` as the body of every clip.
#[derive(Default)]
struct FakeFetcher {
    fetches: Arc<AtomicUsize>,
    /// Clip ids that fail to download
    broken: HashSet<u64>,
    /// Per-clip delay, to finish out of order under concurrency
    delays: HashMap<u64, Duration>,
}

#[async_trait]
impl ClipFetcher for FakeFetcher {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, locator: &Locator) -> anyhow::Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let id = locator.id().0;
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        if self.broken.contains(&id) {
            anyhow::bail!("HTTP 404 for {id}");
        }
        Ok(Bytes::from(format!("clip-{id}")))
    }
}

/// Copies on transcode, reports durations by file stem and records the
/// concat descriptor it was given.
#[derive(Default)]
struct FakeToolkit {
    durations: HashMap<String, f64>,
    /// File stems whose transcode fails
    corrupt: HashSet<String>,
    transcodes: Arc<AtomicUsize>,
    descriptors: Arc<Mutex<Vec<String>>>,
    concat_fails: bool,
    burns: Arc<AtomicUsize>,
}

impl FakeToolkit {
    fn with_durations(durations: &[(&str, f64)]) -> Self {
        Self {
            durations: durations
                .iter()
                .map(|(stem, secs)| ((*stem).to_string(), *secs))
                .collect(),
            ..Default::default()
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn transcode(&self, input: &Path, output: &Path) -> reelcat::Result<()> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        if self.corrupt.contains(&stem(input)) {
            return Err(AssemblyError::Transcode {
                path: input.to_path_buf(),
                reason: "Invalid data found when processing input".into(),
            });
        }
        std::fs::copy(input, output)?;
        Ok(())
    }

    async fn probe_duration(&self, input: &Path) -> reelcat::Result<f64> {
        self.durations
            .get(&stem(input))
            .copied()
            .ok_or_else(|| AssemblyError::Probe {
                path: input.to_path_buf(),
                reason: "no duration".into(),
            })
    }

    async fn concat(&self, descriptor: &Path, output: &Path) -> reelcat::Result<()> {
        let listing = std::fs::read_to_string(descriptor)?;
        self.descriptors.lock().unwrap().push(listing);
        if self.concat_fails {
            return Err(AssemblyError::Concatenation {
                reason: "Non-monotonous DTS in output stream".into(),
            });
        }
        std::fs::write(output, b"joined")?;
        Ok(())
    }

    async fn burn_subtitles(
        &self,
        video: &Path,
        _subtitles: &Path,
        output: &Path,
    ) -> reelcat::Result<()> {
        self.burns.fetch_add(1, Ordering::SeqCst);
        std::fs::copy(video, output)?;
        Ok(())
    }
}

fn document(text: &str) -> Document {
    Document::from_text(text, ParserOptions::default())
}

const THREE_CLIPS: &str = "\
https://www.tiktok.com/@a/video/1
First

https://www.tiktok.com/@a/video/2
Second
https://www.tiktok.com/@a/video/3?lang=en
Third
";

#[tokio::test]
async fn captions_follow_clip_durations() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document("https://www.tiktok.com/@a/video/11\nHello\nhttps://www.tiktok.com/@a/video/22\n");
    let toolkit = FakeToolkit::with_durations(&[("11", 2.0), ("22", 3.0)]);
    let descriptors = Arc::clone(&toolkit.descriptors);

    let pipeline = AssemblyPipeline::new(
        PipelineConfig::new(dir.path()),
        FakeFetcher::default(),
        toolkit,
    );
    let report = pipeline.run(&doc).await.unwrap();

    let srt = std::fs::read_to_string(dir.path().join("out.srt")).unwrap();
    assert_eq!(srt, "1\n00:00:00,000 --> 00:00:02,000\nHello\n\n");
    assert_eq!(report.cue_count, 1);
    assert!((report.total_secs - 5.0).abs() < 1e-9);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.video_path, dir.path().join("out.mts"));
    assert!(report.video_path.exists());
    assert!(report.burned_path.is_none());

    let descriptors = descriptors.lock().unwrap();
    assert_eq!(descriptors.as_slice(), ["file '11.mts'\nfile '22.mts'\n"]);
    assert!(dir.path().join("11.mp4").exists());
    assert!(dir.path().join("22.mts").exists());
}

#[tokio::test]
async fn failed_entry_is_dropped_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();
    let transition = media.path().join("swoosh.mp4");
    std::fs::write(&transition, b"swoosh").unwrap();

    let mut toolkit = FakeToolkit::with_durations(&[("1", 2.0), ("2", 4.0), ("3", 3.0), ("transition", 0.5)]);
    toolkit.corrupt.insert("2".into());
    let descriptors = Arc::clone(&toolkit.descriptors);

    let config = PipelineConfig::new(dir.path()).with_transition(&transition);
    let pipeline = AssemblyPipeline::new(config, FakeFetcher::default(), toolkit);
    let report = pipeline.run(&document(THREE_CLIPS)).await.unwrap();

    assert_eq!(report.succeeded(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Normalize);
    assert_eq!(failures[0].line, Some(4));
    assert!(matches!(failures[0].error, AssemblyError::Transcode { .. }));

    assert_eq!(report.timeline_len, 3);
    assert_eq!(
        descriptors.lock().unwrap().as_slice(),
        ["file '1.mts'\nfile 'transition.mts'\nfile '3.mts'\n"]
    );

    let srt = std::fs::read_to_string(dir.path().join("out.srt")).unwrap();
    assert_eq!(
        srt,
        "1\n00:00:00,000 --> 00:00:02,000\nFirst\n\n\
         2\n00:00:02,500 --> 00:00:05,500\nThird\n\n"
    );
    assert!(!dir.path().join("2.mts").exists());
    assert!(dir.path().join("transition.mp4").exists());
}

#[tokio::test]
async fn download_failure_is_tagged_with_fetch_stage() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher {
        broken: HashSet::from([1]),
        ..Default::default()
    };
    let toolkit = FakeToolkit::with_durations(&[("2", 1.0), ("3", 1.0)]);

    let pipeline = AssemblyPipeline::new(PipelineConfig::new(dir.path()), fetcher, toolkit);
    let report = pipeline.run(&document(THREE_CLIPS)).await.unwrap();

    let failure = report.failures().next().unwrap();
    assert_eq!(failure.stage, Stage::Fetch);
    assert_eq!(failure.locator, "https://www.tiktok.com/@a/video/1");
    assert!(!dir.path().join("1.mp4").exists());

    let srt = std::fs::read_to_string(dir.path().join("out.srt")).unwrap();
    assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,000\nSecond\n"));
}

#[tokio::test]
async fn unparsable_locator_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(
        "https://www.tiktok.com/@a/live\nlost caption\nhttps://www.tiktok.com/@a/video/5\nKept\n",
    );
    let toolkit = FakeToolkit::with_durations(&[("5", 1.5)]);

    let pipeline =
        AssemblyPipeline::new(PipelineConfig::new(dir.path()), FakeFetcher::default(), toolkit);
    let report = pipeline.run(&doc).await.unwrap();

    let failure = report.failures().next().unwrap();
    assert_eq!(failure.stage, Stage::Parse);
    assert_eq!(failure.line, Some(1));
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.cue_count, 1);
}

#[tokio::test]
async fn rerun_reuses_downloads_and_conversions() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(THREE_CLIPS);
    let durations = [("1", 1.0), ("2", 1.0), ("3", 1.0)];

    let first_fetcher = FakeFetcher::default();
    let first_fetches = Arc::clone(&first_fetcher.fetches);
    AssemblyPipeline::new(
        PipelineConfig::new(dir.path()),
        first_fetcher,
        FakeToolkit::with_durations(&durations),
    )
    .run(&doc)
    .await
    .unwrap();
    assert_eq!(first_fetches.load(Ordering::SeqCst), 3);

    let fetcher = FakeFetcher::default();
    let fetches = Arc::clone(&fetcher.fetches);
    let toolkit = FakeToolkit::with_durations(&durations);
    let transcodes = Arc::clone(&toolkit.transcodes);
    let report = AssemblyPipeline::new(PipelineConfig::new(dir.path()), fetcher, toolkit)
        .run(&doc)
        .await
        .unwrap();

    assert_eq!(fetches.load(Ordering::SeqCst), 0);
    assert_eq!(transcodes.load(Ordering::SeqCst), 0);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("1.mp4")).unwrap(),
        "clip-1"
    );
}

#[tokio::test]
async fn no_survivors_produces_no_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher {
        broken: HashSet::from([1, 2, 3]),
        ..Default::default()
    };
    let toolkit = FakeToolkit::default();
    let descriptors = Arc::clone(&toolkit.descriptors);

    let err = AssemblyPipeline::new(PipelineConfig::new(dir.path()), fetcher, toolkit)
        .run(&document(THREE_CLIPS))
        .await
        .unwrap_err();

    assert!(matches!(err, AssemblyError::NothingToAssemble));
    assert!(descriptors.lock().unwrap().is_empty());
    assert!(!dir.path().join("out.srt").exists());
    assert!(!dir.path().join("ffmpeg_input.txt").exists());
}

#[tokio::test]
async fn broken_transition_aborts_before_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();
    let transition = media.path().join("swoosh.mp4");
    std::fs::write(&transition, b"swoosh").unwrap();

    let mut toolkit = FakeToolkit::with_durations(&[("1", 1.0)]);
    toolkit.corrupt.insert("transition".into());
    let fetcher = FakeFetcher::default();
    let fetches = Arc::clone(&fetcher.fetches);

    let config = PipelineConfig::new(dir.path()).with_transition(&transition);
    let err = AssemblyPipeline::new(config, fetcher, toolkit)
        .run(&document(THREE_CLIPS))
        .await
        .unwrap_err();

    assert!(matches!(err, AssemblyError::Transition { .. }));
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_run_keeps_document_order() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher {
        delays: HashMap::from([
            (1, Duration::from_millis(60)),
            (2, Duration::from_millis(30)),
        ]),
        ..Default::default()
    };
    let toolkit = FakeToolkit::with_durations(&[("1", 1.0), ("2", 2.0), ("3", 3.0)]);
    let descriptors = Arc::clone(&toolkit.descriptors);

    let config = PipelineConfig::new(dir.path()).with_concurrency(3);
    let report = AssemblyPipeline::new(config, fetcher, toolkit)
        .run(&document(THREE_CLIPS))
        .await
        .unwrap();

    let order: Vec<u64> = report
        .assembled()
        .map(|timed| timed.entry.locator().id().0)
        .collect();
    assert_eq!(order, [1, 2, 3]);
    assert_eq!(
        descriptors.lock().unwrap().as_slice(),
        ["file '1.mts'\nfile '2.mts'\nfile '3.mts'\n"]
    );

    let srt = std::fs::read_to_string(dir.path().join("out.srt")).unwrap();
    assert!(srt.contains("2\n00:00:01,000 --> 00:00:03,000\nSecond\n"));
    assert!(srt.contains("3\n00:00:03,000 --> 00:00:06,000\nThird\n"));
}

#[tokio::test]
async fn burned_copy_is_written_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let toolkit = FakeToolkit::with_durations(&[("1", 1.0), ("2", 1.0), ("3", 1.0)]);
    let burns = Arc::clone(&toolkit.burns);

    let config = PipelineConfig::new(dir.path()).with_burn_subtitles(true);
    let report = AssemblyPipeline::new(config, FakeFetcher::default(), toolkit)
        .run(&document(THREE_CLIPS))
        .await
        .unwrap();

    assert_eq!(burns.load(Ordering::SeqCst), 1);
    assert_eq!(
        report.burned_path.as_deref(),
        Some(dir.path().join("out_with_subs.mts").as_path())
    );
}

#[tokio::test]
async fn unmeasurable_clip_is_dropped_at_probe() {
    let dir = tempfile::tempdir().unwrap();
    let toolkit = FakeToolkit::with_durations(&[("1", 2.0), ("3", 1.0)]);

    let pipeline =
        AssemblyPipeline::new(PipelineConfig::new(dir.path()), FakeFetcher::default(), toolkit);
    let report = pipeline.run(&document(THREE_CLIPS)).await.unwrap();

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Probe);
    assert_eq!(failures[0].locator, "https://www.tiktok.com/@a/video/2");
    assert!(matches!(failures[0].error, AssemblyError::Probe { .. }));

    let srt = std::fs::read_to_string(dir.path().join("out.srt")).unwrap();
    assert_eq!(
        srt,
        "1\n00:00:00,000 --> 00:00:02,000\nFirst\n\n\
         2\n00:00:02,000 --> 00:00:03,000\nThird\n\n"
    );
}

#[tokio::test]
async fn failed_concatenation_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut toolkit = FakeToolkit::with_durations(&[("1", 1.0), ("2", 1.0), ("3", 1.0)]);
    toolkit.concat_fails = true;
    let descriptors = Arc::clone(&toolkit.descriptors);

    let result = AssemblyPipeline::new(PipelineConfig::new(dir.path()), FakeFetcher::default(), toolkit)
        .run(&document(THREE_CLIPS))
        .await;

    assert!(matches!(result, Err(AssemblyError::Concatenation { .. })));
    assert_eq!(descriptors.lock().unwrap().len(), 1);
    assert!(!dir.path().join("out.mts").exists());
    assert!(!dir.path().join("out.srt").exists());
}

#[tokio::test]
async fn repeated_clip_is_fetched_once_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document(
        "https://www.tiktok.com/@a/video/5\nOnce\nhttps://www.tiktok.com/@a/video/5\nTwice\n",
    );
    let fetcher = FakeFetcher {
        delays: HashMap::from([(5, Duration::from_millis(20))]),
        ..Default::default()
    };
    let fetches = Arc::clone(&fetcher.fetches);
    let toolkit = FakeToolkit::with_durations(&[("5", 1.0)]);
    let transcodes = Arc::clone(&toolkit.transcodes);
    let descriptors = Arc::clone(&toolkit.descriptors);

    let config = PipelineConfig::new(dir.path()).with_concurrency(2);
    let report = AssemblyPipeline::new(config, fetcher, toolkit)
        .run(&doc)
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 0);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(transcodes.load(Ordering::SeqCst), 1);
    assert_eq!(
        descriptors.lock().unwrap().as_slice(),
        ["file '5.mts'\nfile '5.mts'\n"]
    );
    assert_eq!(report.cue_count, 2);
}

#[tokio::test]
async fn transition_never_overwrites_a_cached_clip() {
    let dir = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();
    let transition = media.path().join("7.mp4");
    std::fs::write(&transition, b"swoosh").unwrap();

    let toolkit = FakeToolkit::with_durations(&[("7", 1.0), ("8", 1.0), ("transition", 0.5)]);
    let config = PipelineConfig::new(dir.path()).with_transition(&transition);
    let doc = document("https://www.tiktok.com/@a/video/7\nA\nhttps://www.tiktok.com/@a/video/8\nB\n");
    AssemblyPipeline::new(config, FakeFetcher::default(), toolkit)
        .run(&doc)
        .await
        .unwrap();

    assert_eq!(std::fs::read(dir.path().join("7.mp4")).unwrap(), b"clip-7");
    assert_eq!(std::fs::read(dir.path().join("7.mts")).unwrap(), b"clip-7");
    assert_eq!(std::fs::read(dir.path().join("transition.mts")).unwrap(), b"swoosh");
}

#[tokio::test]
async fn replaced_transition_is_converted_again() {
    let dir = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();
    let transition = media.path().join("swoosh.mp4");
    let doc = document(THREE_CLIPS);
    let durations = [("1", 1.0), ("2", 1.0), ("3", 1.0), ("transition", 0.5)];

    std::fs::write(&transition, b"swoosh").unwrap();
    AssemblyPipeline::new(
        PipelineConfig::new(dir.path()).with_transition(&transition),
        FakeFetcher::default(),
        FakeToolkit::with_durations(&durations),
    )
    .run(&doc)
    .await
    .unwrap();

    // Same size, different content.
    std::fs::write(&transition, b"swish!").unwrap();
    let toolkit = FakeToolkit::with_durations(&durations);
    let transcodes = Arc::clone(&toolkit.transcodes);
    AssemblyPipeline::new(
        PipelineConfig::new(dir.path()).with_transition(&transition),
        FakeFetcher::default(),
        toolkit,
    )
    .run(&doc)
    .await
    .unwrap();

    assert_eq!(transcodes.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(dir.path().join("transition.mts")).unwrap(), b"swish!");
}
