use std::time::Duration;

use anyhow::{bail, Context, Result};

use reelcat::{
    AssemblyError, AssemblyPipeline, ClipFetcher, CommandFetcher, Document, FetcherKind,
    FfmpegConfig, FfmpegToolkit, HttpFetcher, ParserOptions, PipelineConfig, Settings,
};

use crate::Cli;

pub async fn cmd_assemble(cli: &Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    if !cli.input.is_file() {
        bail!("input document {} does not exist or is not a file", cli.input.display());
    }
    ensure_output_dir(cli)?;

    let mut options = ParserOptions::default();
    if let Some(prefix) = cli.locator_prefix.clone().or(settings.locator_prefix.clone()) {
        options = options.with_locator_prefix(prefix);
    }
    let document = Document::load(&cli.input, options)
        .await
        .with_context(|| format!("reading input document {}", cli.input.display()))?;

    let timeout = Duration::from_secs(cli.timeout.or(settings.timeout_secs).unwrap_or(300));
    let mut config = PipelineConfig::new(&cli.output)
        .with_call_timeout(timeout)
        .with_concurrency(cli.jobs.or(settings.concurrency).unwrap_or(1))
        .with_fetch_retries(cli.retries.or(settings.fetch_retries).unwrap_or(0))
        .with_burn_subtitles(cli.burn_subtitles || settings.burn_subtitles.unwrap_or(false));
    if let Some(ref transition) = cli.transition {
        if !transition.is_file() {
            bail!("transition {} does not exist or is not a file", transition.display());
        }
        config = config.with_transition(transition);
    }

    let fetcher = build_fetcher(cli, &settings)?;
    let toolkit = FfmpegToolkit::with_config(build_ffmpeg_config(&settings, timeout));
    for (program, available) in toolkit.check_available().await {
        if !available {
            tracing::warn!("{program} not found, clip conversion will fail");
        }
    }

    eprintln!("🎬 Assembling: {}", cli.input.display());
    eprintln!("   Output: {}", cli.output.display());
    eprintln!("   Clips listed: {}", document.locator_count());
    eprintln!("   Fetcher: {}", fetcher.name());
    if let Some(ref transition) = config.transition {
        eprintln!("   Transition: {}", transition.display());
    }

    let pipeline = AssemblyPipeline::new(config, fetcher, toolkit);
    let report = pipeline
        .run(&document)
        .await
        .with_context(|| format!("assembling {}", cli.input.display()))?;

    eprintln!("\n✅ Assembled in {:.1}s", report.elapsed.as_secs_f64());
    eprintln!("   Video: {}", report.video_path.display());
    eprintln!("   Captions: {} ({} cues)", report.subtitle_path.display(), report.cue_count);
    if let Some(ref burned) = report.burned_path {
        eprintln!("   With captions: {}", burned.display());
    }
    eprintln!(
        "   Clips: {} ok, {} failed, {:.1}s total",
        report.succeeded(),
        report.failed(),
        report.total_secs
    );
    for failure in report.failures() {
        let line = failure.line.map(|l| format!("line {l}: ")).unwrap_or_default();
        eprintln!("   ❌ {line}{} ({})", failure.locator, failure.stage.as_str());
    }

    Ok(())
}

fn ensure_output_dir(cli: &Cli) -> Result<()> {
    if cli.output.is_dir() {
        return Ok(());
    }
    if cli.output.exists() {
        bail!("output path {} exists and is not a directory", cli.output.display());
    }

    std::fs::create_dir_all(&cli.output).map_err(|source| AssemblyError::Directory {
        path: cli.output.clone(),
        source,
    })?;
    tracing::info!("Created output directory {}", cli.output.display());
    Ok(())
}

fn build_fetcher(cli: &Cli, settings: &Settings) -> Result<Box<dyn ClipFetcher>> {
    let kind = cli.fetcher.or(settings.fetcher).unwrap_or_default();

    match kind {
        FetcherKind::Http => {
            let template = cli
                .url_template
                .clone()
                .or(settings.url_template.clone())
                .context("the http fetcher needs --url-template (or url_template in the config file)")?;
            Ok(Box::new(HttpFetcher::new(template)?))
        }
        FetcherKind::Command => {
            let mut fetcher = CommandFetcher::new();
            if let Some(program) = cli.downloader.as_ref().or(settings.downloader.as_ref()) {
                fetcher = fetcher.with_program(program);
            }
            Ok(Box::new(fetcher))
        }
    }
}

fn build_ffmpeg_config(settings: &Settings, timeout: Duration) -> FfmpegConfig {
    let mut config = FfmpegConfig::default().with_timeout(timeout);
    if let Some(ref path) = settings.ffmpeg_path {
        config = config.with_ffmpeg_path(path);
    }
    if let Some(ref path) = settings.ffprobe_path {
        config = config.with_ffprobe_path(path);
    }
    config
}
