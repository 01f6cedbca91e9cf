//! `reelcat` CLI - assemble a captioned compilation from a clip list

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use reelcat::FetcherKind;

#[derive(Parser, Debug)]
#[command(name = "reelcat")]
#[command(about = "Stitch clips listed in an annotated text file into one video with SRT captions")]
#[command(version)]
pub struct Cli {
    /// Input list of clips (locator lines followed by caption lines)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for the cache, the video and the captions
    #[arg(short, long)]
    pub output: PathBuf,

    /// Transition video inserted between consecutive clips
    #[arg(short, long)]
    pub transition: Option<PathBuf>,

    /// How clips are downloaded
    #[arg(long, value_enum)]
    pub fetcher: Option<FetcherKind>,

    /// Download URL template for the http fetcher ({id} and {url} are substituted)
    #[arg(long)]
    pub url_template: Option<String>,

    /// Downloader binary for the command fetcher (default: yt-dlp)
    #[arg(long)]
    pub downloader: Option<String>,

    /// Lines starting with this prefix are clip locators
    #[arg(long)]
    pub locator_prefix: Option<String>,

    /// Clips downloaded and converted in parallel
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Time limit in seconds for each download or ffmpeg call
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Extra download attempts per clip
    #[arg(long)]
    pub retries: Option<u32>,

    /// Also write out_with_subs.mts with the captions rendered into the picture
    #[arg(long)]
    pub burn_subtitles: bool,

    /// Settings file (default: ~/.config/reelcat/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    cmd::assemble::cmd_assemble(&cli).await
}
