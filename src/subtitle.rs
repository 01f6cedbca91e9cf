//! Caption track synthesis
//!
//! Walks the surviving entries once, keeping a running clock, and emits one
//! SRT cue per captioned entry. Captionless entries still occupy their slot
//! on the timeline, and every entry is followed by the transition's duration.

use std::fmt::Write as FmtWrite;
use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::error::Result;
use crate::timeline::TimedEntry;

/// File name of the caption track inside the output directory.
pub const SUBTITLE_FILENAME: &str = "out.srt";

/// One timed subtitle block
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    /// Sequence number, starting at 1
    pub index: usize,
    /// Start time in seconds
    pub start_secs: f64,
    /// End time in seconds
    pub end_secs: f64,
    /// Caption text (may contain newlines)
    pub text: String,
}

/// Cues plus the total running time they were computed against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionTrack {
    pub cues: Vec<Cue>,
    /// Clock value after the last entry
    pub total_secs: f64,
}

/// Compute the caption track for entries laid out in order, each followed by
/// `transition_secs` of transition (0 when there is none).
#[must_use]
pub fn synthesize(entries: &[TimedEntry], transition_secs: f64) -> CaptionTrack {
    let mut clock = 0.0_f64;
    let mut cues = Vec::new();

    for timed in entries {
        let duration = timed.duration_secs;
        let text = timed.entry.raw_caption().trim();

        if !text.is_empty() {
            cues.push(Cue {
                index: cues.len() + 1,
                start_secs: clock,
                end_secs: clock + duration,
                text: text.to_string(),
            });
        }

        clock += duration + transition_secs;
    }

    CaptionTrack {
        cues,
        total_secs: clock,
    }
}

/// Format seconds as an SRT timestamp (HH:MM:SS,mmm).
///
/// Milliseconds are truncated, not rounded. Hours grow past two digits when
/// needed. Negative and non-finite values render as zero.
#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
    let millis = if seconds.is_finite() && seconds > 0.0 {
        // Summed durations can land just under a millisecond boundary.
        (seconds * 1000.0 + MILLIS_EPSILON).floor()
    } else {
        0.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_millis = millis as u64;

    let hours = total_millis / 3_600_000;
    let minutes = total_millis / 60_000 % 60;
    let secs = total_millis / 1000 % 60;
    let millis = total_millis % 1000;

    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Tolerance, in milliseconds, for float error in probed durations.
const MILLIS_EPSILON: f64 = 1e-6;

/// SRT (`SubRip`) renderer
#[derive(Debug, Clone, Default)]
pub struct SrtWriter;

impl SrtWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render every cue as `index`, `start --> end`, text, blank line.
    #[must_use]
    pub fn render(&self, track: &CaptionTrack) -> String {
        let mut output = String::new();

        // Writing to a String cannot fail.
        for cue in &track.cues {
            let _ = writeln!(output, "{}", cue.index);
            let _ = writeln!(
                output,
                "{} --> {}",
                format_timestamp(cue.start_secs),
                format_timestamp(cue.end_secs)
            );
            let _ = writeln!(output, "{}", cue.text);
            let _ = writeln!(output);
        }

        output
    }

    /// Write the rendered track to a file
    pub async fn write_to_file(&self, track: &CaptionTrack, path: &Path) -> Result<()> {
        fs::write(path, self.render(track)).await?;
        info!("Wrote {} cues to {}", track.cues.len(), path.display());
        Ok(())
    }
}
