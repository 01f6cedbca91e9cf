//! Source document parsing
//!
//! A source document is plain UTF-8 text. Every line starting with the
//! locator prefix opens a new entry; the non-blank lines after it, up to the
//! next locator line, form that entry's caption.
//!
//! ```text
//! https://www.tiktok.com/@someone/video/7012345678901234567?lang=en
//! first caption line
//! second caption line
//!
//! https://www.tiktok.com/@other/video/7012345678901234568
//! ```

use std::fmt;
use std::iter::Enumerate;
use std::mem;
use std::path::Path;
use std::str::SplitInclusive;

use tracing::debug;

use crate::error::{AssemblyError, Result};

/// Prefix that marks a locator line unless configured otherwise.
pub const DEFAULT_LOCATOR_PREFIX: &str = "https://www.tiktok.com";

/// Numeric clip identifier extracted from a locator URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote clip locator: the URL as written plus the id parsed out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    url: String,
    id: ClipId,
}

impl Locator {
    /// Parse a locator line. Returns `None` when no clip id can be extracted.
    ///
    /// The id is the text between `/video/` and the next `?` (or the end of
    /// the line), trimmed.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let url = line.trim();
        let (_, tail) = url.split_once("/video/")?;
        let raw_id = tail.split('?').next().unwrap_or(tail).trim();
        let id = raw_id.parse::<u64>().ok()?;
        Some(Self {
            url: url.to_string(),
            id: ClipId(id),
        })
    }

    /// Original URL, trimmed of surrounding whitespace.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Clip identifier.
    #[must_use]
    pub fn id(&self) -> ClipId {
        self.id
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.url)
    }
}

/// One clip to include in the final video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    locator: Locator,
    caption: String,
    line: usize,
}

impl Entry {
    /// Create an entry with an empty caption.
    #[must_use]
    pub fn new(locator: Locator, line: usize) -> Self {
        Self {
            locator,
            caption: String::new(),
            line,
        }
    }

    /// Append a caption line verbatim.
    #[must_use]
    pub fn with_caption_line(mut self, line: &str) -> Self {
        self.push_caption_line(line);
        self
    }

    fn push_caption_line(&mut self, line: &str) {
        self.caption.push_str(line);
        if !line.ends_with('\n') {
            self.caption.push('\n');
        }
    }

    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Caption lines as written, line breaks included.
    #[must_use]
    pub fn raw_caption(&self) -> &str {
        &self.caption
    }

    /// Caption with trailing whitespace removed.
    #[must_use]
    pub fn caption(&self) -> &str {
        self.caption.trim_end()
    }

    /// Whether the entry has any caption text at all.
    #[must_use]
    pub fn has_caption(&self) -> bool {
        !self.caption.trim().is_empty()
    }

    /// 1-based line number of the locator line.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }
}

/// Parser settings
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Lines starting with this prefix are locator lines
    pub locator_prefix: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            locator_prefix: DEFAULT_LOCATOR_PREFIX.to_string(),
        }
    }
}

impl ParserOptions {
    #[must_use]
    pub fn with_locator_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.locator_prefix = prefix.into();
        self
    }
}

/// What the parser is currently attaching caption lines to.
enum Slot {
    Empty,
    Open(Entry),
    /// Locator line whose id could not be extracted; its caption lines are dropped.
    Broken(AssemblyError),
}

impl Slot {
    fn into_item(self) -> Option<Result<Entry>> {
        match self {
            Self::Empty => None,
            Self::Open(entry) => Some(Ok(entry)),
            Self::Broken(err) => Some(Err(err)),
        }
    }
}

/// Lazy iterator over the entries of a document, in document order.
///
/// Yields one item per locator line. A locator line without a usable clip id
/// yields `Err(AssemblyError::Locator)` in its position.
pub struct EntryParser<'a> {
    lines: Enumerate<SplitInclusive<'a, char>>,
    prefix: &'a str,
    slot: Slot,
    finished: bool,
}

impl<'a> EntryParser<'a> {
    fn new(text: &'a str, options: &'a ParserOptions) -> Self {
        Self {
            lines: text.split_inclusive('\n').enumerate(),
            prefix: &options.locator_prefix,
            slot: Slot::Empty,
            finished: false,
        }
    }

    fn open_slot(line_no: usize, line: &str) -> Slot {
        match Locator::parse(line) {
            Some(locator) => Slot::Open(Entry::new(locator, line_no)),
            None => Slot::Broken(AssemblyError::Locator {
                line: line_no,
                text: line.trim().to_string(),
            }),
        }
    }
}

impl Iterator for EntryParser<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        for (idx, line) in self.lines.by_ref() {
            let line_no = idx + 1;

            if line.starts_with(self.prefix) {
                let previous = mem::replace(&mut self.slot, Self::open_slot(line_no, line));
                if let Some(item) = previous.into_item() {
                    return Some(item);
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            match &mut self.slot {
                Slot::Open(entry) => entry.push_caption_line(line),
                Slot::Empty => debug!("line {line_no}: caption text before any locator, skipped"),
                Slot::Broken(_) => debug!("line {line_no}: caption for an unusable locator, skipped"),
            }
        }

        self.finished = true;
        mem::replace(&mut self.slot, Slot::Empty).into_item()
    }
}

/// Parse document text into entries.
pub fn parse_document<'a>(text: &'a str, options: &'a ParserOptions) -> EntryParser<'a> {
    EntryParser::new(text, options)
}

/// A loaded source document.
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    options: ParserOptions,
}

impl Document {
    /// Wrap already-loaded document text.
    #[must_use]
    pub fn from_text(text: impl Into<String>, options: ParserOptions) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }

    /// Read a document from disk.
    pub async fn load(path: &Path, options: ParserOptions) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_text(text, options))
    }

    /// Iterate the entries from the start. Can be called any number of times.
    pub fn entries(&self) -> EntryParser<'_> {
        parse_document(&self.text, &self.options)
    }

    /// Number of locator lines in the document.
    #[must_use]
    pub fn locator_count(&self) -> usize {
        self.entries().count()
    }
}
