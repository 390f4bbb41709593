//! Line-oriented text chunking with structural break points.
//!
//! Long inputs are split into ordered chunks that never break inside a line.
//! Lines recognised as boundaries (scene headings by default) close the
//! running chunk early once it is past half of the budget, so a scene is not
//! cut just before the hard limit.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default character budget per chunk.
pub const DEFAULT_MAX_CHARS: usize = 8000;

/// One bounded slice of an oversized input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Ordinal id (`C001`, `C002`, ...)
    pub chunk_id: String,

    /// Slice content, trimmed
    pub text: String,

    /// Char offset of the first line in the original input
    pub start_char: usize,

    /// Char offset just past the last line (and its line break)
    pub end_char: usize,
}

impl Chunk {
    /// Format the id for the chunk at `index` (0-based).
    ///
    /// Padded to three digits; ids past `C999` grow wider, so order them by
    /// length before text.
    pub fn id_for(index: usize) -> String {
        format!("C{:03}", index + 1)
    }

    /// Length of the chunk text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn scene_heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+[A-Z]?\.?\s+)?(?:INT\.?\s*/\s*EXT\.?|EXT\.?\s*/\s*INT\.?|I/E\.?|INT\.|EXT\.)")
            .expect("scene heading pattern is valid")
    })
}

/// Whether a line looks like a screenplay scene heading.
///
/// Accepts an optional scene number (`12`, `12A.`) followed by `INT.`,
/// `EXT.`, `INT./EXT.`, `EXT./INT.` or `I/E`.
pub fn is_scene_heading(line: &str) -> bool {
    scene_heading_pattern().is_match(line)
}

/// Whether `text` is too long to be sent as a single unit.
pub fn needs_chunking(text: &str, max_chars: usize) -> bool {
    text.chars().count() > max_chars
}

/// Split `text` into chunks of at most `max_chars`, breaking at scene headings.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    Chunker::new(max_chars).chunk(text)
}

/// Split `text` with a caller-supplied boundary predicate.
pub fn chunk_text_with<F>(text: &str, max_chars: usize, is_boundary: F) -> Vec<Chunk>
where
    F: Fn(&str) -> bool,
{
    Chunker::with_boundary(max_chars, is_boundary).chunk(text)
}

/// Chunking algorithm parameterised by a boundary predicate.
pub struct Chunker<F = fn(&str) -> bool> {
    max_chars: usize,
    is_boundary: F,
}

impl Chunker {
    /// Chunker that breaks at scene headings.
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            is_boundary: is_scene_heading,
        }
    }
}

impl<F> Chunker<F>
where
    F: Fn(&str) -> bool,
{
    /// Chunker with a custom notion of structural boundary.
    pub fn with_boundary(max_chars: usize, is_boundary: F) -> Self {
        Self {
            max_chars,
            is_boundary,
        }
    }

    /// Character budget per chunk.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into ordered chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let total_chars = text.chars().count();
        let mut chunks = Vec::new();
        let mut buffer = Buffer::default();
        let mut offset = 0;

        for line in text.split('\n') {
            let line_chars = line.chars().count();

            if !buffer.is_empty() {
                let overflows = buffer.chars + line_chars + 1 > self.max_chars;
                let early_break =
                    buffer.chars > self.max_chars / 2 && (self.is_boundary)(line);
                if overflows || early_break {
                    buffer.flush(&mut chunks, offset.min(total_chars));
                }
            }

            buffer.push(line, line_chars, offset);
            offset += line_chars + 1;
        }

        buffer.flush(&mut chunks, offset.min(total_chars));
        chunks
    }
}

/// Running accumulation of lines for the chunk being built.
#[derive(Default)]
struct Buffer {
    text: String,
    chars: usize,
    start: usize,
}

impl Buffer {
    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn push(&mut self, line: &str, line_chars: usize, offset: usize) {
        if self.is_empty() {
            self.start = offset;
        }
        self.text.push_str(line);
        self.text.push('\n');
        self.chars += line_chars + 1;
    }

    /// Emit the buffer as a chunk unless it is only whitespace.
    fn flush(&mut self, chunks: &mut Vec<Chunk>, end: usize) {
        let text = self.text.trim();
        if !text.is_empty() {
            chunks.push(Chunk {
                chunk_id: Chunk::id_for(chunks.len()),
                text: text.to_string(),
                start_char: self.start,
                end_char: end,
            });
        }
        self.text.clear();
        self.chars = 0;
    }
}
