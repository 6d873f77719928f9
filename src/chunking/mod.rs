//! Transcript chunking for the map step.
//!
//! Splits a cleaned transcript into overlapping, boundary-aware character windows.
//! A chunk ends at the best boundary found near the end of its window, chosen by
//! priority from [`BoundarySource`]:
//!
//! 1. the later of a sentence end (`. `, `! `, `? ` or the same marks before a newline)
//!    and a `[mm:ss]` timestamp in the last 500 characters, if past 70% of the target;
//! 2. the last space, if past 90% of the target;
//! 3. a hard cut at the window edge.

use crate::config::ChunkingSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Timestamps further than this from the end of a window are not boundary candidates.
const TIMESTAMP_LOOKBACK_CHARS: usize = 500;

const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

/// A piece of the transcript sent to the completion service on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based position of this chunk.
    pub index: usize,
    /// Number of chunks produced for the transcript.
    pub total: usize,
    /// Trimmed chunk text.
    pub text: String,
    /// Character offset where this chunk's window starts in the transcript.
    #[serde(skip)]
    pub start: usize,
    /// Character offset (exclusive) where this chunk's window ends.
    #[serde(skip)]
    pub end: usize,
}

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target characters per chunk.
    pub target_chars: usize,
    /// Characters repeated at the start of the next chunk.
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: 12_000,
            overlap_chars: 300,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            target_chars: settings.target_chars,
            overlap_chars: settings.overlap_chars,
        }
    }
}

/// What ended a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySource {
    SentenceEnd,
    Timestamp,
    Whitespace,
    HardCut,
}

impl BoundarySource {
    /// Fraction of the target size a cut of this kind must lie past to be accepted.
    fn min_fraction(self) -> f64 {
        match self {
            BoundarySource::SentenceEnd | BoundarySource::Timestamp => 0.7,
            BoundarySource::Whitespace => 0.9,
            BoundarySource::HardCut => 0.0,
        }
    }
}

/// A candidate end for a chunk, in characters from the start of its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub source: BoundarySource,
    pub cut: usize,
}

/// Character-window chunker with sentence and timestamp aware boundaries.
pub struct TextChunker {
    config: ChunkingConfig,
    timestamp_regex: Regex,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        let timestamp_regex = Regex::new(r"\[\d{2,}:\d{2}\]").expect("Invalid regex");
        Self {
            config,
            timestamp_regex,
        }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into ordered, overlapping chunks.
    ///
    /// Text no longer than the target comes back as a single chunk. Every chunk in the
    /// result carries the same `total`, and indices run `1..=total`.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let chars = CharMap::new(text);
        let len = chars.len();
        let target = self.config.target_chars.max(1);

        if len <= target {
            return vec![Chunk {
                index: 1,
                total: 1,
                text: text.trim().to_string(),
                start: 0,
                end: len,
            }];
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut pos = 0;

        while pos < len {
            let window_end = pos + target;

            if window_end >= len {
                let tail = chars.slice(pos, len).trim();
                if !tail.is_empty() {
                    chunks.push(Chunk {
                        index: chunks.len() + 1,
                        total: 0,
                        text: tail.to_string(),
                        start: pos,
                        end: len,
                    });
                }
                break;
            }

            let window = chars.slice(pos, window_end);
            let boundary = self.find_boundary(window);
            let chunk_end = pos + boundary.cut;

            debug!(
                "Chunk window {}..{} cut at {} ({:?})",
                pos, window_end, chunk_end, boundary.source
            );

            let chunk_text = chars.slice(pos, chunk_end).trim();
            if !chunk_text.is_empty() {
                chunks.push(Chunk {
                    index: chunks.len() + 1,
                    total: 0,
                    text: chunk_text.to_string(),
                    start: pos,
                    end: chunk_end,
                });
            }

            // Step back by the overlap, but always make progress.
            let next = chunk_end.saturating_sub(self.config.overlap_chars);
            pos = if next > pos { next } else { chunk_end };
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total = total;
        }

        chunks
    }

    /// Pick where a full-size window should end.
    pub fn find_boundary(&self, window: &str) -> Boundary {
        let window_chars = window.chars().count();

        let punctuation = [sentence_end(window), self.last_timestamp(window, window_chars)]
            .into_iter()
            .flatten()
            .max_by_key(|b| b.cut);

        let target = self.config.target_chars as f64;

        [punctuation, last_whitespace(window)]
            .into_iter()
            .flatten()
            .find(|b| b.cut as f64 > target * b.source.min_fraction())
            .unwrap_or(Boundary {
                source: BoundarySource::HardCut,
                cut: window_chars,
            })
    }

    /// Position just before the last `[mm:ss]` token, if it sits near the window end.
    fn last_timestamp(&self, window: &str, window_chars: usize) -> Option<Boundary> {
        let found = self.timestamp_regex.find_iter(window).last()?;
        let cut = char_offset(window, found.start());

        if cut > window_chars.saturating_sub(TIMESTAMP_LOOKBACK_CHARS) {
            Some(Boundary {
                source: BoundarySource::Timestamp,
                cut,
            })
        } else {
            None
        }
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// Chunk a transcript with the given sizes.
pub fn chunk_transcript(text: &str, target_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    TextChunker::new(ChunkingConfig {
        target_chars,
        overlap_chars,
    })
    .chunk(text)
}

/// Cut just after the last sentence-ending punctuation mark.
fn sentence_end(window: &str) -> Option<Boundary> {
    let idx = SENTENCE_ENDINGS
        .iter()
        .filter_map(|ending| window.rfind(ending))
        .max()?;

    Some(Boundary {
        source: BoundarySource::SentenceEnd,
        cut: char_offset(window, idx) + 1,
    })
}

/// Cut just before the last space.
fn last_whitespace(window: &str) -> Option<Boundary> {
    let idx = window.rfind(' ')?;
    Some(Boundary {
        source: BoundarySource::Whitespace,
        cut: char_offset(window, idx),
    })
}

/// Number of characters before byte offset `byte` in `s`.
fn char_offset(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

/// Maps character positions to byte offsets so windows never split a code point.
struct CharMap<'a> {
    text: &'a str,
    offsets: Vec<usize>,
}

impl<'a> CharMap<'a> {
    fn new(text: &'a str) -> Self {
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        Self { text, offsets }
    }

    fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.offsets[start]..self.offsets[end]]
    }
}
