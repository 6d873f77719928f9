//! Transcript retrieval and cleanup.
//!
//! A [`TranscriptSource`] returns raw caption entries for a video. The
//! [`TranscriptCleaner`] turns them into the single-string transcript the chunker
//! works on: one `[mm:ss] text` line per caption, joined with spaces.

mod cleaner;
mod youtube;
mod ytdlp;

pub use cleaner::{clean_captions, format_timestamp, TranscriptCleaner};
pub use youtube::{canonical_url, extract_video_id, is_video_id};
pub use ytdlp::{parse_json3, select_track, CaptionTracks, TrackChoice, YtDlpTranscriptSource};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One caption as delivered by the captions provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    /// Caption text, possibly with markup.
    pub text: String,
    /// Start time in seconds.
    pub start_seconds: f64,
    /// Duration in seconds.
    pub duration_seconds: f64,
}

impl CaptionEntry {
    pub fn new(text: impl Into<String>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
        }
    }
}

/// Trait for caption providers.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch captions for a video ID.
    ///
    /// Returns `Ok(None)` when the video has no captions or does not exist.
    /// Errors are reserved for transport or tool failures.
    async fn fetch_captions(&self, video_id: &str) -> Result<Option<Vec<CaptionEntry>>>;
}
