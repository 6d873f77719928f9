//! Caption retrieval through yt-dlp.
//!
//! Fetching takes two yt-dlp runs. The first lists the video's caption tracks, the
//! second writes the chosen track in the `json3` format into a scratch directory,
//! which is parsed into caption entries and then removed.

use super::{canonical_url, CaptionEntry, TranscriptSource};
use crate::config::TranscriptSettings;
use crate::error::{Result, TldwError};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// yt-dlp stderr fragments that mean the video itself cannot be read.
const UNAVAILABLE_MARKERS: [&str; 4] = [
    "video unavailable",
    "private video",
    "this video has been removed",
    "does not exist",
];

/// Attempts per fetch when yt-dlp fails for a transient reason.
const FETCH_ATTEMPTS: u32 = 3;

/// Chat replay that yt-dlp lists among the subtitles of past live streams.
const LIVE_CHAT: &str = "live_chat";

/// Caption source backed by the yt-dlp executable.
pub struct YtDlpTranscriptSource {
    program: String,
    languages: Vec<String>,
    retry_delay: Duration,
}

/// Track languages a video offers, split by origin.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptionTracks {
    /// Uploaded by the creator.
    pub manual: Vec<String>,
    /// Generated by speech recognition, including machine translations.
    pub automatic: Vec<String>,
}

/// The track to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackChoice {
    pub language: String,
    pub automatic: bool,
}

/// The slice of yt-dlp's info JSON that lists caption tracks.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    subtitles: BTreeMap<String, IgnoredAny>,
    #[serde(default)]
    automatic_captions: BTreeMap<String, IgnoredAny>,
}

impl From<VideoInfo> for CaptionTracks {
    fn from(info: VideoInfo) -> Self {
        Self {
            manual: info
                .subtitles
                .into_keys()
                .filter(|lang| lang != LIVE_CHAT)
                .collect(),
            automatic: info.automatic_captions.into_keys().collect(),
        }
    }
}

/// Pick a caption track.
///
/// Each preferred language is tried in order, manual before automatic. With no match,
/// any manual track wins over automatic ones, and among automatic tracks the original
/// spoken language (`<lang>-orig`) wins over machine translations.
pub fn select_track(tracks: &CaptionTracks, languages: &[String]) -> Option<TrackChoice> {
    let choice = |language: &str, automatic: bool| TrackChoice {
        language: language.to_string(),
        automatic,
    };

    for lang in languages {
        if let Some(found) = matching_language(&tracks.manual, lang) {
            return Some(choice(found, false));
        }
        if let Some(found) = matching_language(&tracks.automatic, lang) {
            return Some(choice(found, true));
        }
    }

    if let Some(first) = tracks.manual.first() {
        return Some(choice(first, false));
    }

    tracks
        .automatic
        .iter()
        .find(|lang| lang.ends_with("-orig"))
        .or_else(|| tracks.automatic.first())
        .map(|lang| choice(lang, true))
}

/// Exact language first, then a regional variant such as `en-US`.
fn matching_language<'a>(available: &'a [String], lang: &str) -> Option<&'a str> {
    let regional = format!("{}-", lang);
    available
        .iter()
        .find(|l| *l == lang)
        .or_else(|| available.iter().find(|l| l.starts_with(&regional)))
        .map(String::as_str)
}

/// Failures worth another attempt: tool hiccups and truncated subtitle files.
fn is_transient(err: &TldwError) -> bool {
    matches!(err, TldwError::ToolFailed(_) | TldwError::Json(_))
}

impl YtDlpTranscriptSource {
    pub fn new(settings: &TranscriptSettings) -> Self {
        Self {
            program: settings.ytdlp_path.clone(),
            languages: settings.languages.clone(),
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Pause between attempts after a transient failure.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run yt-dlp. `Ok(None)` means the video cannot be read.
    async fn run_ytdlp(&self, command: &mut Command, video_id: &str) -> Result<Option<Output>> {
        let result = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TldwError::ToolNotFound(self.program.clone()));
            }
            Err(e) => {
                return Err(TldwError::ToolFailed(format!("yt-dlp execution failed: {e}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lower = stderr.to_lowercase();
            if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
                warn!("Video {} is unavailable: {}", video_id, stderr.trim());
                return Ok(None);
            }
            return Err(TldwError::ToolFailed(format!("yt-dlp failed: {}", stderr.trim())));
        }

        Ok(Some(output))
    }

    /// List the caption tracks of a video.
    async fn list_tracks(&self, video_id: &str) -> Result<Option<CaptionTracks>> {
        let mut command = Command::new(&self.program);
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg(canonical_url(video_id));

        let Some(output) = self.run_ytdlp(&mut command, video_id).await? else {
            return Ok(None);
        };

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(Some(info.into()))
    }

    /// Write one caption track into `dir`. Returns `false` when the video cannot be read.
    async fn download_track(
        &self,
        video_id: &str,
        track: &TrackChoice,
        dir: &Path,
    ) -> Result<bool> {
        let template = dir.join("%(id)s.%(ext)s");
        let write_flag = if track.automatic {
            "--write-auto-subs"
        } else {
            "--write-subs"
        };

        let mut command = Command::new(&self.program);
        command
            .arg("--skip-download")
            .arg(write_flag)
            .arg("--sub-format")
            .arg("json3")
            .arg("--sub-langs")
            .arg(&track.language)
            .arg("--output")
            .arg(&template)
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(canonical_url(video_id));

        Ok(self.run_ytdlp(&mut command, video_id).await?.is_some())
    }

    async fn fetch_once(&self, video_id: &str) -> Result<Option<Vec<CaptionEntry>>> {
        let Some(tracks) = self.list_tracks(video_id).await? else {
            return Ok(None);
        };

        let Some(track) = select_track(&tracks, &self.languages) else {
            info!("Video {} has no caption tracks", video_id);
            return Ok(None);
        };
        debug!(
            "Using {} {} captions",
            if track.automatic { "automatic" } else { "manual" },
            track.language
        );

        let scratch = tempfile::tempdir()?;
        if !self.download_track(video_id, &track, scratch.path()).await? {
            return Ok(None);
        }

        let written = find_subtitle_file(scratch.path(), video_id, &track.language).await?;
        let Some(path) = written else {
            warn!("yt-dlp wrote no {} captions for {}", track.language, video_id);
            return Ok(None);
        };

        debug!("Parsing captions from {}", path.display());
        let content = tokio::fs::read_to_string(&path).await?;
        let entries = parse_json3(&content)?;

        Ok(Some(entries).filter(|e| !e.is_empty()))
    }
}

/// Locate the subtitle file yt-dlp wrote, by exact name first.
async fn find_subtitle_file(
    dir: &Path,
    video_id: &str,
    language: &str,
) -> Result<Option<PathBuf>> {
    let expected = dir.join(format!("{}.{}.json3", video_id, language));
    if tokio::fs::try_exists(&expected).await? {
        return Ok(Some(expected));
    }

    let mut others = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json3") {
            others.push(path);
        }
    }
    others.sort();

    Ok(others.into_iter().next())
}

#[async_trait]
impl TranscriptSource for YtDlpTranscriptSource {
    #[instrument(skip(self))]
    async fn fetch_captions(&self, video_id: &str) -> Result<Option<Vec<CaptionEntry>>> {
        info!("Fetching captions for {}", video_id);

        let mut attempt = 1;
        loop {
            match self.fetch_once(video_id).await {
                Ok(Some(entries)) => {
                    info!("Fetched {} caption entries", entries.len());
                    return Ok(Some(entries));
                }
                Ok(None) => return Ok(None),
                Err(e) if attempt < FETCH_ATTEMPTS && is_transient(&e) => {
                    warn!("Caption fetch attempt {}/{} failed: {}", attempt, FETCH_ATTEMPTS, e);
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: f64,
    #[serde(rename = "dDurationMs", default)]
    duration_ms: f64,
    #[serde(default)]
    segs: Vec<Json3Segment>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

/// Parse yt-dlp's `json3` subtitle format.
///
/// Events without text (styling windows, bare line breaks in auto captions) are skipped.
pub fn parse_json3(content: &str) -> Result<Vec<CaptionEntry>> {
    let doc: Json3 = serde_json::from_str(content)?;

    Ok(doc
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.replace('\n', " ");
            if text.trim().is_empty() {
                return None;
            }
            Some(CaptionEntry::new(
                text.trim(),
                event.start_ms / 1000.0,
                event.duration_ms / 1000.0,
            ))
        })
        .collect())
}
