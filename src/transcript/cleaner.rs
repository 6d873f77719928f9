//! Caption cleanup into the timestamped transcript format.

use super::CaptionEntry;
use regex::Regex;

const MUSIC_GLYPHS: [char; 4] = ['♪', '♫', '♬', '♩'];

const HTML_ENTITIES: [(&str, &str); 7] = [
    ("&nbsp;", " "),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
];

/// Strips markup and caption artifacts and prefixes each line with its timestamp.
pub struct TranscriptCleaner {
    tag_regex: Regex,
    bracket_regex: Regex,
    whitespace_regex: Regex,
}

impl TranscriptCleaner {
    pub fn new() -> Self {
        Self {
            tag_regex: Regex::new(r"<[^>]*>").expect("Invalid regex"),
            // Sound cues such as [Music] or [Applause], and empty brackets.
            bracket_regex: Regex::new(r"\[[^\]]*\]").expect("Invalid regex"),
            whitespace_regex: Regex::new(r"\s+").expect("Invalid regex"),
        }
    }

    /// Clean the text of a single caption.
    pub fn clean_text(&self, text: &str) -> String {
        let without_tags = self.tag_regex.replace_all(text, " ");

        let mut decoded = without_tags.into_owned();
        for (entity, replacement) in HTML_ENTITIES {
            decoded = decoded.replace(entity, replacement);
        }

        let without_brackets = self.bracket_regex.replace_all(&decoded, " ");
        let without_music: String = without_brackets
            .chars()
            .filter(|c| !MUSIC_GLYPHS.contains(c))
            .collect();

        self.whitespace_regex
            .replace_all(&without_music, " ")
            .trim()
            .to_string()
    }

    /// Build the transcript string. Captions that clean to nothing are dropped.
    pub fn clean(&self, entries: &[CaptionEntry]) -> String {
        entries
            .iter()
            .filter_map(|entry| {
                let text = self.clean_text(&entry.text);
                if text.is_empty() {
                    None
                } else {
                    Some(format!("[{}] {}", format_timestamp(entry.start_seconds), text))
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for TranscriptCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Clean captions with the default cleaner.
pub fn clean_captions(entries: &[CaptionEntry]) -> String {
    TranscriptCleaner::new().clean(entries)
}

/// Format seconds as `mm:ss`. Minutes keep counting past 59.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}
