//! YouTube URL handling.

use url::Url;

/// Hosts that serve the standard `/watch`, `/embed`, `/shorts` and `/v` paths.
const YOUTUBE_HOSTS: [&str; 4] = [
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
];

/// Whether `candidate` looks like an 11-character YouTube video ID.
pub fn is_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Extract the video ID from a YouTube URL or a bare ID.
///
/// Accepts `watch?v=` (with `v` anywhere in the query), `youtu.be/`, `/embed/`,
/// `/shorts/`, `/live/` and `/v/` forms, with or without scheme and `www.`.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?.trim_start_matches("www.");

    let candidate = if host == "youtu.be" {
        url.path_segments()?.next().map(str::to_string)
    } else if YOUTUBE_HOSTS.contains(&host) {
        let mut segments = url.path_segments()?;
        match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            "embed" | "shorts" | "live" | "v" => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    let candidate = candidate?;
    is_video_id(&candidate).then_some(candidate)
}

/// The canonical watch URL for a video ID.
pub fn canonical_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        let expected = Some("dQw4w9WgXcQ".to_string());

        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=42"), expected);
        assert_eq!(extract_video_id("https://youtube.com/embed/dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"), expected);
        assert_eq!(
            extract_video_id("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=1s"),
            expected
        );
        assert_eq!(extract_video_id("youtube.com/watch?v=dQw4w9WgXcQ"), expected);
        assert_eq!(extract_video_id("  dQw4w9WgXcQ  "), expected);
    }

    #[test]
    fn test_rejects_non_video_input() {
        assert_eq!(extract_video_id("not a url"), None);
        assert_eq!(extract_video_id(""), None);
        assert_eq!(extract_video_id("not-a-video-id"), None);
        assert_eq!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/playlist?list=PLtest"), None);
    }

    #[test]
    fn test_canonical_url() {
        assert_eq!(
            canonical_url("dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }
}
