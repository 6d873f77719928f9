//! Configuration settings for tldw.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub completion: CompletionSettings,
    pub chunking: ChunkingSettings,
    pub summarization: SummarizationSettings,
    pub transcript: TranscriptSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Settings for the text completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Chat model used for both chunk summaries and synthesis.
    pub model: String,
    /// API key. Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    /// Alternative API base URL (OpenAI-compatible servers).
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Sampling temperature. 0.0 is the most deterministic setting.
    pub temperature: f32,
    /// Output token cap for a single chunk summary.
    pub chunk_max_tokens: u32,
    /// Output token cap for the final synthesis.
    pub synthesis_max_tokens: u32,
    /// Ask the backend to constrain output to a JSON object.
    pub json_mode: bool,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            timeout_seconds: 120,
            temperature: 0.0,
            chunk_max_tokens: 1200,
            synthesis_max_tokens: 2000,
            json_mode: true,
        }
    }
}

impl CompletionSettings {
    /// Resolve the API key from settings or the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

/// Transcript chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target characters per chunk.
    pub target_chars: usize,
    /// Characters shared between neighbouring chunks.
    pub overlap_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_chars: 12_000,
            overlap_chars: 300,
        }
    }
}

/// Map/reduce summarization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    /// Additional attempts after the first one, per stage call.
    pub retry_count: u32,
    /// Maximum chunk summaries in flight at once.
    pub max_concurrent_chunks: usize,
    /// Cleaned transcripts shorter than this are rejected.
    pub min_transcript_chars: usize,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            retry_count: 1,
            max_concurrent_chunks: 3,
            min_transcript_chars: 50,
        }
    }
}

/// Caption retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSettings {
    /// Preferred caption languages, in order.
    pub languages: Vec<String>,
    /// Path or name of the yt-dlp executable.
    pub ytdlp_path: String,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TldwError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tldw")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.target_chars, 12_000);
        assert_eq!(settings.chunking.overlap_chars, 300);
        assert_eq!(settings.summarization.retry_count, 1);
        assert_eq!(settings.summarization.min_transcript_chars, 50);
        assert_eq!(settings.completion.temperature, 0.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [chunking]
            target_chars = 4000

            [completion]
            model = "gpt-4.1-mini"
            "#,
        )
        .unwrap();

        assert_eq!(settings.chunking.target_chars, 4000);
        assert_eq!(settings.chunking.overlap_chars, 300);
        assert_eq!(settings.completion.model, "gpt-4.1-mini");
        assert_eq!(settings.completion.timeout_seconds, 120);
        assert_eq!(settings.transcript.languages, vec!["en".to_string()]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.summarization.max_concurrent_chunks = 1;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.summarization.max_concurrent_chunks, 1);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.completion.model, "gpt-4o-mini");
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let settings = CompletionSettings {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.resolved_api_key().as_deref(), Some("sk-test"));
    }
}
