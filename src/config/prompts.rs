//! Prompt templates for tldw.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    /// Prompts for summarizing a single transcript chunk.
    pub chunk: ChunkPrompts,
    /// Prompts for merging chunk summaries into the final report.
    pub synthesis: SynthesisPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Prompts for the per-chunk (map) step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ChunkPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a careful analyst of video transcripts. You summarize one excerpt at a time.

Rules:
- Use ONLY the text between the BEGIN CHUNK and END CHUNK markers.
- Do not add facts, names or numbers from outside knowledge.
- Timestamps in the excerpt look like [mm:ss]; reuse them verbatim when quoting.
- Respond with a single JSON object and nothing else. No markdown, no commentary."#
                .to_string(),

            user: r#"This is chunk {{chunk_index}} of {{chunk_total}} from a video transcript.

<<<BEGIN CHUNK>>>
{{chunk_text}}
<<<END CHUNK>>>

Return JSON with exactly these fields:
{
  "chunk_index": {{chunk_index}},
  "chunk_total": {{chunk_total}},
  "chunk_summary": "2-4 factual sentences about this chunk only",
  "key_points": ["ordered list of the main points"],
  "notable_quotes": [{"time": "mm:ss", "quote": "verbatim quote from the chunk"}],
  "claims_numbers": ["verbatim claims, statistics and numbers as stated"],
  "verify_flags": ["statements that a viewer should double-check"]
}

Every field is required. Use empty arrays when nothing applies."#
                .to_string(),
        }
    }
}

/// Prompts for the synthesis (reduce) step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisPrompts {
    pub system: String,
    pub user: String,
}

impl Default for SynthesisPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an editor who merges partial summaries of one video into a single report.

Rules:
- Rely ONLY on the JSON array of chunk summaries you are given.
- Never re-derive or invent facts that are not present in that array.
- Keep chronological order when listing highlights.
- Respond with a single JSON object and nothing else. No markdown, no commentary."#
                .to_string(),

            user: r#"Video ID: {{video_id}}
Video URL: {{video_url}}
Title: {{title}}

The video was split into {{chunks_count}} chunks. Their summaries, in order:

{{chunk_summaries}}

Return JSON with exactly these fields:
{
  "status": "ok",
  "video_id": "{{video_id}}",
  "video_url": "{{video_url}}",
  "title": "{{title}}",
  "final_short_summary": "one short paragraph",
  "final_key_takeaways": ["most important takeaways"],
  "top_claims_numbers": ["the most significant claims and numbers, verbatim"],
  "highlights": [{"time": "mm:ss", "quote": "quote taken from the chunk summaries"}],
  "next_steps": ["what a viewer could do or look into next"],
  "confidence": "high | medium | low",
  "chunks_count": {{chunks_count}}
}

"confidence" must be exactly one of "high", "medium" or "low". Every field is required."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&std::collections::HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let chunk_path = custom_path.join("chunk.toml");
            if chunk_path.exists() {
                let content = std::fs::read_to_string(&chunk_path)?;
                prompts.chunk = toml::from_str(&content)?;
            }

            let synthesis_path = custom_path.join("synthesis.toml");
            if synthesis_path.exists() {
                let content = std::fs::read_to_string(&synthesis_path)?;
                prompts.synthesis = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(
        &self,
        template: &str,
        vars: &std::collections::HashMap<String, String>,
    ) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.chunk.user.contains("<<<BEGIN CHUNK>>>"));
        assert!(prompts.chunk.user.contains("<<<END CHUNK>>>"));
        assert!(prompts.synthesis.user.contains("{{chunk_summaries}}"));
        for field in [
            "chunk_summary",
            "key_points",
            "notable_quotes",
            "claims_numbers",
            "verify_flags",
        ] {
            assert!(prompts.chunk.user.contains(field), "missing {field}");
        }
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_call_site_variables_override_custom() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("audience".to_string(), "engineers".to_string());
        prompts.variables.insert("title".to_string(), "from config".to_string());

        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "from call".to_string());

        let rendered = prompts.render_with_custom("{{title}} for {{audience}}", &vars);
        assert_eq!(rendered, "from call for engineers");
    }

    #[test]
    fn test_custom_dir_overrides_chunk_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("chunk.toml"),
            "system = \"custom system\"\nuser = \"custom {{chunk_text}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.chunk.system, "custom system");
        assert_eq!(prompts.synthesis.system, SynthesisPrompts::default().system);
    }
}
