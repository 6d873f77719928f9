//! Configuration module for tldw.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ChunkPrompts, Prompts, SynthesisPrompts};
pub use settings::{
    ChunkingSettings, CompletionSettings, GeneralSettings, PromptSettings, Settings,
    SummarizationSettings, TranscriptSettings,
};
