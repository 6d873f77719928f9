//! Chunk command implementation.

use crate::chunking::{ChunkingConfig, TextChunker};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::{Context, Result};

/// Run the chunk command against a local text file.
pub fn run_chunk(
    file: &str,
    target: Option<usize>,
    overlap: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let path = Settings::expand_path(file);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut config = ChunkingConfig::from(&settings.chunking);
    if let Some(target) = target {
        config.target_chars = target;
    }
    if let Some(overlap) = overlap {
        config.overlap_chars = overlap;
    }

    if config.target_chars == 0 {
        return Err(anyhow::anyhow!("--target must be greater than zero"));
    }
    if config.overlap_chars >= config.target_chars {
        Output::warning("Overlap is not smaller than the target; chunks will not overlap.");
    }

    let chunker = TextChunker::new(config);
    let chunks = chunker.chunk(&text);

    Output::header(&format!("{} chunk(s)", chunks.len()));
    Output::kv("source", &path.display().to_string());
    Output::kv("characters", &text.trim().chars().count().to_string());
    Output::kv("target", &chunker.config().target_chars.to_string());
    Output::kv("overlap", &chunker.config().overlap_chars.to_string());
    println!();

    for chunk in &chunks {
        Output::chunk_info(chunk);
    }

    Ok(())
}
