//! CLI command implementations.

mod chunk;
mod config;
mod summarize;
mod transcript;

pub use chunk::run_chunk;
pub use config::run_config;
pub use summarize::run_summarize;
pub use transcript::run_transcript;

use crate::cli::Output;
use crate::config::Settings;

/// Print `content` to stdout, or write it to `path`.
fn write_output(path: Option<&str>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let path = Settings::expand_path(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, format!("{}\n", content))?;
            Output::info(&format!("Wrote {}", path.display()));
        }
        None => println!("{}", content),
    }
    Ok(())
}
