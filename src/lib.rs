//! tldw - too long; didn't watch
//!
//! Turns a YouTube video into a structured, hierarchical summary.
//!
//! # Overview
//!
//! The pipeline runs in fixed stages, each of which can end the run with a typed
//! error result:
//!
//! 1. Extract the video ID from the URL
//! 2. Fetch captions (yt-dlp) and clean them into a `[mm:ss] text` transcript
//! 3. Split the transcript into overlapping chunks at natural boundaries
//! 4. Summarize every chunk into a structured record (map)
//! 5. Merge the ordered chunk records into one report (reduce)
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `transcript` - Caption retrieval, URL parsing and cleanup
//! - `chunking` - Boundary-aware transcript chunking
//! - `completion` - Text-completion backend abstraction (OpenAI)
//! - `summarize` - Chunk summaries, synthesis and the shared retry discipline
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use tldw::config::Settings;
//! use tldw::orchestrator::{Orchestrator, PipelineResult};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(&settings)?;
//!
//!     match orchestrator.process_video_url("https://youtu.be/dQw4w9WgXcQ").await {
//!         PipelineResult::Ok(report) => println!("{}", report.final_short_summary),
//!         PipelineResult::Error(err) => eprintln!("{}: {}", err.error_code, err.message),
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod summarize;
pub mod transcript;

pub use error::{Result, TldwError};
