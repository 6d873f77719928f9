//! CLI module for tldw.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// tldw - too long; didn't watch
///
/// Turns a YouTube video into a structured JSON summary: captions are cleaned,
/// split into overlapping chunks, summarized one by one, then merged into a report.
#[derive(Parser, Debug)]
#[command(name = "tldw")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize a YouTube video into a JSON report
    Summarize {
        /// YouTube URL or video ID
        url: String,

        /// Write the JSON result to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Print compact JSON on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Print the cleaned, timestamped transcript of a video
    Transcript {
        /// YouTube URL or video ID
        url: String,

        /// Write the transcript to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show how a local transcript file would be chunked
    Chunk {
        /// Path to a text file
        file: String,

        /// Target characters per chunk (defaults to the configured value)
        #[arg(long)]
        target: Option<usize>,

        /// Characters shared between neighbouring chunks (defaults to the configured value)
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
