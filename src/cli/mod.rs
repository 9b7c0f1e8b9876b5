//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

pub use output::ConsoleSink;

#[derive(Parser)]
#[command(
    name = "colloquy",
    about = "Live conversation moderator: ingests an utterance stream, decides when to intervene, and schedules delivery",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the moderation pipeline for one session, reading utterances as
    /// JSONL from stdin (or a transcript file)
    Run(commands::run::RunArgs),

    /// Load and validate the configuration, then print the effective values
    Check(commands::check::CheckArgs),
}

/// Print an error chain and exit non-zero.
pub fn handle_error(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
    std::process::exit(1);
}
