//! The `check` command: load, validate, and print the effective config.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::infrastructure::config::ConfigLoader;

#[derive(Args)]
pub struct CheckArgs {
    /// Config file to load instead of the .colloquy/ hierarchy
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    println!("configuration is valid");
    println!("  assistant name:        {}", config.moderator.assistant_name);
    println!("  summary window:        {}s", config.aggregator.summary_window_secs);
    println!(
        "  topic inference:       every {} messages or {}s",
        config.aggregator.topic_message_interval, config.aggregator.topic_time_interval_secs
    );
    println!("  silence threshold:     {}s", config.scheduler.silence_threshold_secs);
    println!(
        "  delivery targets:      P1 {}s, P2/P3 {}s, expiry {}s",
        config.scheduler.p1_target_secs,
        config.scheduler.p2_p3_target_secs,
        config.scheduler.expiration_secs
    );
    println!(
        "  background scan:       after {}s, every {}s",
        config.orchestrator.background_startup_delay_secs,
        config.orchestrator.background_interval_secs
    );
    println!("  model:                 {}", config.model.model);
    println!("  fast model:            {}", config.model.fast_model);
    println!("  database:              {}", config.database.path);
    Ok(())
}
