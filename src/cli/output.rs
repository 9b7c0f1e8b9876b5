//! Console delivery sink: renders released responses to the terminal.
//!
//! Stdout is the delivery surface; everything else (logs) goes to stderr, so
//! piping the moderator into another process sees only delivered replies.

use anyhow::Result;
use async_trait::async_trait;
use console::style;

use crate::domain::models::CandidateResponse;
use crate::domain::ports::DeliverySink;

pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliverySink for ConsoleSink {
    async fn deliver(&self, response: &CandidateResponse) -> Result<()> {
        let header = style(format!(
            "── {} · {} ──",
            response.priority, response.session_id
        ))
        .cyan()
        .bold();
        println!("\n{header}\n{}\n", response.text);
        Ok(())
    }
}
