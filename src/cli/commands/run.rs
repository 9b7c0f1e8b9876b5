//! The `run` command: wires the components together and drives one session.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::ConsoleSink;
use crate::domain::models::{Config, IngestRecord};
use crate::domain::ports::{Capabilities, DeliverySink, SummaryStore};
use crate::infrastructure::claude::{ModelCapabilities, ModelClient};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::database::{DatabaseConnection, SqliteSummaryStore};
use crate::infrastructure::logging::Logger;
use crate::services::bus::keys;
use crate::services::{
    ContextAggregator, ConversationBus, DeliveryScheduler, Orchestrator, TriggerDetector,
};

#[derive(Args)]
pub struct RunArgs {
    /// Session identifier
    #[arg(long, default_value = "default")]
    pub session: String,

    /// Config file to load instead of the .colloquy/ hierarchy
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read the utterance stream from a JSONL transcript file instead of
    /// stdin
    #[arg(long)]
    pub transcript: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let _logger = Logger::init(&config.logging)?;

    info!(session = %args.session, "starting moderation pipeline");

    let bus = Arc::new(ConversationBus::new());

    let client = Arc::new(ModelClient::new(&config.model)?);
    let capabilities: Arc<dyn Capabilities> = Arc::new(ModelCapabilities::new(
        client,
        config.model.clone(),
        config.moderator.clone(),
    ));

    let connection = DatabaseConnection::new(&config.database)
        .await
        .context("failed to open summary database")?;
    let store: Arc<dyn SummaryStore> = Arc::new(SqliteSummaryStore::new(connection.pool().clone()));
    let sink: Arc<dyn DeliverySink> = Arc::new(ConsoleSink::new());

    let aggregator = Arc::new(ContextAggregator::new(
        bus.clone(),
        capabilities.clone(),
        store,
        config.aggregator.clone(),
        config.bus.clone(),
        config.sessions.clone(),
    ));
    let detector = Arc::new(TriggerDetector::new(
        bus.clone(),
        capabilities.clone(),
        config.sessions.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        bus.clone(),
        capabilities,
        config.moderator.clone(),
        config.orchestrator.clone(),
    ));
    let scheduler = Arc::new(DeliveryScheduler::new(
        bus.clone(),
        sink,
        config.scheduler.clone(),
        config.sessions.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    {
        let detector = detector.clone();
        let session = args.session.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            detector.run(&session, shutdown).await;
        }));
    }
    {
        let aggregator = aggregator.clone();
        let session = args.session.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            aggregator.run(&session, shutdown).await;
        }));
    }
    {
        let orchestrator = orchestrator.clone();
        let session = args.session.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            orchestrator.run_reactive(&session, shutdown).await;
        }));
    }
    {
        let orchestrator = orchestrator.clone();
        let session = args.session.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            orchestrator.run_background(&session, shutdown).await;
        }));
    }
    {
        let scheduler = scheduler.clone();
        let session = args.session.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            scheduler.run(&session, shutdown).await;
        }));
    }

    // Ingest gateway: the transcription boundary. Assigns sequence numbers
    // and feeds the session ingest queue until the stream ends.
    {
        let bus = bus.clone();
        let session = args.session.clone();
        let transcript = args.transcript.clone();
        tasks.push(tokio::spawn(async move {
            let result = match transcript {
                Some(path) => match tokio::fs::File::open(&path).await {
                    Ok(file) => ingest_stream(&bus, &session, BufReader::new(file)).await,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "failed to open transcript");
                        Ok(())
                    }
                },
                None => ingest_stream(&bus, &session, BufReader::new(tokio::io::stdin())).await,
            };
            if let Err(err) = result {
                warn!(%err, "ingest gateway stopped");
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        task.abort();
        let _ = task.await;
    }

    info!("moderation pipeline stopped");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Reads newline-delimited JSON utterance records and pushes them onto the
/// ingest queue with bus-assigned sequence numbers.
async fn ingest_stream<R: AsyncRead + Unpin>(
    bus: &ConversationBus,
    session_id: &str,
    reader: BufReader<R>,
) -> Result<()> {
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<IngestRecord>(line) {
            Ok(record) => {
                let sequence = bus.incr(&keys::sequence(session_id));
                let utterance = record.into_utterance(sequence);
                if let Err(err) = bus.push(&keys::ingest(session_id), &utterance) {
                    warn!(%err, "failed to enqueue utterance");
                }
            }
            Err(err) => warn!(%err, "skipping malformed utterance record"),
        }
    }
    info!(session_id, "utterance stream ended");
    Ok(())
}
