//! Summarization is gated by elapsed time alone: message volume never
//! triggers it, and an idle tick after the window elapses does.

mod common;

use std::sync::Arc;
use std::time::Duration;

use colloquy::domain::models::{AggregatorConfig, BusConfig, SessionConfig, Utterance};
use colloquy::services::{ContextAggregator, ConversationBus};

use common::{RecordingStore, ScriptedCapabilities};

fn aggregator() -> (ContextAggregator, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let aggregator = ContextAggregator::new(
        Arc::new(ConversationBus::new()),
        Arc::new(ScriptedCapabilities {
            summary: "sixteen messages about enzymes".to_string(),
            ..ScriptedCapabilities::default()
        }),
        store.clone(),
        AggregatorConfig::default(),
        BusConfig::default(),
        SessionConfig::default(),
    );
    (aggregator, store)
}

#[tokio::test(start_paused = true)]
async fn sixteen_messages_in_seventy_seconds_do_not_summarize() {
    let (aggregator, store) = aggregator();
    let session = "seminar";

    // Sixteen utterances spread over seventy seconds.
    for sequence in 1..=16u64 {
        aggregator
            .ingest(
                session,
                Utterance::human(sequence, "alice", format!("observation number {sequence}")),
            )
            .await
            .unwrap();
        if sequence < 16 {
            tokio::time::advance(Duration::from_millis(4_666)).await;
        }
    }

    aggregator.maybe_summarize(session).await;
    let view = aggregator.view(session);
    assert_eq!(view.buffer.len(), 16, "volume alone must not trigger a summary");
    assert!(view.summary.text.is_empty());
    assert!(store.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_tick_past_the_window_summarizes_and_clears() {
    let (aggregator, store) = aggregator();
    let session = "seminar";

    for sequence in 1..=16u64 {
        aggregator
            .ingest(
                session,
                Utterance::human(sequence, "alice", format!("observation number {sequence}")),
            )
            .await
            .unwrap();
        if sequence < 16 {
            tokio::time::advance(Duration::from_millis(4_666)).await;
        }
    }

    // Nobody speaks again; at 121s since the first buffered message the next
    // tick produces the summary.
    tokio::time::advance(Duration::from_secs(51)).await;
    aggregator.maybe_summarize(session).await;

    let view = aggregator.view(session);
    assert!(view.buffer.is_empty());
    assert_eq!(view.summary.text, "sixteen messages about enzymes");
    assert_eq!(view.summary.covers_messages, (1, 16));
    assert_eq!(view.summary.message_count, 16);

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].covers_end, 16);

    // A later cycle extends coverage additively from the pinned start.
    aggregator
        .ingest(session, Utterance::human(17, "bob", "one more point"))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(121)).await;
    aggregator.maybe_summarize(session).await;
    assert_eq!(aggregator.view(session).summary.covers_messages, (1, 17));
    assert_eq!(aggregator.view(session).summary.message_count, 17);
}
