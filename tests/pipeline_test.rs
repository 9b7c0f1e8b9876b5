//! End-to-end flow: explicit address → decision → P0 enqueue → immediate
//! delivery → follow-up window.

mod common;

use std::sync::Arc;

use colloquy::domain::models::{
    AggregatorConfig, BusConfig, Decision, DecisionPath, ModeratorConfig, OrchestratorConfig,
    Origin, SchedulerConfig, SessionConfig, TaskKind, TriggerSignal, Utterance,
};
use colloquy::services::bus::keys;
use colloquy::services::{
    ContextAggregator, ConversationBus, DeliveryScheduler, Orchestrator, SpokeFlag,
    TriggerDetector,
};

use common::{RecordingSink, RecordingStore, ScriptedCapabilities};

struct Pipeline {
    bus: Arc<ConversationBus>,
    detector: TriggerDetector,
    aggregator: ContextAggregator,
    orchestrator: Orchestrator,
    scheduler: DeliveryScheduler,
    sink: Arc<RecordingSink>,
}

fn pipeline(capabilities: ScriptedCapabilities) -> Pipeline {
    let bus = Arc::new(ConversationBus::new());
    let capabilities: Arc<dyn colloquy::Capabilities> = Arc::new(capabilities);
    let sink = Arc::new(RecordingSink::default());

    Pipeline {
        detector: TriggerDetector::new(bus.clone(), capabilities.clone(), SessionConfig::default()),
        aggregator: ContextAggregator::new(
            bus.clone(),
            capabilities.clone(),
            Arc::new(RecordingStore::default()),
            AggregatorConfig::default(),
            BusConfig::default(),
            SessionConfig::default(),
        ),
        orchestrator: Orchestrator::new(
            bus.clone(),
            capabilities,
            ModeratorConfig::default(),
            OrchestratorConfig::default(),
        ),
        scheduler: DeliveryScheduler::new(
            bus.clone(),
            sink.clone(),
            SchedulerConfig::default(),
            SessionConfig::default(),
        ),
        bus,
        sink,
    }
}

/// Absorbs everything on the context queue into the aggregator and
/// republishes state, standing in for one pass of the aggregator loop.
async fn drain_context(pipeline: &Pipeline, session: &str) {
    while let Some(utterance) = pipeline.bus.pop::<Utterance>(&keys::context(session)) {
        match utterance.origin {
            Origin::Human => pipeline.aggregator.ingest(session, utterance).await.unwrap(),
            Origin::Synthesized => pipeline
                .aggregator
                .record_synthesized(session, utterance)
                .await
                .unwrap(),
        }
    }
    pipeline.aggregator.publish_state(session);
}

#[tokio::test(start_paused = true)]
async fn explicit_question_is_answered_on_the_next_tick() {
    let pipeline = pipeline(ScriptedCapabilities {
        wake_word: Some("sage".to_string()),
        decision: Some(Decision {
            path: DecisionPath::Respond,
            reasoning: "direct question about DNA replication".into(),
            active_domains: vec!["Biology".into()],
            missing_domains: vec!["Biology".into()],
            urgency: 8,
            task: TaskKind::ProvidePerspective,
        }),
        ..ScriptedCapabilities::default()
    });
    let session = "study-group";

    // A speaker addresses the assistant directly.
    let question = Utterance::human(1, "alice", "sage, how does DNA replicate?");
    let signal = pipeline
        .detector
        .on_utterance(session, &question)
        .await
        .unwrap()
        .expect("explicit address must trigger");
    assert!(!signal.potential_follow_up);

    drain_context(&pipeline, session).await;

    // The decision pipeline consumes the signal and queues exactly one P0.
    let signal: TriggerSignal = pipeline.bus.pop(&keys::triggers(session)).unwrap();
    pipeline
        .orchestrator
        .process_trigger(session, signal)
        .await
        .unwrap();
    assert_eq!(
        pipeline
            .bus
            .len(&keys::responses(session, colloquy::Priority::P0)),
        1
    );

    // The conversation is NOT silent (a message just arrived), yet the next
    // tick delivers anyway: P0 bypasses silence gating.
    let delivered = pipeline.scheduler.tick(session).await.unwrap().unwrap();
    assert!(delivered.text.contains("Biology perspective"));
    assert_eq!(delivered.trigger_sequence, Some(1));
    assert_eq!(pipeline.sink.delivered().len(), 1);

    // Delivery opened the follow-up window, tagged with the trigger message.
    let flag: SpokeFlag = pipeline.bus.get(&keys::spoke(session)).unwrap();
    assert_eq!(flag.sequence, Some(1));

    // The synthesized reply flowed back into context without re-triggering.
    drain_context(&pipeline, session).await;
    assert!(pipeline.bus.is_empty(&keys::triggers(session)));
    let view = pipeline.aggregator.view(session);
    assert_eq!(view.synthesized.len(), 1);

    // A plain follow-up question (no wake word) now rides the open window.
    let follow_up = Utterance::human(2, "bob", "and what unzips the two strands?");
    let signal = pipeline
        .detector
        .on_utterance(session, &follow_up)
        .await
        .unwrap()
        .expect("open window must emit a provisional signal");
    assert!(signal.potential_follow_up);
}

#[tokio::test(start_paused = true)]
async fn continue_decision_delivers_nothing() {
    let pipeline = pipeline(ScriptedCapabilities {
        wake_word: Some("sage".to_string()),
        decision: None,
        ..ScriptedCapabilities::default()
    });
    let session = "study-group";

    let mention = Utterance::human(1, "alice", "sage, never mind, we figured it out");
    pipeline.detector.on_utterance(session, &mention).await.unwrap();
    drain_context(&pipeline, session).await;

    let signal: TriggerSignal = pipeline.bus.pop(&keys::triggers(session)).unwrap();
    pipeline
        .orchestrator
        .process_trigger(session, signal)
        .await
        .unwrap();

    assert_eq!(pipeline.bus.queued_responses(session), 0);
    assert!(pipeline.scheduler.tick(session).await.unwrap().is_none());
    assert!(pipeline.sink.delivered().is_empty());
}
