//! Trigger detector: watches the ingest stream for moments that warrant a
//! decision.
//!
//! Forwards every human utterance to the aggregator's context queue, then
//! emits at most one trigger signal per utterance — when the speaker
//! addresses the assistant directly, or when the follow-up window opened by
//! a recent delivery is still live. Synthesized-origin messages are skipped
//! by contract, which is what breaks the feedback loop between pipeline
//! output and detector input.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::models::{SessionConfig, TriggerSignal, Utterance};
use crate::domain::ports::Capabilities;
use crate::services::bus::{keys, ConversationBus, SpokeFlag};
use crate::services::registry::SessionRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Utterances shorter than this are never treated as explicit address.
const MIN_ADDRESS_LEN: usize = 3;

#[derive(Default)]
struct DetectorState {
    last_sequence: u64,
}

pub struct TriggerDetector {
    bus: Arc<ConversationBus>,
    capabilities: Arc<dyn Capabilities>,
    session_config: SessionConfig,
    sessions: SessionRegistry<DetectorState>,
}

impl TriggerDetector {
    pub fn new(
        bus: Arc<ConversationBus>,
        capabilities: Arc<dyn Capabilities>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            bus,
            capabilities,
            session_config,
            sessions: SessionRegistry::new(),
        }
    }

    pub async fn run(&self, session_id: &str, mut shutdown: watch::Receiver<bool>) {
        info!(session_id, "trigger detector started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let message: Option<Utterance> = self
                .bus
                .pop_wait(&keys::ingest(session_id), POLL_INTERVAL)
                .await;

            if let Some(utterance) = message {
                if let Err(err) = self.on_utterance(session_id, &utterance).await {
                    warn!(session_id, %err, "trigger detection cycle failed");
                }
            }

            self.sessions.evict_idle(self.session_config.idle_evict());
        }

        info!(session_id, "trigger detector stopped");
    }

    /// Processes one utterance: forward, classify, maybe signal. Returns the
    /// emitted signal for callers that want to observe it.
    pub async fn on_utterance(
        &self,
        session_id: &str,
        utterance: &Utterance,
    ) -> anyhow::Result<Option<TriggerSignal>> {
        // Hard skip synthesized replies; they reach the aggregator through
        // the context queue already.
        if utterance.is_synthesized() {
            self.note_sequence(session_id, utterance.sequence);
            debug!(session_id, sequence = utterance.sequence, "skipping synthesized message");
            return Ok(None);
        }

        // At most one signal per utterance; sequences move strictly forward.
        if !self.claim_sequence(session_id, utterance.sequence) {
            debug!(session_id, sequence = utterance.sequence, "already processed");
            return Ok(None);
        }

        self.bus.push(&keys::context(session_id), utterance)?;

        let addressed = if utterance.text.trim().len() < MIN_ADDRESS_LEN {
            false
        } else {
            match self
                .capabilities
                .detect_address(&utterance.speaker, &utterance.text)
                .await
            {
                Ok(addressed) => addressed,
                Err(err) => {
                    // Fail open: an unreachable classifier means no trigger,
                    // never a crash.
                    warn!(session_id, %err, "address detection failed");
                    false
                }
            }
        };

        let follow_up_open = self.bus.get::<SpokeFlag>(&keys::spoke(session_id)).is_some();

        if !addressed && !follow_up_open {
            return Ok(None);
        }

        let signal = TriggerSignal::explicit(utterance, follow_up_open);
        self.bus.push(&keys::triggers(session_id), &signal)?;
        info!(
            session_id,
            sequence = utterance.sequence,
            addressed,
            follow_up_open,
            "trigger signal emitted"
        );
        Ok(Some(signal))
    }

    fn note_sequence(&self, session_id: &str, sequence: u64) {
        self.sessions
            .with_session(session_id, DetectorState::default, |state| {
                state.last_sequence = state.last_sequence.max(sequence);
            });
    }

    /// Returns false when the sequence was already processed.
    fn claim_sequence(&self, session_id: &str, sequence: u64) -> bool {
        self.sessions
            .with_session(session_id, DetectorState::default, |state| {
                if sequence <= state.last_sequence {
                    return false;
                }
                state.last_sequence = sequence;
                true
            })
    }
}
