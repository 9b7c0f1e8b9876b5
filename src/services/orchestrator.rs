//! Decision pipeline: two independently scheduled activities per session.
//!
//! Activity A reacts to trigger signals — bounded wait for the question to
//! finish arriving, optional follow-up verification, a decision capability
//! call, and per-domain perspective fan-out on the respond path. Activity B
//! periodically scans the buffer for latent issues (factual errors, stuck
//! signals) without an explicit trigger, deduplicating against pending and
//! recent work before enqueuing at lower priority.
//!
//! Both activities treat every capability failure as "no action this cycle";
//! nothing here can crash the long-running loops.

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::models::{
    CandidateResponse, ContextView, DecisionMeta, DecisionPath, ModeratorConfig,
    OrchestratorConfig, Priority, ReplyMetadata, TaskKind, TriggerKind, TriggerSignal, Utterance,
};
use crate::domain::ports::{Capabilities, PerspectiveRequest};
use crate::services::bus::{keys, ConversationBus};

/// Fixed reply when the decision asks for clarification.
const CLARIFY_TEXT: &str = "I didn't catch that clearly. Could you repeat the question?";

/// Fixed reply when a respond decision arrives with no domains to draw on.
const MALFORMED_DECISION_TEXT: &str =
    "I'm not sure I followed the question. Could you rephrase it?";

pub struct Orchestrator {
    bus: Arc<ConversationBus>,
    capabilities: Arc<dyn Capabilities>,
    moderator: ModeratorConfig,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<ConversationBus>,
        capabilities: Arc<dyn Capabilities>,
        moderator: ModeratorConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            bus,
            capabilities,
            moderator,
            config,
        }
    }

    /// Activity A: consume trigger signals and drive the decision path.
    pub async fn run_reactive(&self, session_id: &str, mut shutdown: watch::Receiver<bool>) {
        info!(session_id, "decision pipeline (reactive) started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let signal: Option<TriggerSignal> = self
                .bus
                .pop_wait(&keys::triggers(session_id), self.config.poll_interval())
                .await;

            if let Some(signal) = signal {
                if let Err(err) = self.process_trigger(session_id, signal).await {
                    warn!(session_id, %err, "trigger processing failed");
                }
            }
        }

        info!(session_id, "decision pipeline (reactive) stopped");
    }

    /// Activity B: periodic latent-issue scan, after an initial quiet period.
    pub async fn run_background(&self, session_id: &str, mut shutdown: watch::Receiver<bool>) {
        info!(
            session_id,
            startup_delay_secs = self.config.background_startup_delay_secs,
            interval_secs = self.config.background_interval_secs,
            "decision pipeline (background) started"
        );

        tokio::select! {
            () = tokio::time::sleep(self.config.background_startup_delay()) => {}
            _ = shutdown.changed() => {}
        }

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            if let Err(err) = self.run_background_cycle(session_id).await {
                warn!(session_id, %err, "background analysis cycle failed");
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.background_interval()) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!(session_id, "decision pipeline (background) stopped");
    }

    /// Handles a single trigger signal end to end.
    pub async fn process_trigger(&self, session_id: &str, signal: TriggerSignal) -> Result<()> {
        info!(
            session_id,
            sequence = signal.sequence,
            potential_follow_up = signal.potential_follow_up,
            "processing trigger"
        );

        self.wait_for_context(session_id, signal.sequence).await;

        let view = self.read_view(session_id);
        let mut context = view.render();

        // The follow-up flag from the detector is provisional; verify before
        // treating the utterance as a continuation of the last reply.
        if signal.potential_follow_up {
            if let Some(last_reply) = self.verified_follow_up(session_id, &signal, &view).await {
                context.push_str(
                    "\n\n=== VERIFIED FOLLOW-UP ===\nThis message continues the assistant's last reply:\n",
                );
                context.push_str(&last_reply);
            }
        }

        let decision = match self
            .capabilities
            .decide(&signal, &context, &view.domains)
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                warn!(session_id, %err, "decision capability failed, continuing to monitor");
                return Ok(());
            }
        };

        debug!(
            session_id,
            path = ?decision.path,
            missing_domains = ?decision.missing_domains,
            "decision received"
        );

        let (text, metadata) = match decision.path {
            DecisionPath::Continue => return Ok(()),
            DecisionPath::Clarify => (
                CLARIFY_TEXT.to_string(),
                ReplyMetadata {
                    priority: Priority::P0,
                    domains: Vec::new(),
                    task: TaskKind::Clarification,
                    issue: Some(decision.reasoning.clone()),
                },
            ),
            DecisionPath::Respond if decision.missing_domains.is_empty() => {
                // Malformed decision guard: a respond path with nothing to
                // respond from degrades to clarification.
                warn!(session_id, "respond decision carried no domains, degrading to clarification");
                (
                    MALFORMED_DECISION_TEXT.to_string(),
                    ReplyMetadata {
                        priority: Priority::P0,
                        domains: Vec::new(),
                        task: TaskKind::Clarification,
                        issue: Some("unclear question, no domains identified".to_string()),
                    },
                )
            }
            DecisionPath::Respond => {
                let text = self
                    .generate_perspectives(&decision.missing_domains, &view, decision.task)
                    .await;
                (
                    text,
                    ReplyMetadata {
                        priority: Priority::P0,
                        domains: decision.missing_domains.clone(),
                        task: decision.task,
                        issue: Some(decision.reasoning.clone()),
                    },
                )
            }
        };

        let meta = DecisionMeta {
            active_domains: decision.active_domains.clone(),
            missing_domains: decision.missing_domains.clone(),
            issue: metadata.issue.clone(),
            keywords: relevance_keywords(&decision.active_domains, &decision.missing_domains),
        };

        self.synthesize_and_enqueue(
            session_id,
            Priority::P0,
            text,
            TriggerKind::Explicit,
            Some(signal.sequence),
            metadata,
            meta,
        )?;
        Ok(())
    }

    /// One background pass: factual-error scan, then stuck scan, each with
    /// semantic deduplication against pending and recent replies.
    pub async fn run_background_cycle(&self, session_id: &str) -> Result<()> {
        let view = self.read_view(session_id);
        if view.buffer.is_empty() {
            debug!(session_id, "background scan skipped, buffer empty");
            return Ok(());
        }

        let transcript = view.transcript();
        let history = render_history(&view);

        let error = match self.capabilities.detect_factual_error(&transcript).await {
            Ok(error) => error,
            Err(err) => {
                warn!(session_id, %err, "factual-error detection failed");
                None
            }
        };

        if let Some(error) = error {
            if self.is_duplicate(session_id, &error.issue, &view).await {
                info!(session_id, issue = %error.issue, "duplicate factual error, dropped");
            } else {
                info!(session_id, description = %error.description, "factual error detected");
                let perspectives = self
                    .generate_perspectives(&error.domains, &view, TaskKind::FactualCorrection)
                    .await;
                let text = format!("Quick correction: {}\n\n{}", error.correction, perspectives);
                self.synthesize_and_enqueue(
                    session_id,
                    Priority::P1,
                    text,
                    TriggerKind::FactualError,
                    None,
                    ReplyMetadata {
                        priority: Priority::P1,
                        domains: error.domains.clone(),
                        task: TaskKind::FactualCorrection,
                        issue: Some(error.issue.clone()),
                    },
                    DecisionMeta {
                        active_domains: view.domains.clone(),
                        missing_domains: error.domains.clone(),
                        issue: Some(error.issue.clone()),
                        keywords: relevance_keywords(&view.domains, &error.domains),
                    },
                )?;
            }
        }

        let stuck = match self.capabilities.detect_stuck(&transcript, &history).await {
            Ok(stuck) => stuck,
            Err(err) => {
                warn!(session_id, %err, "stuck detection failed");
                None
            }
        };

        if let Some(stuck) = stuck {
            if self.is_duplicate(session_id, &stuck.issue, &view).await {
                info!(session_id, issue = %stuck.issue, "duplicate stuck signal, dropped");
            } else {
                let priority = stuck.priority();
                info!(session_id, kind = %stuck.kind, %priority, "stuck signal detected");
                let text = self
                    .generate_perspectives(&stuck.domains, &view, TaskKind::ProvidePerspective)
                    .await;
                self.synthesize_and_enqueue(
                    session_id,
                    priority,
                    text,
                    TriggerKind::Stuck,
                    None,
                    ReplyMetadata {
                        priority,
                        domains: stuck.domains.clone(),
                        task: TaskKind::ProvidePerspective,
                        issue: Some(stuck.issue.clone()),
                    },
                    DecisionMeta {
                        active_domains: view.domains.clone(),
                        missing_domains: stuck.domains.clone(),
                        issue: Some(stuck.issue.clone()),
                        keywords: relevance_keywords(&view.domains, &stuck.domains),
                    },
                )?;
            }
        }

        Ok(())
    }

    /// Bounded wait for a question that may span several utterances: up to
    /// the configured time, or until enough newer messages have buffered.
    async fn wait_for_context(&self, session_id: &str, sequence: u64) {
        let deadline = Instant::now() + self.config.context_wait();
        loop {
            let newer = self.read_view(session_id).messages_after(sequence);
            if newer >= self.config.context_wait_messages {
                debug!(session_id, newer, "context wait satisfied by message count");
                return;
            }
            if Instant::now() >= deadline {
                debug!(session_id, newer, "context wait elapsed");
                return;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Returns the last reply text when the trigger verifiably continues it.
    async fn verified_follow_up(
        &self,
        session_id: &str,
        signal: &TriggerSignal,
        view: &ContextView,
    ) -> Option<String> {
        let last = view.last_synthesized()?;
        let trigger_message = view.find_buffered(signal.sequence)?;
        match self
            .capabilities
            .verify_follow_up(
                &trigger_message.utterance.speaker,
                &trigger_message.utterance.text,
                &last.text,
            )
            .await
        {
            Ok(true) => {
                info!(session_id, sequence = signal.sequence, "follow-up verified");
                Some(last.text.clone())
            }
            Ok(false) => None,
            Err(err) => {
                warn!(session_id, %err, "follow-up verification failed");
                None
            }
        }
    }

    /// Concurrent per-domain perspective generation, capped at the fan-out
    /// limit. A failing branch yields a visible placeholder instead of
    /// aborting the join.
    async fn generate_perspectives(
        &self,
        domains: &[String],
        view: &ContextView,
        task: TaskKind,
    ) -> String {
        let selected: Vec<String> = domains
            .iter()
            .take(self.config.max_perspectives)
            .cloned()
            .collect();
        debug!(count = selected.len(), "generating perspectives");

        let request = PerspectiveRequest {
            context: view.render(),
            active_domains: view.domains.clone(),
            history: render_history(view),
            task,
        };

        let branches = selected.iter().map(|domain| {
            let request = &request;
            async move {
                match self.capabilities.perspective(domain, request).await {
                    Ok(text) => (domain.clone(), text),
                    Err(err) => {
                        warn!(domain = %domain, %err, "perspective generation failed");
                        (domain.clone(), format!("[{domain} perspective unavailable]"))
                    }
                }
            }
        });

        let perspectives = join_all(branches).await;
        match perspectives.as_slice() {
            [] => String::new(),
            [(_, text)] => text.clone(),
            many => many
                .iter()
                .map(|(domain, text)| format!("From a {domain} perspective:\n{text}"))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// Pairwise semantic check against every queued item and every
    /// synthesized reply inside the dedup window. The oracle fails open to
    /// "not similar".
    async fn is_duplicate(&self, session_id: &str, issue: &str, view: &ContextView) -> bool {
        for priority in Priority::ALL {
            let queue = keys::responses(session_id, priority);
            for item in self.bus.items::<CandidateResponse>(&queue) {
                let Some(queued_issue) = item.decision.issue.as_deref() else {
                    continue;
                };
                if self.similar(issue, queued_issue).await {
                    debug!(session_id, %priority, "similar issue already queued");
                    return true;
                }
            }
        }

        let window = self.config.dedup_window().as_secs_f64();
        for record in &view.synthesized {
            if record.age_secs >= window {
                continue;
            }
            let Some(prior_issue) = record.issue.as_deref() else {
                continue;
            };
            if self.similar(issue, prior_issue).await {
                debug!(
                    session_id,
                    age_secs = record.age_secs,
                    "similar issue addressed recently"
                );
                return true;
            }
        }

        false
    }

    async fn similar(&self, first: &str, second: &str) -> bool {
        match self.capabilities.judge_similarity(first, second).await {
            Ok(similar) => similar,
            Err(err) => {
                warn!(%err, "similarity check failed, treating as distinct");
                false
            }
        }
    }

    /// Records the reply into conversational context (origin = synthesized,
    /// so it is never reprocessed as a trigger), then enqueues the candidate
    /// response for delivery.
    #[allow(clippy::too_many_arguments)]
    fn synthesize_and_enqueue(
        &self,
        session_id: &str,
        priority: Priority,
        text: String,
        trigger: TriggerKind,
        trigger_sequence: Option<u64>,
        metadata: ReplyMetadata,
        decision: DecisionMeta,
    ) -> Result<()> {
        let sequence = self.bus.incr(&keys::sequence(session_id));
        let reply = Utterance::synthesized(
            sequence,
            self.moderator.assistant_name.clone(),
            text.clone(),
            metadata,
        );
        self.bus.push(&keys::context(session_id), &reply)?;

        let response =
            CandidateResponse::new(session_id, priority, text, trigger, trigger_sequence, decision);
        self.bus
            .push(&keys::responses(session_id, priority), &response)?;

        info!(session_id, %priority, id = %response.id, "candidate response queued");
        Ok(())
    }

    fn read_view(&self, session_id: &str) -> ContextView {
        self.bus
            .get(&keys::state(session_id))
            .unwrap_or_else(|| ContextView::empty(session_id))
    }
}

/// Relevance keywords checked by the scheduler: the domains the decision
/// involved, active and missing alike.
fn relevance_keywords(active: &[String], missing: &[String]) -> Vec<String> {
    let mut keywords: Vec<String> = active.to_vec();
    for domain in missing {
        if !keywords.contains(domain) {
            keywords.push(domain.clone());
        }
    }
    keywords
}

/// Prior assistant contributions, rendered for prompts.
fn render_history(view: &ContextView) -> String {
    if view.synthesized.is_empty() {
        return "None yet".to_string();
    }
    view.synthesized
        .iter()
        .map(|record| {
            let preview: String = record.text.chars().take(100).collect();
            format!("[{}] {}", record.timestamp, preview)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
