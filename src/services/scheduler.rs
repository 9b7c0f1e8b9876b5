//! Priority delivery scheduler: releases at most one candidate response per
//! tick, so interventions land in conversational gaps instead of on top of
//! speakers.
//!
//! P0 items bypass every gate. The gated tiers require current silence and
//! minimum spacing since the previous delivery, then a scan of P1, P2, P3 in
//! insertion order that removes expired and topic-irrelevant items and
//! releases the first survivor (first-found-wins; the overdue computation is
//! logged but does not reorder the scan).

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::models::{
    CandidateResponse, ConversationSnapshot, Priority, ResponseStatus, SchedulerConfig,
    SessionConfig,
};
use crate::domain::ports::DeliverySink;
use crate::services::bus::{keys, ConversationBus, SpokeFlag};
use crate::services::registry::SessionRegistry;

#[derive(Default)]
struct SchedulerState {
    last_delivery: Option<Instant>,
}

pub struct DeliveryScheduler {
    bus: Arc<ConversationBus>,
    sink: Arc<dyn DeliverySink>,
    config: SchedulerConfig,
    session_config: SessionConfig,
    sessions: SessionRegistry<SchedulerState>,
}

impl DeliveryScheduler {
    pub fn new(
        bus: Arc<ConversationBus>,
        sink: Arc<dyn DeliverySink>,
        config: SchedulerConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            bus,
            sink,
            config,
            session_config,
            sessions: SessionRegistry::new(),
        }
    }

    pub async fn run(&self, session_id: &str, mut shutdown: watch::Receiver<bool>) {
        info!(
            session_id,
            silence_threshold_secs = self.config.silence_threshold_secs,
            p1_target_secs = self.config.p1_target_secs,
            p2_p3_target_secs = self.config.p2_p3_target_secs,
            expiration_secs = self.config.expiration_secs,
            "delivery scheduler started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            if let Err(err) = self.tick(session_id).await {
                warn!(session_id, %err, "scheduler tick failed");
            }
            self.sessions.evict_idle(self.session_config.idle_evict());

            tokio::select! {
                () = tokio::time::sleep(self.config.tick_interval()) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!(session_id, "delivery scheduler stopped");
    }

    /// One scheduling pass. Returns the delivered response, if any.
    pub async fn tick(&self, session_id: &str) -> anyhow::Result<Option<CandidateResponse>> {
        // Directly-requested replies are always immediate.
        if let Some(response) = self
            .bus
            .pop::<CandidateResponse>(&keys::responses(session_id, Priority::P0))
        {
            info!(session_id, id = %response.id, "delivering P0 response");
            return Ok(Some(self.deliver(session_id, response).await));
        }

        let Some(snapshot) = self
            .bus
            .get::<ConversationSnapshot>(&keys::snapshot(session_id))
        else {
            // No fresh state; gated tiers stay put until the aggregator
            // publishes again.
            return Ok(None);
        };

        if !snapshot.silent {
            return Ok(None);
        }

        let spacing_ok = self.sessions.with_session(
            session_id,
            SchedulerState::default,
            |state| match state.last_delivery {
                Some(last) => last.elapsed() >= self.config.silence_threshold(),
                None => true,
            },
        );
        if !spacing_ok {
            debug!(session_id, "holding delivery, inside spacing window");
            return Ok(None);
        }

        let now = Utc::now();
        for priority in Priority::GATED {
            let queue = keys::responses(session_id, priority);
            for item in self.bus.items::<CandidateResponse>(&queue) {
                let age = item.age(now);

                if age > self.config.expiration() {
                    self.discard(&queue, item, ResponseStatus::Expired);
                    continue;
                }

                if !item.is_relevant_to(&snapshot.keywords) {
                    self.discard(&queue, item, ResponseStatus::DroppedIrrelevant);
                    continue;
                }

                let deadline = self.soft_deadline(priority);
                if age > deadline {
                    info!(session_id, %priority, age_secs = age.as_secs(), "item overdue, delivering");
                } else if priority == Priority::P1
                    && age.as_secs_f64() > deadline.as_secs_f64() * self.config.p1_early_release
                {
                    debug!(session_id, "P1 early release");
                } else {
                    debug!(session_id, %priority, "delivering first eligible item");
                }

                self.bus.remove(&queue, &item)?;
                return Ok(Some(self.deliver(session_id, item).await));
            }
        }

        Ok(None)
    }

    fn soft_deadline(&self, priority: Priority) -> Duration {
        match priority {
            Priority::P0 | Priority::P1 => Duration::from_secs(self.config.p1_target_secs),
            Priority::P2 | Priority::P3 => Duration::from_secs(self.config.p2_p3_target_secs),
        }
    }

    fn discard(&self, queue: &str, mut item: CandidateResponse, status: ResponseStatus) {
        if let Err(err) = self.bus.remove(queue, &item) {
            warn!(queue, %err, "failed to remove discarded item");
            return;
        }
        item.status = status;
        info!(queue, id = %item.id, ?status, "removed item from queue");
    }

    /// Performs the delivery side effect, stamps the spacing clock, and
    /// opens the follow-up window via the bus "spoke" flag.
    async fn deliver(&self, session_id: &str, mut response: CandidateResponse) -> CandidateResponse {
        response.status = ResponseStatus::Delivered;

        if let Err(err) = self.sink.deliver(&response).await {
            warn!(session_id, id = %response.id, %err, "delivery sink failed");
        }

        self.sessions
            .with_session(session_id, SchedulerState::default, |state| {
                state.last_delivery = Some(Instant::now());
            });

        let flag = SpokeFlag {
            sequence: response.trigger_sequence,
        };
        if let Err(err) = self
            .bus
            .put(&keys::spoke(session_id), &flag, self.config.spoke_ttl())
        {
            warn!(session_id, %err, "failed to set spoke flag");
        }

        info!(
            session_id,
            id = %response.id,
            priority = %response.priority,
            "response delivered, follow-up window open"
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DecisionMeta, TriggerKind};
    use crate::services::support::RecordingSink;

    fn scheduler() -> (DeliveryScheduler, Arc<ConversationBus>, Arc<RecordingSink>) {
        let bus = Arc::new(ConversationBus::new());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = DeliveryScheduler::new(
            bus.clone(),
            sink.clone(),
            SchedulerConfig::default(),
            SessionConfig::default(),
        );
        (scheduler, bus, sink)
    }

    fn response(priority: Priority, keywords: &[&str]) -> CandidateResponse {
        CandidateResponse::new(
            "s1",
            priority,
            format!("{priority} reply"),
            TriggerKind::Explicit,
            Some(12),
            DecisionMeta {
                keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                ..DecisionMeta::default()
            },
        )
    }

    fn enqueue(bus: &ConversationBus, item: &CandidateResponse) {
        bus.push(&keys::responses("s1", item.priority), item).unwrap();
    }

    fn publish_snapshot(bus: &ConversationBus, silent: bool, keywords: &[&str]) {
        let snapshot = ConversationSnapshot {
            session_id: "s1".into(),
            silent,
            seconds_since_last: if silent { 10.0 } else { 0.5 },
            domains: vec![],
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        };
        bus.put(&keys::snapshot("s1"), &snapshot, Duration::from_secs(10))
            .unwrap();
    }

    #[tokio::test]
    async fn test_p0_delivered_without_silence_state() {
        let (scheduler, bus, sink) = scheduler();
        // No snapshot published at all: the conversation may well be loud.
        enqueue(&bus, &response(Priority::P0, &[]));

        let delivered = scheduler.tick("s1").await.unwrap().unwrap();
        assert_eq!(delivered.status, ResponseStatus::Delivered);
        assert_eq!(sink.delivered().len(), 1);

        // Delivery opened the follow-up window with the trigger sequence.
        let flag: SpokeFlag = bus.get(&keys::spoke("s1")).unwrap();
        assert_eq!(flag.sequence, Some(12));
    }

    #[tokio::test]
    async fn test_gated_tiers_require_silence() {
        let (scheduler, bus, sink) = scheduler();
        enqueue(&bus, &response(Priority::P1, &[]));

        // No snapshot: nothing moves.
        assert!(scheduler.tick("s1").await.unwrap().is_none());

        publish_snapshot(&bus, false, &[]);
        assert!(scheduler.tick("s1").await.unwrap().is_none());

        publish_snapshot(&bus, true, &[]);
        let delivered = scheduler.tick("s1").await.unwrap().unwrap();
        assert_eq!(delivered.priority, Priority::P1);
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_prevents_back_to_back_deliveries() {
        let (scheduler, bus, sink) = scheduler();
        publish_snapshot(&bus, true, &[]);
        enqueue(&bus, &response(Priority::P1, &[]));
        enqueue(&bus, &response(Priority::P1, &[]));

        assert!(scheduler.tick("s1").await.unwrap().is_some());
        assert!(
            scheduler.tick("s1").await.unwrap().is_none(),
            "second delivery inside the spacing window"
        );

        tokio::time::advance(Duration::from_secs(5)).await;
        publish_snapshot(&bus, true, &[]);
        assert!(scheduler.tick("s1").await.unwrap().is_some());
        assert_eq!(sink.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_p0_ignores_spacing() {
        let (scheduler, bus, sink) = scheduler();
        publish_snapshot(&bus, true, &[]);
        enqueue(&bus, &response(Priority::P1, &[]));
        scheduler.tick("s1").await.unwrap();

        enqueue(&bus, &response(Priority::P0, &[]));
        let delivered = scheduler.tick("s1").await.unwrap().unwrap();
        assert_eq!(delivered.priority, Priority::P0);
        assert_eq!(sink.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_item_removed_never_delivered() {
        let (scheduler, bus, sink) = scheduler();
        publish_snapshot(&bus, true, &[]);

        let mut stale = response(Priority::P1, &[]);
        stale.created_at = Utc::now() - chrono::Duration::seconds(130);
        enqueue(&bus, &stale);

        assert!(scheduler.tick("s1").await.unwrap().is_none());
        assert!(bus.is_empty(&keys::responses("s1", Priority::P1)));
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_irrelevant_item_removed_never_delivered() {
        let (scheduler, bus, sink) = scheduler();
        publish_snapshot(&bus, true, &["economics", "markets"]);
        enqueue(&bus, &response(Priority::P2, &["Biology"]));

        assert!(scheduler.tick("s1").await.unwrap().is_none());
        assert!(bus.is_empty(&keys::responses("s1", Priority::P2)));
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_empty_keyword_sets_pass_relevance() {
        let (scheduler, bus, _) = scheduler();
        // Pre-inference: snapshot has no keywords yet.
        publish_snapshot(&bus, true, &[]);
        enqueue(&bus, &response(Priority::P2, &["Biology"]));

        let delivered = scheduler.tick("s1").await.unwrap();
        assert!(delivered.is_some(), "fail-open so early items are not starved");
    }

    #[tokio::test]
    async fn test_scan_order_p1_before_p2_insertion_order_within_tier() {
        let (scheduler, bus, _) = scheduler();
        publish_snapshot(&bus, true, &[]);

        let first_p1 = response(Priority::P1, &[]);
        let second_p1 = response(Priority::P1, &[]);
        enqueue(&bus, &response(Priority::P2, &[]));
        enqueue(&bus, &first_p1);
        enqueue(&bus, &second_p1);

        let delivered = scheduler.tick("s1").await.unwrap().unwrap();
        assert_eq!(delivered.id, first_p1.id, "oldest P1 wins over P2 and newer P1");
    }

    #[tokio::test]
    async fn test_expired_head_does_not_block_tier() {
        let (scheduler, bus, _) = scheduler();
        publish_snapshot(&bus, true, &[]);

        let mut stale = response(Priority::P1, &[]);
        stale.created_at = Utc::now() - chrono::Duration::seconds(200);
        let fresh = response(Priority::P1, &[]);
        enqueue(&bus, &stale);
        enqueue(&bus, &fresh);

        let delivered = scheduler.tick("s1").await.unwrap().unwrap();
        assert_eq!(delivered.id, fresh.id);
        assert!(bus.is_empty(&keys::responses("s1", Priority::P1)));
    }

    #[tokio::test]
    async fn test_at_most_one_release_per_tick() {
        let (scheduler, bus, sink) = scheduler();
        publish_snapshot(&bus, true, &[]);
        enqueue(&bus, &response(Priority::P1, &[]));
        enqueue(&bus, &response(Priority::P2, &[]));
        enqueue(&bus, &response(Priority::P3, &[]));

        scheduler.tick("s1").await.unwrap();
        assert_eq!(sink.delivered().len(), 1);
        assert_eq!(bus.queued_responses("s1"), 2);
    }
}
