//! The conversational bus: the sole coordination medium between components.
//!
//! Provides per-session FIFO queues with blocking pop, short-lived key/value
//! slots with expiration, and monotonic counters for sequence assignment.
//! Slots are soft flags, not mutexes — races are tolerated because every
//! writer either appends or replaces wholesale.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use crate::domain::models::Priority;
use crate::domain::DomainResult;

/// Key layout for the per-session queues and slots.
pub mod keys {
    use crate::domain::models::Priority;

    /// Raw utterances from the transcription boundary.
    pub fn ingest(session: &str) -> String {
        format!("ingest:{session}")
    }

    /// Utterances forwarded to the context aggregator (humans and
    /// synthesized replies alike).
    pub fn context(session: &str) -> String {
        format!("context:{session}")
    }

    /// Trigger signals for the decision pipeline.
    pub fn triggers(session: &str) -> String {
        format!("triggers:{session}")
    }

    /// One candidate-response queue per priority tier.
    pub fn responses(session: &str, priority: Priority) -> String {
        format!("responses:{session}:{priority}")
    }

    /// Full context view published by the aggregator.
    pub fn state(session: &str) -> String {
        format!("state:{session}")
    }

    /// Derived silence/topic snapshot for the scheduler.
    pub fn snapshot(session: &str) -> String {
        format!("snapshot:{session}")
    }

    /// Follow-up flag set when a response is delivered.
    pub fn spoke(session: &str) -> String {
        format!("spoke:{session}")
    }

    /// Sequence counter for utterance numbering.
    pub fn sequence(session: &str) -> String {
        format!("seq:{session}")
    }
}

/// Payload of the "spoke" follow-up flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpokeFlag {
    /// Sequence number of the message that triggered the delivered reply.
    pub sequence: Option<u64>,
}

struct Slot {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Shared, addressable store coordinating the moderation components.
#[derive(Default)]
pub struct ConversationBus {
    queues: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
    slots: Mutex<HashMap<String, Slot>>,
    counters: Mutex<HashMap<String, u64>>,
    notify: Notify,
}

impl ConversationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item to the tail of a queue and wakes blocked poppers.
    pub fn push<T: Serialize>(&self, queue: &str, item: &T) -> DomainResult<()> {
        let value = serde_json::to_value(item)?;
        self.queues
            .lock()
            .expect("bus queues lock poisoned")
            .entry(queue.to_string())
            .or_default()
            .push_back(value);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Removes and returns the head of a queue. Elements that fail to decode
    /// are dropped with a warning rather than wedging the queue.
    pub fn pop<T: DeserializeOwned>(&self, queue: &str) -> Option<T> {
        let mut queues = self.queues.lock().expect("bus queues lock poisoned");
        let entries = queues.get_mut(queue)?;
        while let Some(value) = entries.pop_front() {
            match serde_json::from_value(value) {
                Ok(item) => return Some(item),
                Err(err) => warn!(queue, %err, "dropping undecodable bus element"),
            }
        }
        None
    }

    /// Blocking pop with a timeout. Returns `None` on timeout so callers can
    /// run liveness checks between waits.
    pub async fn pop_wait<T: DeserializeOwned>(&self, queue: &str, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.pop(queue) {
                return Some(item);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }

    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .expect("bus queues lock poisoned")
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Decoded snapshot of a queue in insertion order, without removal.
    pub fn items<T: DeserializeOwned>(&self, queue: &str) -> Vec<T> {
        self.queues
            .lock()
            .expect("bus queues lock poisoned")
            .get(queue)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|value| serde_json::from_value(value.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes the first element structurally equal to `item`. Returns
    /// whether anything was removed.
    pub fn remove<T: Serialize>(&self, queue: &str, item: &T) -> DomainResult<bool> {
        let value = serde_json::to_value(item)?;
        let mut queues = self.queues.lock().expect("bus queues lock poisoned");
        let Some(entries) = queues.get_mut(queue) else {
            return Ok(false);
        };
        match entries.iter().position(|existing| *existing == value) {
            Some(index) => {
                entries.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes a key/value slot with an expiry.
    pub fn put<T: Serialize>(&self, key: &str, item: &T, ttl: Duration) -> DomainResult<()> {
        let value = serde_json::to_value(item)?;
        self.slots.lock().expect("bus slots lock poisoned").insert(
            key.to_string(),
            Slot {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// Reads a slot, dropping it when expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut slots = self.slots.lock().expect("bus slots lock poisoned");
        match slots.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => {
                serde_json::from_value(slot.value.clone()).ok()
            }
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn delete(&self, key: &str) {
        self.slots.lock().expect("bus slots lock poisoned").remove(key);
    }

    /// Atomically increments a named counter, returning the new value.
    /// Counters start at 1.
    pub fn incr(&self, key: &str) -> u64 {
        let mut counters = self.counters.lock().expect("bus counters lock poisoned");
        let counter = counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Total queued candidate responses across all four tiers.
    pub fn queued_responses(&self, session: &str) -> usize {
        Priority::ALL
            .iter()
            .map(|priority| self.len(&keys::responses(session, *priority)))
            .sum()
    }
}

impl std::fmt::Debug for ConversationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo_order() {
        let bus = ConversationBus::new();
        bus.push("q", &1u32).unwrap();
        bus.push("q", &2u32).unwrap();
        bus.push("q", &3u32).unwrap();

        assert_eq!(bus.len("q"), 3);
        assert_eq!(bus.pop::<u32>("q"), Some(1));
        assert_eq!(bus.pop::<u32>("q"), Some(2));
        assert_eq!(bus.pop::<u32>("q"), Some(3));
        assert_eq!(bus.pop::<u32>("q"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_wait_times_out() {
        let bus = ConversationBus::new();
        let popped: Option<u32> = bus.pop_wait("empty", Duration::from_secs(1)).await;
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_pop_wait_wakes_on_push() {
        let bus = std::sync::Arc::new(ConversationBus::new());
        let reader = bus.clone();
        let handle = tokio::spawn(async move {
            reader.pop_wait::<u32>("q", Duration::from_secs(5)).await
        });

        tokio::task::yield_now().await;
        bus.push("q", &7u32).unwrap();

        assert_eq!(handle.await.unwrap(), Some(7));
    }

    #[test]
    fn test_items_and_remove_first_match() {
        let bus = ConversationBus::new();
        bus.push("q", &"a").unwrap();
        bus.push("q", &"b").unwrap();
        bus.push("q", &"a").unwrap();

        assert_eq!(bus.items::<String>("q"), vec!["a", "b", "a"]);
        assert!(bus.remove("q", &"a").unwrap());
        assert_eq!(bus.items::<String>("q"), vec!["b", "a"]);
        assert!(!bus.remove("q", &"missing").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_expires() {
        let bus = ConversationBus::new();
        bus.put("flag", &SpokeFlag { sequence: Some(4) }, Duration::from_secs(30))
            .unwrap();
        assert_eq!(
            bus.get::<SpokeFlag>("flag"),
            Some(SpokeFlag { sequence: Some(4) })
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(bus.get::<SpokeFlag>("flag"), None);
    }

    #[test]
    fn test_incr_is_monotonic_per_key() {
        let bus = ConversationBus::new();
        assert_eq!(bus.incr("seq:a"), 1);
        assert_eq!(bus.incr("seq:a"), 2);
        assert_eq!(bus.incr("seq:b"), 1);
        assert_eq!(bus.incr("seq:a"), 3);
    }

    #[test]
    fn test_undecodable_elements_are_skipped() {
        let bus = ConversationBus::new();
        bus.push("q", &"not a number").unwrap();
        bus.push("q", &11u32).unwrap();
        assert_eq!(bus.pop::<u32>("q"), Some(11));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::responses("s1", Priority::P2), "responses:s1:P2");
        assert_eq!(keys::spoke("s1"), "spoke:s1");
    }
}
