//! Per-component session registry.
//!
//! Each core component owns one registry keyed by session id: state loads on
//! first reference and is evicted after an idle timeout, replacing the
//! process-wide session maps a long-running moderator would otherwise
//! accumulate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Entry<S> {
    state: S,
    last_access: Instant,
}

/// Registry of per-session state with load-on-first-reference and idle
/// eviction.
pub struct SessionRegistry<S> {
    sessions: Mutex<HashMap<String, Entry<S>>>,
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` against the session's state, creating it with `init` on
    /// first reference. Access refreshes the idle clock.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        init: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> R,
    ) -> R {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Entry {
                state: init(),
                last_access: Instant::now(),
            });
        entry.last_access = Instant::now();
        f(&mut entry.state)
    }

    /// Drops sessions idle for longer than `max_idle`. Returns the number
    /// evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().expect("session registry lock poisoned");
        let before = sessions.len();
        sessions.retain(|session_id, entry| {
            let keep = entry.last_access.elapsed() <= max_idle;
            if !keep {
                debug!(session_id, "evicting idle session state");
            }
            keep
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_on_first_reference() {
        let registry: SessionRegistry<Vec<u32>> = SessionRegistry::new();
        registry.with_session("s1", Vec::new, |state| state.push(1));
        registry.with_session("s1", Vec::new, |state| state.push(2));

        let len = registry.with_session("s1", Vec::new, |state| state.len());
        assert_eq!(len, 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_idle_sessions_only() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry.with_session("stale", || 0, |_| ());

        tokio::time::advance(Duration::from_secs(3601)).await;
        registry.with_session("fresh", || 0, |_| ());

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)), 1);
        assert_eq!(registry.len(), 1);
        // Re-referencing the evicted session recreates it from scratch.
        let value = registry.with_session("stale", || 9, |state| *state);
        assert_eq!(value, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_refreshes_idle_clock() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        registry.with_session("s1", || 0, |_| ());

        tokio::time::advance(Duration::from_secs(3000)).await;
        registry.with_session("s1", || 0, |_| ());
        tokio::time::advance(Duration::from_secs(3000)).await;

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)), 0);
    }
}
