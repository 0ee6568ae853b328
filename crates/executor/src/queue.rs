//! Queued/running counters, globally and per tool, with change notification.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    pub queued: usize,
    pub running: usize,
}

impl QueueCounters {
    fn is_idle(&self) -> bool {
        self.queued == 0 && self.running == 0
    }
}

/// Point-in-time view of the queue. Idle tools are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub global: QueueCounters,
    pub tools: BTreeMap<String, QueueCounters>,
}

impl QueueState {
    pub fn tool(&self, tool_id: &str) -> QueueCounters {
        self.tools.get(tool_id).copied().unwrap_or_default()
    }
}

type Listener = Arc<dyn Fn(&QueueState) + Send + Sync>;

struct TrackerInner {
    state: Mutex<QueueState>,
    /// Held from mutation through delivery so listeners see changes in order.
    publishing: Mutex<()>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
}

#[derive(Clone)]
pub struct QueueTracker {
    inner: Arc<TrackerInner>,
}

impl Default for QueueTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                state: Mutex::new(QueueState::default()),
                publishing: Mutex::new(()),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> QueueState {
        self.inner.state.lock().clone()
    }

    /// Register `listener`. It receives the current state immediately and a
    /// fresh snapshot after every change until the subscription is dropped.
    /// Snapshots arrive in mutation order; a listener must not subscribe
    /// from inside its own callback.
    pub fn subscribe<F>(&self, listener: F) -> QueueSubscription
    where
        F: Fn(&QueueState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        let _publishing = self.inner.publishing.lock();
        self.inner.listeners.lock().insert(id, Arc::clone(&listener));
        listener(&self.snapshot());
        QueueSubscription {
            tracker: Arc::downgrade(&self.inner),
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub(crate) fn enqueue(&self, tool_id: &str) {
        self.update(tool_id, |c| c.queued += 1);
    }

    pub(crate) fn start(&self, tool_id: &str) {
        self.update(tool_id, |c| {
            c.queued = c.queued.saturating_sub(1);
            c.running += 1;
        });
    }

    /// A queued call gave up before being admitted.
    pub(crate) fn abandon(&self, tool_id: &str) {
        self.update(tool_id, |c| c.queued = c.queued.saturating_sub(1));
    }

    pub(crate) fn finish(&self, tool_id: &str) {
        self.update(tool_id, |c| c.running = c.running.saturating_sub(1));
    }

    fn update(&self, tool_id: &str, change: impl Fn(&mut QueueCounters)) {
        let _publishing = self.inner.publishing.lock();
        let snapshot = {
            let mut state = self.inner.state.lock();
            change(&mut state.global);
            let counters = state.tools.entry(tool_id.to_string()).or_default();
            change(counters);
            if counters.is_idle() {
                state.tools.remove(tool_id);
            }
            state.clone()
        };
        self.publish(&snapshot);
    }

    fn publish(&self, snapshot: &QueueState) {
        let listeners: Vec<Listener> = self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl std::fmt::Debug for QueueTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTracker")
            .field("state", &self.snapshot())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`QueueTracker::subscribe`]. Unsubscribes on drop.
#[derive(Debug)]
pub struct QueueSubscription {
    tracker: Weak<TrackerInner>,
    id: u64,
    active: AtomicBool,
}

impl QueueSubscription {
    /// Stop receiving snapshots. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.listeners.lock().remove(&self.id);
        }
    }
}

impl Drop for QueueSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for TrackerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerInner").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn recorder(tracker: &QueueTracker) -> (Arc<Mutex<Vec<QueueState>>>, QueueSubscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = tracker.subscribe(move |state| sink.lock().push(state.clone()));
        (seen, subscription)
    }

    #[test]
    fn test_subscriber_gets_current_state_first() {
        let tracker = QueueTracker::new();
        tracker.enqueue("a");
        let (seen, _sub) = recorder(&tracker);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].global.queued, 1);
    }

    #[test]
    fn test_lifecycle_counts_and_prunes_idle_tools() {
        let tracker = QueueTracker::new();
        tracker.enqueue("a");
        tracker.enqueue("b");
        tracker.start("a");

        let state = tracker.snapshot();
        assert_eq!(state.global, QueueCounters { queued: 1, running: 1 });
        assert_eq!(state.tool("a"), QueueCounters { queued: 0, running: 1 });

        tracker.finish("a");
        tracker.abandon("b");
        let state = tracker.snapshot();
        assert_eq!(state.global, QueueCounters::default());
        assert!(state.tools.is_empty());
    }

    #[test]
    fn test_every_change_is_published() {
        let tracker = QueueTracker::new();
        let (seen, _sub) = recorder(&tracker);
        tracker.enqueue("a");
        tracker.start("a");
        tracker.finish("a");
        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[2].tool("a").running, 1);
        assert!(seen[3].tools.is_empty());
    }

    #[test]
    fn test_concurrent_updates_reach_subscribers_in_order() {
        let tracker = QueueTracker::new();
        let (seen, _sub) = recorder(&tracker);

        let workers: Vec<_> = (0..4)
            .map(|n| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let tool = format!("tool-{}", n);
                    for _ in 0..50 {
                        tracker.enqueue(&tool);
                        tracker.start(&tool);
                        tracker.finish(&tool);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let seen = seen.lock();
        assert_eq!(seen.len(), 1 + 4 * 50 * 3);
        assert_eq!(seen.last(), Some(&tracker.snapshot()));
        for pair in seen.windows(2) {
            let before = pair[0].global.queued + pair[0].global.running;
            let after = pair[1].global.queued + pair[1].global.running;
            assert!(before.abs_diff(after) <= 1);
        }
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let tracker = QueueTracker::new();
        let (seen, sub) = recorder(&tracker);
        sub.unsubscribe();
        sub.unsubscribe();
        tracker.enqueue("a");
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(tracker.subscriber_count(), 0);
        drop(sub);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let tracker = QueueTracker::new();
        {
            let _sub = tracker.subscribe(|_| {});
            assert_eq!(tracker.subscriber_count(), 1);
        }
        assert_eq!(tracker.subscriber_count(), 0);
    }
}
