//! In-process publish/subscribe event fan-out (§4.3).
//!
//! Grounded on the same "bounded channel per consumer, never block the
//! producer" shape the host's orchestrator uses for its lifecycle-result
//! channel (`tokio::sync::mpsc`), generalized here to many readers instead
//! of one: a table of `subscriber_id -> bounded sender`, a single lock
//! guarding the table, and a non-blocking per-subscriber send so one slow
//! watcher can never stall another or the broadcaster itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Bounded per-subscriber queue capacity. Events beyond this are dropped
/// for that subscriber only; the Store remains the source of truth.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardEventKind {
    TaskCreated,
    TaskReady,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    WorkspaceCreated,
    WorkspacePaused,
    WorkspaceResumed,
    WorkspaceCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardEvent {
    pub kind: BoardEventKind,
    pub workspace_id: Uuid,
    pub task_id: Option<String>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl BoardEvent {
    pub fn new(kind: BoardEventKind, workspace_id: Uuid, task_id: Option<String>, detail: impl Into<String>) -> Self {
        BoardEvent {
            kind,
            workspace_id,
            task_id,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

/// A live subscription: an id (for `unsubscribe`) and the bounded receiver.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<BoardEvent>,
}

struct Inner {
    next_id: AtomicU64,
    subscribers: std::sync::Mutex<HashMap<u64, mpsc::Sender<BoardEvent>>>,
}

/// The Event Bus. Cheap to clone (wraps an `Arc`); every clone shares the
/// same subscriber table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                subscribers: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new subscriber and return its id plus receive end.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.inner.subscribers.lock().unwrap().insert(id, tx);
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber, closing its queue.
    pub fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.lock().unwrap().remove(&id);
    }

    /// Broadcast to every live subscriber. Never blocks: a full queue
    /// drops the event for that subscriber only, logged at `debug`.
    pub fn broadcast(&self, event: BoardEvent) {
        let subscribers = self.inner.subscribers.lock().unwrap();
        for (id, tx) in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                tracing::debug!(subscriber_id = id, "dropping event for slow subscriber");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> BoardEvent {
        BoardEvent::new(BoardEventKind::TaskCreated, Uuid::new_v4(), Some("t1".to_string()), "created")
    }

    #[tokio::test]
    async fn subscriber_receives_broadcast_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.broadcast(sample_event());
        let received = sub.receiver.recv().await.unwrap();
        assert_eq!(received.kind, BoardEventKind::TaskCreated);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        bus.unsubscribe(sub.id);
        assert_eq!(bus.subscriber_count(), 0);
        bus.broadcast(sample_event());
        // Channel is closed, not just empty.
        let mut receiver = sub.receiver;
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_drops_without_blocking_others() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        // Fill the slow subscriber's queue without draining it.
        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY + 5 {
            bus.broadcast(sample_event());
        }

        // The fast subscriber still received events up to its own capacity.
        assert!(fast.receiver.try_recv().is_ok());
        // The slow one is simply full, not broken -- still readable.
        assert!(slow.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.broadcast(sample_event());
        assert!(a.receiver.recv().await.is_some());
        assert!(b.receiver.recv().await.is_some());
    }
}
