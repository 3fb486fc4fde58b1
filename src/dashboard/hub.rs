use crate::dashboard::notifications::Notification;
use crate::dashboard::protocol::ServerMessage;
use crate::status::{BuildStatus, OutputLine};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type ObserverId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The observer's connection is gone
    Closed,
    /// The observer stopped draining its queue
    Lagging,
}

/// A connected client that receives pushed messages.
///
/// `deliver` must never block; the hub calls it while holding locks.
pub trait Observer: Send + Sync {
    fn deliver(&self, message: Arc<ServerMessage>) -> Result<(), DeliveryError>;
    fn is_open(&self) -> bool;
}

/// Observer backed by a bounded channel drained by a connection's writer task
pub struct ChannelObserver {
    tx: mpsc::Sender<Arc<ServerMessage>>,
}

impl ChannelObserver {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<ServerMessage>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, message: Arc<ServerMessage>) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
        })
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Fan-out of status, output and notification pushes to every live observer
pub struct BroadcastHub {
    observers: Mutex<HashMap<ObserverId, Arc<dyn Observer>>>,
    next_id: AtomicU64,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer and push it a full snapshot before anything else.
    ///
    /// Callers pass the snapshot while holding the aggregate lock so that no
    /// mutation can slip between the snapshot and registration.
    pub fn subscribe(&self, observer: Arc<dyn Observer>, snapshot: BuildStatus) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match observer.deliver(Arc::new(ServerMessage::Status(snapshot))) {
            Ok(()) => {
                self.observers.lock().insert(id, observer);
                tracing::debug!(observer = id, "Observer subscribed");
            }
            Err(err) => {
                tracing::debug!(observer = id, ?err, "Observer closed before subscribing");
            }
        }
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(observer = id, "Observer unsubscribed");
        }
        removed
    }

    pub fn broadcast_status(&self, status: BuildStatus) {
        self.fan_out(ServerMessage::Status(status));
    }

    /// Push only the new output lines
    pub fn broadcast_delta(&self, lines: Vec<OutputLine>) {
        if lines.is_empty() {
            return;
        }
        self.fan_out(ServerMessage::BuildOutput(lines));
    }

    pub fn broadcast_notifications(&self, notifications: Vec<Notification>) {
        self.fan_out(ServerMessage::Notifications(notifications));
    }

    pub fn broadcast_error(&self, message: impl Into<String>) {
        self.fan_out(ServerMessage::Error(message.into()));
    }

    /// Push a reply to one observer; returns false if it is gone
    pub fn send_to(&self, id: ObserverId, message: ServerMessage) -> bool {
        let mut observers = self.observers.lock();
        let Some(observer) = observers.get(&id) else {
            return false;
        };
        match observer.deliver(Arc::new(message)) {
            Ok(()) => true,
            Err(err) => {
                observers.remove(&id);
                crate::log_observer_dropped!(id, err);
                false
            }
        }
    }

    /// Drop observers whose connections have closed
    pub fn housekeeping(&self) -> usize {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|_, o| o.is_open());
        before - observers.len()
    }

    pub fn live_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn fan_out(&self, message: ServerMessage) {
        let message = Arc::new(message);
        let mut observers = self.observers.lock();
        let failed: Vec<(ObserverId, DeliveryError)> = observers
            .iter()
            .filter_map(|(id, observer)| {
                observer
                    .deliver(Arc::clone(&message))
                    .err()
                    .map(|err| (*id, err))
            })
            .collect();
        for (id, err) in failed {
            observers.remove(&id);
            crate::log_observer_dropped!(id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::BuildStatus;

    fn idle() -> BuildStatus {
        BuildStatus::idle(&["core"], 10)
    }

    struct RecordingObserver {
        seen: Mutex<Vec<Arc<ServerMessage>>>,
    }

    impl Observer for RecordingObserver {
        fn deliver(&self, message: Arc<ServerMessage>) -> Result<(), DeliveryError> {
            self.seen.lock().push(message);
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_subscribe_pushes_snapshot_first() {
        let hub = BroadcastHub::new();
        let (observer, mut rx) = ChannelObserver::channel(8);
        hub.subscribe(Arc::new(observer), idle());
        let first = rx.try_recv().unwrap();
        assert!(matches!(*first, ServerMessage::Status(_)));
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.live_count(), 1);
    }

    #[test]
    fn test_broadcast_reaches_all_observers() {
        let hub = BroadcastHub::new();
        let a = Arc::new(RecordingObserver {
            seen: Mutex::new(Vec::new()),
        });
        let b = Arc::new(RecordingObserver {
            seen: Mutex::new(Vec::new()),
        });
        hub.subscribe(a.clone(), idle());
        hub.subscribe(b.clone(), idle());
        hub.broadcast_delta(vec![OutputLine::info("x")]);
        hub.broadcast_error("oops");
        assert_eq!(a.seen.lock().len(), 3);
        assert_eq!(b.seen.lock().len(), 3);
    }

    #[test]
    fn test_closed_observer_is_dropped_silently() {
        let hub = BroadcastHub::new();
        let (closed, rx) = ChannelObserver::channel(8);
        hub.subscribe(Arc::new(closed), idle());
        drop(rx);
        let (open, mut open_rx) = ChannelObserver::channel(8);
        hub.subscribe(Arc::new(open), idle());
        assert_eq!(hub.live_count(), 2);

        hub.broadcast_status(idle());
        assert_eq!(hub.live_count(), 1);
        assert!(open_rx.try_recv().is_ok());
        assert!(open_rx.try_recv().is_ok());
    }

    #[test]
    fn test_lagging_observer_does_not_block_others() {
        let hub = BroadcastHub::new();
        let (slow, _slow_rx) = ChannelObserver::channel(1);
        hub.subscribe(Arc::new(slow), idle());
        let (fast, mut fast_rx) = ChannelObserver::channel(16);
        hub.subscribe(Arc::new(fast), idle());

        for i in 0..5 {
            hub.broadcast_delta(vec![OutputLine::info(format!("line {}", i))]);
        }
        assert_eq!(hub.live_count(), 1);
        let mut received = 0;
        while fast_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 6);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = BroadcastHub::new();
        let (observer, _rx) = ChannelObserver::channel(4);
        let id = hub.subscribe(Arc::new(observer), idle());
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.live_count(), 0);
    }

    #[test]
    fn test_housekeeping_removes_closed() {
        let hub = BroadcastHub::new();
        let (observer, rx) = ChannelObserver::channel(4);
        hub.subscribe(Arc::new(observer), idle());
        drop(rx);
        assert_eq!(hub.housekeeping(), 1);
        assert_eq!(hub.live_count(), 0);
    }

    #[test]
    fn test_send_to_targets_one_observer() {
        let hub = BroadcastHub::new();
        let (a, mut a_rx) = ChannelObserver::channel(4);
        let (b, mut b_rx) = ChannelObserver::channel(4);
        let a_id = hub.subscribe(Arc::new(a), idle());
        hub.subscribe(Arc::new(b), idle());
        a_rx.try_recv().unwrap();
        b_rx.try_recv().unwrap();

        assert!(hub.send_to(a_id, ServerMessage::Error("only a".to_string())));
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
        assert!(!hub.send_to(999, ServerMessage::Error("nobody".to_string())));
    }

    #[test]
    fn test_empty_delta_not_sent() {
        let hub = BroadcastHub::new();
        let (observer, mut rx) = ChannelObserver::channel(4);
        hub.subscribe(Arc::new(observer), idle());
        rx.try_recv().unwrap();
        hub.broadcast_delta(Vec::new());
        assert!(rx.try_recv().is_err());
    }
}
