use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::reading::SensorReading;

/// Serialized messages an observer may have queued before it counts as
/// stalled. A client that stopped draining its socket falls this far
/// behind only if it is effectively dead.
const OUTBOUND_QUEUE_CAPACITY: usize = 32;

pub type ObserverId = u64;

/// Why one observer did not receive a broadcast message.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("observer outbound queue full")]
    Backlogged,

    #[error("observer disconnected")]
    Disconnected,
}

/// Tracks connected WebSocket observers.
///
/// Each observer owns a bounded outbound queue; delivery into the queue is
/// synchronous and non-blocking, so one stalled observer never delays the
/// sweep for the others. The queue preserves FIFO order per observer.
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<HashMap<ObserverId, mpsc::Sender<String>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Adds an observer, returning its id and the receiving end of its
    /// outbound queue. The caller (the WebSocket session) drains the
    /// receiver into the socket.
    pub async fn register(&self) -> (ObserverId, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let count = {
            let mut observers = self.observers.write().await;
            observers.insert(id, tx);
            observers.len()
        };

        info!(observer = id, connected = count, "observer registered");
        (id, rx)
    }

    /// Removes an observer. A no-op when the id is already gone (e.g. it
    /// was evicted by a failed broadcast sweep before the session ended).
    pub async fn unregister(&self, id: ObserverId) {
        let removed = {
            let mut observers = self.observers.write().await;
            observers.remove(&id).is_some()
        };

        if removed {
            let count = self.observers.read().await.len();
            info!(observer = id, connected = count, "observer unregistered");
        }
    }

    pub async fn len(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.observers.read().await.is_empty()
    }

    /// Delivers one reading to every currently registered observer.
    ///
    /// The reading is serialized once; delivery runs over a point-in-time
    /// snapshot of membership taken at sweep start, outside the lock, so
    /// register/unregister may proceed concurrently. Observers that fail
    /// are evicted as part of the same sweep. Never returns an error.
    pub async fn broadcast(&self, reading: &SensorReading) {
        let message = match serde_json::to_string(reading) {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to serialize reading for broadcast: {e}");
                return;
            }
        };

        let snapshot: Vec<(ObserverId, mpsc::Sender<String>)> = {
            let observers = self.observers.read().await;
            observers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut failed: Vec<ObserverId> = Vec::new();
        for (id, tx) in snapshot {
            if let Err(e) = Self::try_deliver(&tx, message.clone()) {
                warn!(observer = id, "dropping observer: {e}");
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write().await;
            for id in failed {
                observers.remove(&id);
            }
            debug!(connected = observers.len(), "broadcast sweep evicted observers");
        }
    }

    fn try_deliver(tx: &mpsc::Sender<String>, message: String) -> Result<(), DeliveryError> {
        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backlogged,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(name: &str) -> SensorReading {
        SensorReading::new(name, Some(20.0), Some(40.0))
    }

    #[tokio::test]
    async fn broadcast_reaches_every_observer() {
        let registry = ObserverRegistry::new();
        let (_a, mut rx_a) = registry.register().await;
        let (_b, mut rx_b) = registry.register().await;

        registry.broadcast(&reading("s1")).await;

        let msg_a = rx_a.try_recv().unwrap();
        let msg_b = rx_b.try_recv().unwrap();
        assert_eq!(msg_a, msg_b);

        let v: serde_json::Value = serde_json::from_str(&msg_a).unwrap();
        assert_eq!(v["sensor_nm"], "s1");
    }

    #[tokio::test]
    async fn dead_observer_is_evicted_others_still_receive() {
        let registry = ObserverRegistry::new();
        let (_a, mut rx_a) = registry.register().await;
        let (dead, rx_dead) = registry.register().await;
        let (_c, mut rx_c) = registry.register().await;
        drop(rx_dead);

        registry.broadcast(&reading("s1")).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert_eq!(registry.len().await, 2);

        // eviction is part of the sweep, not a later pass
        let observers = registry.observers.read().await;
        assert!(!observers.contains_key(&dead));
    }

    #[tokio::test]
    async fn backlogged_observer_is_evicted_healthy_one_keeps_receiving() {
        let registry = ObserverRegistry::new();
        let (slow, mut rx_slow) = registry.register().await;
        let (_ok, mut rx_ok) = registry.register().await;

        // the slow observer never drains; the healthy one keeps up
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            registry.broadcast(&reading("s1")).await;
            rx_ok.try_recv().unwrap();
        }

        // slow queue is now full, so this sweep evicts it
        registry.broadcast(&reading("s1")).await;
        rx_ok.try_recv().unwrap();

        assert_eq!(registry.len().await, 1);
        assert!(!registry.observers.read().await.contains_key(&slow));

        let mut slow_count = 0;
        while rx_slow.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(slow_count, OUTBOUND_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn per_observer_order_follows_broadcast_order() {
        let registry = ObserverRegistry::new();
        let (_id, mut rx) = registry.register().await;

        registry.broadcast(&reading("first")).await;
        registry.broadcast(&reading("second")).await;
        registry.broadcast(&reading("third")).await;

        for expected in ["first", "second", "third"] {
            let v: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(v["sensor_nm"], expected);
        }
    }

    #[tokio::test]
    async fn unregister_absent_id_is_a_noop() {
        let registry = ObserverRegistry::new();
        registry.unregister(42).await;
        assert!(registry.is_empty().await);

        let (id, _rx) = registry.register().await;
        registry.unregister(id).await;
        registry.unregister(id).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn register_allocates_unique_ids() {
        let registry = ObserverRegistry::new();
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;

        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn broadcast_with_no_observers_is_fine() {
        let registry = ObserverRegistry::new();
        registry.broadcast(&reading("s1")).await;
    }
}
