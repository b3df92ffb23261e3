use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::decode;
use crate::models::reading::SensorReading;
use crate::registry::ObserverRegistry;
use crate::store::ReadingStore;

/// Readings waiting for fan-out. Sized for ingest bursts; when the worker
/// falls this far behind, further readings skip broadcast (best effort)
/// rather than stalling the MQTT loop.
const DELIVERY_QUEUE_CAPACITY: usize = 1024;

/// Spawns the delivery context: one worker task that drains the handoff
/// queue and runs a broadcast sweep per reading. Owned by the caller and
/// stopped via `shutdown`; there is no ambient global loop.
pub fn spawn_delivery_worker(
    registry: Arc<ObserverRegistry>,
    shutdown: CancellationToken,
) -> (mpsc::Sender<SensorReading>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<SensorReading>(DELIVERY_QUEUE_CAPACITY);

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("delivery worker shutdown requested");
                    break;
                }
                reading = rx.recv() => {
                    match reading {
                        Some(reading) => {
                            debug!(sensor = %reading.sensor_name, "broadcast sweep");
                            registry.broadcast(&reading).await;
                        }
                        None => break,
                    }
                }
            }
        }
    });

    (tx, join)
}

/// Translates one inbound MQTT message into persistence + broadcast.
///
/// Persistence and broadcast are independent side effects of the same
/// input: an append failure does not suppress broadcast and vice versa.
/// Broadcast is handed to the delivery worker through a bounded channel,
/// so this never awaits observer I/O.
pub struct IngestBridge {
    store: Arc<dyn ReadingStore>,
    delivery: mpsc::Sender<SensorReading>,
}

impl IngestBridge {
    pub fn new(store: Arc<dyn ReadingStore>, delivery: mpsc::Sender<SensorReading>) -> Self {
        Self { store, delivery }
    }

    /// Handles one raw payload from the subscription loop. Every failure
    /// mode is logged and contained; nothing propagates back to the
    /// transport.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) {
        let reading = match decode(payload) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(%topic, "dropping undecodable message: {e}");
                return;
            }
        };

        if let Err(e) = self.store.append(&reading).await {
            warn!(sensor = %reading.sensor_name, "append failed, reading is still broadcast: {e}");
        }

        if self.delivery.try_send(reading).is_err() {
            warn!("delivery queue unavailable, skipping broadcast");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::store::StoreError;

    #[derive(Default)]
    struct MockStore {
        appended: Mutex<Vec<SensorReading>>,
        fail_append: AtomicBool,
    }

    #[async_trait]
    impl ReadingStore for MockStore {
        async fn append(&self, reading: &SensorReading) -> Result<(), StoreError> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(StoreError::InvalidIdentifier("boom".into()));
            }
            self.appended.lock().await.push(reading.clone());
            Ok(())
        }

        async fn recent(&self, limit: Option<i64>) -> Result<Vec<SensorReading>, StoreError> {
            let limit = crate::store::resolve_limit(limit)? as usize;
            Ok(self.appended.lock().await.iter().rev().take(limit).cloned().collect())
        }
    }

    fn envelope(name: &str) -> Vec<u8> {
        serde_json::json!({
            "m2m:rqp": {
                "to": format!("/cse-1/cb/{name}/data"),
                "pc": { "m2m:cin": { "con": r#"{"temperature": 21.0, "humidity": 50.0}"# } }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn good_message_is_persisted_and_delivered() {
        let store = Arc::new(MockStore::default());
        let registry = Arc::new(ObserverRegistry::new());
        let (_id, mut rx) = registry.register().await;

        let shutdown = CancellationToken::new();
        let (tx, worker) = spawn_delivery_worker(registry.clone(), shutdown.clone());
        let bridge = IngestBridge::new(store.clone(), tx);

        bridge.on_message("/oneM2M/req/x/y/json", &envelope("dht22")).await;

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["sensor_nm"], "dht22");

        let appended = store.appended.lock().await;
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].sensor_name, "dht22");

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_message_is_dropped_entirely() {
        let store = Arc::new(MockStore::default());
        let (tx, mut rx) = mpsc::channel(8);
        let bridge = IngestBridge::new(store.clone(), tx);

        bridge.on_message("t", b"garbage").await;

        assert!(store.appended.lock().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn append_failure_does_not_suppress_broadcast() {
        let store = Arc::new(MockStore::default());
        store.fail_append.store(true, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::channel(8);
        let bridge = IngestBridge::new(store.clone(), tx);

        bridge.on_message("t", &envelope("s1")).await;

        assert!(store.appended.lock().await.is_empty());
        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.sensor_name, "s1");
    }

    #[tokio::test]
    async fn stalled_delivery_never_blocks_ingest() {
        let store = Arc::new(MockStore::default());
        // capacity-1 queue with no worker draining it: the second message
        // finds it full and must still complete promptly
        let (tx, _rx) = mpsc::channel(1);
        let bridge = IngestBridge::new(store.clone(), tx);

        bridge.on_message("t", &envelope("s1")).await;
        tokio::time::timeout(Duration::from_millis(200), bridge.on_message("t", &envelope("s2")))
            .await
            .expect("on_message must not wait on the delivery queue");

        // both were still persisted
        assert_eq!(store.appended.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn delivery_preserves_ingest_order() {
        let store = Arc::new(MockStore::default());
        let (tx, mut rx) = mpsc::channel(8);
        let bridge = IngestBridge::new(store, tx);

        bridge.on_message("t", &envelope("first")).await;
        bridge.on_message("t", &envelope("second")).await;

        assert_eq!(rx.try_recv().unwrap().sensor_name, "first");
        assert_eq!(rx.try_recv().unwrap().sensor_name, "second");
    }
}
