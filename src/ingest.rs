use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::IngestBridge;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("mqtt subscribe failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Subscription topic pattern, e.g. `/oneM2M/req/+/+/json`.
    pub topic: String,
}

/// The inbound transport subscription. Owns the single MQTT event loop and
/// feeds each published payload to the bridge, strictly sequentially.
pub struct MqttIngest {
    join: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl MqttIngest {
    pub async fn start(
        cfg: MqttConfig,
        bridge: IngestBridge,
        shutdown: CancellationToken,
    ) -> Result<Self, TransportError> {
        let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(30));

        let (client, mut event_loop) = AsyncClient::new(opts, 10);
        client.subscribe(&cfg.topic, QoS::AtLeastOnce).await?;

        info!(host = %cfg.host, port = cfg.port, topic = %cfg.topic, "mqtt ingest started");

        let task_shutdown = shutdown.clone();
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_shutdown.cancelled() => {
                        info!("mqtt ingest shutdown requested");
                        break;
                    }
                    ev = event_loop.poll() => {
                        match ev {
                            Ok(Event::Incoming(Packet::Publish(publish))) => {
                                // awaited inline: one message at a time, in
                                // broker order
                                bridge.on_message(&publish.topic, &publish.payload).await;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("mqtt poll error: {e}");
                                tokio::time::sleep(Duration::from_millis(250)).await;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self { join, shutdown })
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!("mqtt ingest task join failed: {e}");
        }
    }
}
