pub mod api;
pub mod bridge;
pub mod config;
pub mod decode;
pub mod ingest;
pub mod models;
pub mod registry;
pub mod store;

pub use bridge::{spawn_delivery_worker, IngestBridge};
pub use config::Config;
pub use decode::{decode, DecodeError};
pub use ingest::{MqttConfig, MqttIngest, TransportError};
pub use models::reading::SensorReading;
pub use registry::{DeliveryError, ObserverId, ObserverRegistry};
pub use store::{PostgresStore, ReadingStore, StoreError};
