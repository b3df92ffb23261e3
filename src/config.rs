use anyhow::{Context, Result};

use crate::ingest::MqttConfig;
use crate::store::StoreConfig;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the REST/WebSocket surface.
    pub allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Reads configuration from the environment. Variable names and
    /// defaults match the deployed portal setup.
    pub fn from_env() -> Result<Self> {
        let mqtt = MqttConfig {
            host: env_or("MQTT_BROKER_IP", "localhost"),
            port: parse_port("MQTT_BROKER_PORT", 1883)?,
            client_id: env_or("MQTT_CLIENT_ID", "iot_backend_client"),
            topic: env_or("MQTT_TOPIC", "/oneM2M/req/+/+/json"),
        };

        let store = StoreConfig {
            url: env_or("POSTGRES_URL", "host=localhost user=postgres dbname=iot"),
            table: env_or("SENSOR_TABLE", "sensor"),
        };

        let api = ApiConfig {
            host: env_or("API_HOST", "0.0.0.0"),
            port: parse_port("API_PORT", 8000)?,
            allowed_origins: env_or("PORTAL_URL", "http://localhost:5173")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        Ok(Self { mqtt, store, api })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_port(key: &str, default: u16) -> Result<u16> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("{key} must be a port number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
