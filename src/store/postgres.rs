use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{resolve_limit, validate_ident, PostgresClient, ReadingStore, StoreError};
use crate::models::reading::SensorReading;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `tokio_postgres` connection string, e.g.
    /// `host=localhost user=postgres dbname=iot`.
    pub url: String,
    pub table: String,
}

/// Postgres-backed [`ReadingStore`].
pub struct PostgresStore {
    client: PostgresClient,
    table: String,
}

impl PostgresStore {
    /// Connects and ensures the readings table and its ordering index exist.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        validate_ident(&cfg.table)?;

        let client = PostgresClient::connect(&cfg.url).await?;
        let store = Self {
            client,
            table: cfg.table.clone(),
        };
        store.ensure_table().await?;

        info!(table = %store.table, "connected to postgres");
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        // sensor_id is intentionally not unique: readings from the same
        // sensor within one second share an id.
        let create = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                sensor_id   TEXT NOT NULL,
                sensor_nm   TEXT NOT NULL,
                temperature DOUBLE PRECISION,
                humidity    DOUBLE PRECISION,
                create_dt   TIMESTAMPTZ NOT NULL
            )
            "#,
            t = self.table
        );
        self.client.execute(&create, &[]).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {t}_create_dt_idx ON {t} (create_dt DESC)",
            t = self.table
        );
        self.client.execute(&index, &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for PostgresStore {
    async fn append(&self, reading: &SensorReading) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {t} (sensor_id, sensor_nm, temperature, humidity, create_dt)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            t = self.table
        );

        self.client
            .execute(
                &sql,
                &[
                    &reading.sensor_id,
                    &reading.sensor_name,
                    &reading.temperature,
                    &reading.humidity,
                    &reading.created_at,
                ],
            )
            .await?;

        debug!(sensor = %reading.sensor_name, "reading persisted");
        Ok(())
    }

    async fn recent(&self, limit: Option<i64>) -> Result<Vec<SensorReading>, StoreError> {
        let limit = resolve_limit(limit)?;

        let sql = format!(
            r#"
            SELECT sensor_id, sensor_nm, temperature, humidity, create_dt
            FROM {t}
            ORDER BY create_dt DESC
            LIMIT $1
            "#,
            t = self.table
        );

        let rows = self.client.query(&sql, &[&limit]).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let created_at: DateTime<Utc> = row.get("create_dt");
                SensorReading {
                    sensor_id: row.get("sensor_id"),
                    sensor_name: row.get("sensor_nm"),
                    temperature: row.get("temperature"),
                    humidity: row.get("humidity"),
                    created_at,
                }
            })
            .collect())
    }
}
