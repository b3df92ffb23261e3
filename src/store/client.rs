use std::sync::Arc;

use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use super::StoreError;

/// Thin wrapper over one `tokio_postgres` client. The connection itself is
/// driven by a background task; the client is safe to share across the
/// ingest and read paths.
#[derive(Clone)]
pub struct PostgresClient {
    client: Arc<Client>,
}

impl PostgresClient {
    pub async fn connect(pg_url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(pg_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {e}");
            }
        });

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, StoreError> {
        self.client.execute(sql, params).await.map_err(StoreError::Postgres)
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>, StoreError> {
        self.client.query(sql, params).await.map_err(StoreError::Postgres)
    }
}
