use anyhow::{Context, Error, Result};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::{
    error::StoreError,
    models::dead_letter::{DeadLetterRow, NewDeadLetter},
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS dlq_messages (
        message_id   TEXT PRIMARY KEY,
        headers      JSONB NOT NULL,
        body         BYTEA NOT NULL,
        content_type TEXT,
        received_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE INDEX IF NOT EXISTS dlq_messages_received_at_idx
        ON dlq_messages (received_at DESC);
"#;

/// Durable storage for dead-lettered messages, keyed by message id.
#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    /// Inserting an id that is already stored is a no-op.
    async fn insert(&self, record: &NewDeadLetter) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<DeadLetterRow>, StoreError>;

    async fn fetch(&self, message_id: &str) -> Result<Option<DeadLetterRow>, StoreError>;

    /// Returns the number of rows removed.
    async fn delete(&self, message_id: &str) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

pub struct PostgresDeadLetterRepository {
    client: Client,
}

impl PostgresDeadLetterRepository {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("Failed to connect to database")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .context("Failed to create dlq_messages table")?;

        debug!("Dead-letter schema ready");

        Ok(())
    }
}

fn to_row(row: &Row) -> Result<DeadLetterRow, StoreError> {
    Ok(DeadLetterRow {
        message_id: row.try_get("message_id")?,
        headers: row.try_get("headers")?,
        body: row.try_get("body")?,
        content_type: row.try_get("content_type")?,
        received_at: row.try_get("received_at")?,
    })
}

#[async_trait]
impl DeadLetterRepository for PostgresDeadLetterRepository {
    async fn insert(&self, record: &NewDeadLetter) -> Result<(), StoreError> {
        let inserted = self
            .client
            .execute(
                r#"
                INSERT INTO dlq_messages (message_id, headers, body, content_type)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (message_id) DO NOTHING
                "#,
                &[
                    &record.message_id,
                    &record.headers,
                    &record.body,
                    &record.content_type,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    message_id = %record.message_id,
                    "Failed to write dead letter to database"
                );
                StoreError::from(e)
            })?;

        debug!(
            message_id = %record.message_id,
            inserted,
            "Dead letter written to database"
        );

        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<DeadLetterRow>, StoreError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT message_id, headers, body, content_type, received_at
                FROM dlq_messages
                ORDER BY received_at DESC
                LIMIT $1
                "#,
                &[&limit],
            )
            .await?;

        rows.iter().map(to_row).collect()
    }

    async fn fetch(&self, message_id: &str) -> Result<Option<DeadLetterRow>, StoreError> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT message_id, headers, body, content_type, received_at
                FROM dlq_messages
                WHERE message_id = $1
                "#,
                &[&message_id],
            )
            .await?;

        row.as_ref().map(to_row).transpose()
    }

    async fn delete(&self, message_id: &str) -> Result<u64, StoreError> {
        let deleted = self
            .client
            .execute(
                "DELETE FROM dlq_messages WHERE message_id = $1",
                &[&message_id],
            )
            .await?;

        Ok(deleted)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client.query_one("SELECT 1", &[]).await?;

        Ok(())
    }
}
