use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    clients::{
        broker::{Broker, ExclusivePublisher},
        database::DeadLetterRepository,
    },
    error::StoreError,
    models::{
        dead_letter::{DeadLetterRecord, NewDeadLetter},
        message::{Delivery, JSON_CONTENT_TYPE, Message},
        retry::DEATH_HEADER,
    },
};

/// Persists messages that reached the dead-letter queue and replays them
/// onto the main queue on request.
pub struct DeadLetterStore {
    repository: Arc<dyn DeadLetterRepository>,
    publisher: ExclusivePublisher,
    main_queue: String,
}

impl DeadLetterStore {
    pub fn new(
        repository: Arc<dyn DeadLetterRepository>,
        publisher: Arc<dyn Broker>,
        main_queue: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            publisher: ExclusivePublisher::new(publisher),
            main_queue: main_queue.into(),
        }
    }

    pub fn repository(&self) -> Arc<dyn DeadLetterRepository> {
        Arc::clone(&self.repository)
    }

    /// Stores `delivery` and acknowledges it. When the insert or the ack
    /// fails the delivery is handed back to the broker so it is not lost;
    /// the insert is idempotent, so a redelivery stores nothing twice.
    pub async fn persist(&self, broker: &dyn Broker, delivery: &Delivery) -> Result<(), StoreError> {
        let message = &delivery.message;
        let message_id = match message.message_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let generated = Uuid::new_v4().to_string();
                warn!(
                    message_id = %generated,
                    "Dead letter arrived without a message id, assigned one"
                );
                generated
            }
        };

        let record = NewDeadLetter {
            message_id,
            headers: message.headers.to_json(),
            body: message.body.clone(),
            content_type: message.content_type.clone(),
        };

        if let Err(e) = self.repository.insert(&record).await {
            error!(
                message_id = %record.message_id,
                error = %e,
                "Failed to persist dead letter, requeueing"
            );
            if let Err(reject_err) = broker.reject(delivery.delivery_tag, true).await {
                error!(
                    message_id = %record.message_id,
                    error = %reject_err,
                    "Failed to requeue dead letter after insert failure"
                );
            }
            return Err(e);
        }

        if let Err(e) = broker.ack(delivery.delivery_tag).await {
            warn!(
                message_id = %record.message_id,
                error = %e,
                "Dead letter stored but acknowledgement failed, requeueing"
            );
            if let Err(reject_err) = broker.reject(delivery.delivery_tag, true).await {
                error!(
                    message_id = %record.message_id,
                    error = %reject_err,
                    "Failed to requeue dead letter after acknowledgement failure"
                );
            }
            return Err(StoreError::from(e));
        }

        info!(message_id = %record.message_id, "Dead letter persisted");

        Ok(())
    }

    /// Up to `limit` records, newest first. One undecodable row fails the
    /// whole call.
    pub async fn list(&self, limit: i64) -> Result<Vec<DeadLetterRecord>, StoreError> {
        let rows = self.repository.list_recent(limit.max(0)).await?;

        rows.into_iter()
            .map(|row| {
                let message_id = row.message_id.clone();
                DeadLetterRecord::from_row(row).inspect_err(|e| {
                    error!(message_id = %message_id, error = %e, "Undecodable dead letter headers");
                })
            })
            .collect()
    }

    /// Publishes the stored message back onto the main queue, then deletes
    /// it. A failed delete leaves a duplicate row behind, never a lost message.
    pub async fn requeue(&self, message_id: &str) -> Result<(), StoreError> {
        let row = self
            .repository
            .fetch(message_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(message_id.to_string()))?;

        let record = DeadLetterRecord::from_row(row)?;

        let message = Message {
            body: record.body,
            headers: record.headers.without(DEATH_HEADER),
            content_type: Some(
                record
                    .content_type
                    .unwrap_or_else(|| JSON_CONTENT_TYPE.to_string()),
            ),
            message_id: Some(message_id.to_string()),
        };

        self.publisher
            .publish("", &self.main_queue, &message)
            .await
            .map_err(|e| {
                error!(message_id, error = %e, "Failed to publish requeued message");
                StoreError::from(e)
            })?;

        let deleted = self.repository.delete(message_id).await.map_err(|e| {
            error!(
                message_id,
                error = %e,
                "Message requeued but could not be deleted from storage"
            );
            e
        })?;

        if deleted == 0 {
            warn!(message_id, "Requeued message was already removed from storage");
        }

        info!(message_id, queue = %self.main_queue, "Message requeued successfully");

        Ok(())
    }
}
