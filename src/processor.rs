use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    clients::{broker::Broker, email::EmailSender},
    error::SendError,
    models::{
        message::{Delivery, NotificationRequest},
        status::{DeadLetterReason, Outcome},
    },
    retry::{RetryRouter, reject, retry_count},
};

/// Turns one received notification into exactly one ack or reject.
pub struct DeliveryProcessor {
    sender: Arc<dyn EmailSender>,
    router: RetryRouter,
    send_timeout: Option<Duration>,
}

impl DeliveryProcessor {
    pub fn new(sender: Arc<dyn EmailSender>, router: RetryRouter) -> Self {
        Self {
            sender,
            router,
            send_timeout: None,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Option<Duration>) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub async fn process(&self, broker: &dyn Broker, delivery: &Delivery) -> Outcome {
        let message_id = delivery.message.id();
        let attempts = retry_count(&delivery.message.headers);

        let request = match serde_json::from_slice::<NotificationRequest>(&delivery.message.body) {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    message_id,
                    error = %e,
                    "Malformed notification payload, dead-lettering"
                );
                return reject(
                    broker,
                    delivery,
                    false,
                    Outcome::DeadLettered(DeadLetterReason::MalformedPayload),
                )
                .await;
            }
        };

        info!(
            message_id,
            recipient = %request.email,
            retry_count = attempts,
            "Processing notification"
        );

        match self.send(&request).await {
            Ok(()) => match broker.ack(delivery.delivery_tag).await {
                Ok(()) => {
                    info!(message_id, recipient = %request.email, "Notification sent");
                    Outcome::Delivered
                }
                Err(e) => {
                    warn!(
                        message_id,
                        error = %e,
                        "Failed to acknowledge sent notification, requeueing"
                    );
                    reject(broker, delivery, true, Outcome::Requeued).await
                }
            },
            Err(e) if e.is_permanent() => {
                warn!(
                    message_id,
                    error = %e,
                    "Permanent send failure, dead-lettering"
                );
                reject(
                    broker,
                    delivery,
                    false,
                    Outcome::DeadLettered(DeadLetterReason::InvalidRecipient),
                )
                .await
            }
            Err(e) => {
                warn!(
                    message_id,
                    retry_count = attempts,
                    error = %e,
                    "Send failed, scheduling retry"
                );
                self.router
                    .retry(broker, delivery, attempts.saturating_add(1))
                    .await
            }
        }
    }

    async fn send(&self, request: &NotificationRequest) -> Result<(), SendError> {
        let send = self
            .sender
            .send(&request.email, &request.message, &request.subject);

        match self.send_timeout {
            Some(limit) => timeout(limit, send)
                .await
                .map_err(|_| SendError::Transient(format!("send timed out after {:?}", limit)))?,
            None => send.await,
        }
    }
}
