use tracing::{debug, error, info, warn};

use crate::{
    clients::broker::Broker,
    models::{
        headers::{HeaderValue, Headers},
        message::{Delivery, Message},
        retry::{RETRY_COUNT_HEADER, RetryTopology},
        status::{DeadLetterReason, Outcome},
    },
};

/// Retries already attempted for a message. Absent, negative or non-integer
/// values all count as zero; any integer width is accepted because the
/// header may come back from a delay queue in a different encoding.
pub fn retry_count(headers: &Headers) -> u32 {
    headers
        .get(RETRY_COUNT_HEADER)
        .and_then(HeaderValue::as_i64)
        .and_then(|count| u32::try_from(count).ok())
        .unwrap_or(0)
}

/// Copy of `headers` with the retry count set to `attempt`.
pub fn populate_header(headers: &Headers, attempt: u32) -> Headers {
    let mut headers = headers.clone();
    let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
    headers.insert(RETRY_COUNT_HEADER, HeaderValue::I32(attempt));
    headers
}

/// Routes failed deliveries through the delay queues, or into the
/// dead-letter queue once every tier has been used.
#[derive(Debug, Clone, Default)]
pub struct RetryRouter {
    topology: RetryTopology,
}

impl RetryRouter {
    pub fn new(topology: RetryTopology) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &RetryTopology {
        &self.topology
    }

    pub fn retry_queue_name(&self, attempt: u32) -> Option<&str> {
        self.topology.queue_for(attempt)
    }

    /// Resolves `delivery` for attempt number `attempt` (1-based). The
    /// attempt that reaches the tier count is rejected without requeue.
    ///
    /// The original is acknowledged before the delayed copy is published. A
    /// failed publish is logged and never retried here.
    pub async fn retry(&self, broker: &dyn Broker, delivery: &Delivery, attempt: u32) -> Outcome {
        let message_id = delivery.message.id();

        let queue = match self.retry_queue_name(attempt) {
            Some(queue) if !self.topology.is_exhausted(attempt) => queue,
            _ => {
                warn!(
                    message_id,
                    attempt,
                    max_attempts = self.topology.max_attempts(),
                    "Retries exhausted, dead-lettering message"
                );
                return reject(
                    broker,
                    delivery,
                    false,
                    Outcome::DeadLettered(DeadLetterReason::RetriesExhausted),
                )
                .await;
            }
        };

        let retried = Message {
            body: delivery.message.body.clone(),
            headers: populate_header(&delivery.message.headers, attempt),
            content_type: delivery.message.content_type.clone(),
            message_id: delivery.message.message_id.clone(),
        };

        if let Err(e) = broker.ack(delivery.delivery_tag).await {
            warn!(
                message_id,
                attempt,
                error = %e,
                "Failed to acknowledge message before retry, requeueing"
            );
            return reject(broker, delivery, true, Outcome::Requeued).await;
        }

        match broker.publish(&self.topology.exchange, queue, &retried).await {
            Ok(()) => {
                info!(message_id, attempt, queue, "Message scheduled for retry");
                Outcome::Retrying {
                    attempt,
                    queue: queue.to_string(),
                }
            }
            Err(e) => {
                error!(
                    message_id,
                    attempt,
                    queue,
                    error = %e,
                    "Failed to publish retry, message dropped"
                );
                Outcome::RetryPublishFailed {
                    attempt,
                    queue: queue.to_string(),
                }
            }
        }
    }
}

/// Rejects `delivery`, returning `resolved` on success and
/// [`Outcome::Unresolved`] when the broker refuses the call.
pub(crate) async fn reject(
    broker: &dyn Broker,
    delivery: &Delivery,
    requeue: bool,
    resolved: Outcome,
) -> Outcome {
    match broker.reject(delivery.delivery_tag, requeue).await {
        Ok(()) => {
            debug!(message_id = delivery.message.id(), requeue, "Message rejected");
            resolved
        }
        Err(e) => {
            error!(
                message_id = delivery.message.id(),
                requeue,
                error = %e,
                "Failed to reject message"
            );
            Outcome::Unresolved
        }
    }
}
