use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::Mutex;

use crate::{
    error::BrokerError,
    models::message::{Delivery, Message},
};

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// Operations on a single broker channel. Implementations never retry;
/// retry policy lives in the retry router.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;
}

/// Source of channels. Every concurrent consumer gets its own channel.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Opens a fresh channel limited to `prefetch` unacknowledged deliveries
    /// and starts consuming `queue` on it.
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<(Arc<dyn Broker>, DeliveryStream), BrokerError>;

    /// Opens a fresh channel used only for publishing.
    async fn publisher(&self) -> Result<Arc<dyn Broker>, BrokerError>;

    fn is_connected(&self) -> bool;
}

/// Serializes publishes from many callers (HTTP handlers) onto one channel.
pub struct ExclusivePublisher {
    channel: Mutex<Arc<dyn Broker>>,
}

impl ExclusivePublisher {
    pub fn new(channel: Arc<dyn Broker>) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }

    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError> {
        let channel = self.channel.lock().await;
        channel.publish(exchange, routing_key, message).await
    }
}
