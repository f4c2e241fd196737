use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::{
    clients::broker::{Broker, BrokerConnection, DeliveryStream},
    dead_letter::DeadLetterStore,
    error::BrokerError,
    models::message::Delivery,
    processor::DeliveryProcessor,
};

/// Work applied to every delivery a worker receives. The handler must ack or
/// reject the delivery before returning.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, broker: &dyn Broker, delivery: Delivery);
}

#[async_trait]
impl DeliveryHandler for DeliveryProcessor {
    async fn handle(&self, broker: &dyn Broker, delivery: Delivery) {
        let outcome = self.process(broker, &delivery).await;
        debug!(message_id = delivery.message.id(), %outcome, "Delivery resolved");
    }
}

#[async_trait]
impl DeliveryHandler for DeadLetterStore {
    async fn handle(&self, broker: &dyn Broker, delivery: Delivery) {
        if let Err(e) = self.persist(broker, &delivery).await {
            warn!(
                message_id = delivery.message.id(),
                error = %e,
                "Dead letter not persisted"
            );
        }
    }
}

/// Receives and handles deliveries one at a time until the stream closes.
/// Returns how many deliveries were handled.
pub async fn run_worker(
    broker: Arc<dyn Broker>,
    mut deliveries: DeliveryStream,
    handler: Arc<dyn DeliveryHandler>,
) -> usize {
    let mut handled = 0;

    while let Some(next) = deliveries.next().await {
        match next {
            Ok(delivery) => {
                handler.handle(broker.as_ref(), delivery).await;
                handled += 1;
            }
            Err(e) => {
                error!(error = %e, "Failed to receive delivery");
            }
        }
    }

    info!(handled, "Delivery stream closed, worker stopped");

    handled
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub main_queue: String,
    pub dead_letter_queue: String,
    pub workers: usize,
    pub dead_letter_workers: usize,
    pub prefetch: u16,
}

struct Consumer {
    span: Span,
    broker: Arc<dyn Broker>,
    deliveries: DeliveryStream,
    handler: Arc<dyn DeliveryHandler>,
}

/// Fixed set of consumers: `workers` on the main queue and
/// `dead_letter_workers` on the dead-letter queue, each on its own channel.
pub struct WorkerPool {
    connection: Arc<dyn BrokerConnection>,
    processor: Arc<DeliveryProcessor>,
    store: Arc<DeadLetterStore>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        connection: Arc<dyn BrokerConnection>,
        processor: Arc<DeliveryProcessor>,
        store: Arc<DeadLetterStore>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            connection,
            processor,
            store,
            config,
        }
    }

    /// Opens every channel and spawns the workers. Fails without spawning
    /// anything if a channel cannot be opened.
    pub async fn start(&self) -> Result<JoinSet<usize>, BrokerError> {
        let mut consumers = Vec::with_capacity(self.config.workers + self.config.dead_letter_workers);

        for id in 0..self.config.workers {
            let handler: Arc<dyn DeliveryHandler> = self.processor.clone();
            consumers.push(
                self.open(&self.config.main_queue, "notification_worker", id, handler)
                    .await?,
            );
        }

        for id in 0..self.config.dead_letter_workers {
            let handler: Arc<dyn DeliveryHandler> = self.store.clone();
            consumers.push(
                self.open(&self.config.dead_letter_queue, "dead_letter_worker", id, handler)
                    .await?,
            );
        }

        let mut workers = JoinSet::new();
        for consumer in consumers {
            workers.spawn(
                run_worker(consumer.broker, consumer.deliveries, consumer.handler)
                    .instrument(consumer.span),
            );
        }

        info!(
            workers = self.config.workers,
            dead_letter_workers = self.config.dead_letter_workers,
            prefetch = self.config.prefetch,
            "Worker pool started"
        );

        Ok(workers)
    }

    async fn open(
        &self,
        queue: &str,
        role: &str,
        id: usize,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Consumer, BrokerError> {
        let consumer_tag = format!("{}_{}", role, id);
        let (broker, deliveries) = self
            .connection
            .consume(queue, &consumer_tag, self.config.prefetch)
            .await?;
        Ok(Consumer {
            span: info_span!("worker", worker_id = id, role, queue),
            broker,
            deliveries,
            handler,
        })
    }

    /// Runs until every worker has stopped.
    pub async fn run(&self) -> Result<usize, Error> {
        let mut workers = self.start().await?;
        let mut handled = 0;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(count) => handled += count,
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }

        Ok(handled)
    }
}
