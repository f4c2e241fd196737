use std::sync::Arc;

use anyhow::{Context, Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    message::Delivery as AmqpDelivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldArray, FieldTable, LongString},
};
use tracing::{debug, info};

use crate::{
    clients::broker::{Broker, BrokerConnection, DeliveryStream},
    error::BrokerError,
    models::{
        headers::{HeaderValue, Headers},
        message::{Delivery, Message},
        retry::QueueTopology,
    },
};

const PERSISTENT: u8 = 2;

pub struct RabbitMqConnection {
    connection: Connection,
}

impl RabbitMqConnection {
    pub async fn connect(rabbitmq_url: &str) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("RabbitMQ connection established");

        Ok(Self { connection })
    }

    pub async fn open_channel(&self) -> Result<RabbitMqClient, BrokerError> {
        let channel = self.connection.create_channel().await?;
        Ok(RabbitMqClient { channel })
    }

    /// Declares exchanges, queues and bindings. Safe to run on every start.
    pub async fn declare_topology(&self, topology: &QueueTopology) -> Result<(), Error> {
        let client = self.open_channel().await?;
        let channel = &client.channel;
        let durable = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };

        channel
            .exchange_declare(
                &topology.retry.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare retry exchange")?;

        channel
            .queue_declare(
                &topology.main_queue,
                durable,
                dead_letter_arguments(&topology.dead_letter_queue, None),
            )
            .await
            .context("Failed to declare main queue")?;

        channel
            .queue_declare(&topology.dead_letter_queue, durable, FieldTable::default())
            .await
            .context("Failed to declare dead-letter queue")?;

        for tier in &topology.retry.tiers {
            channel
                .queue_declare(
                    &tier.queue,
                    durable,
                    dead_letter_arguments(&topology.main_queue, Some(tier.ttl_ms())),
                )
                .await
                .with_context(|| format!("Failed to declare {}", tier.queue))?;

            channel
                .queue_bind(
                    &tier.queue,
                    &topology.retry.exchange,
                    &tier.queue,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .with_context(|| format!("Failed to bind {} to retry exchange", tier.queue))?;

            debug!(queue = %tier.queue, ttl_ms = tier.ttl_ms(), "Delay queue declared");
        }

        info!(
            main_queue = %topology.main_queue,
            dead_letter_queue = %topology.dead_letter_queue,
            retry_tiers = topology.retry.tiers.len(),
            "Broker topology declared"
        );

        Ok(())
    }
}

fn dead_letter_arguments(routing_key: &str, ttl_ms: Option<u64>) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(LongString::from("")),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(LongString::from(routing_key)),
    );
    if let Some(ttl_ms) = ttl_ms {
        arguments.insert(
            "x-message-ttl".into(),
            AMQPValue::LongInt(ttl_ms.min(i32::MAX as u64) as i32),
        );
    }
    arguments
}

#[async_trait]
impl BrokerConnection for RabbitMqConnection {
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<(Arc<dyn Broker>, DeliveryStream), BrokerError> {
        let client = self.open_channel().await?;

        client
            .channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer = client
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(queue, consumer_tag, prefetch, "Consumer created");

        let deliveries = consumer
            .map(|result| result.map(to_delivery).map_err(BrokerError::from))
            .boxed();

        let channel: Arc<dyn Broker> = Arc::new(client);
        Ok((channel, deliveries))
    }

    async fn publisher(&self) -> Result<Arc<dyn Broker>, BrokerError> {
        Ok(Arc::new(self.open_channel().await?))
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}

/// One AMQP channel. Not shared between concurrent consumers.
pub struct RabbitMqClient {
    channel: Channel,
}

#[async_trait]
impl Broker for RabbitMqClient {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_headers(to_field_table(&message.headers));

        if let Some(content_type) = &message.content_type {
            properties = properties.with_content_type(content_type.as_str().into());
        }
        if let Some(message_id) = &message.message_id {
            properties = properties.with_message_id(message_id.as_str().into());
        }

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;

        Ok(())
    }
}

fn to_delivery(delivery: AmqpDelivery) -> Delivery {
    let properties = &delivery.properties;
    let message = Message {
        headers: properties
            .headers()
            .as_ref()
            .map(from_field_table)
            .unwrap_or_default(),
        content_type: properties
            .content_type()
            .as_ref()
            .map(|value| value.as_str().to_string()),
        message_id: properties
            .message_id()
            .as_ref()
            .map(|value| value.as_str().to_string()),
        body: delivery.data,
    };

    Delivery::new(delivery.delivery_tag, message)
}

pub fn to_field_table(headers: &Headers) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(key.as_str().into(), to_amqp_value(value));
    }
    table
}

pub fn from_field_table(table: &FieldTable) -> Headers {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), from_amqp_value(value)))
        .collect()
}

fn to_amqp_value(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Bool(v) => AMQPValue::Boolean(*v),
        HeaderValue::I8(v) => AMQPValue::ShortShortInt(*v),
        HeaderValue::U8(v) => AMQPValue::ShortShortUInt(*v),
        HeaderValue::I16(v) => AMQPValue::ShortInt(*v),
        HeaderValue::U16(v) => AMQPValue::ShortUInt(*v),
        HeaderValue::I32(v) => AMQPValue::LongInt(*v),
        HeaderValue::U32(v) => AMQPValue::LongUInt(*v),
        HeaderValue::I64(v) => AMQPValue::LongLongInt(*v),
        HeaderValue::F32(v) => AMQPValue::Float(*v),
        HeaderValue::F64(v) => AMQPValue::Double(*v),
        HeaderValue::Timestamp(v) => AMQPValue::Timestamp(*v),
        HeaderValue::String(v) => AMQPValue::LongString(LongString::from(v.as_str())),
        HeaderValue::Bytes(v) => AMQPValue::ByteArray(v.clone().into()),
        HeaderValue::Array(values) => AMQPValue::FieldArray(FieldArray::from(
            values.iter().map(to_amqp_value).collect::<Vec<_>>(),
        )),
        HeaderValue::Table(table) => AMQPValue::FieldTable(to_field_table(table)),
        HeaderValue::Void => AMQPValue::Void,
    }
}

fn from_amqp_value(value: &AMQPValue) -> HeaderValue {
    match value {
        AMQPValue::Boolean(v) => HeaderValue::Bool(*v),
        AMQPValue::ShortShortInt(v) => HeaderValue::I8(*v),
        AMQPValue::ShortShortUInt(v) => HeaderValue::U8(*v),
        AMQPValue::ShortInt(v) => HeaderValue::I16(*v),
        AMQPValue::ShortUInt(v) => HeaderValue::U16(*v),
        AMQPValue::LongInt(v) => HeaderValue::I32(*v),
        AMQPValue::LongUInt(v) => HeaderValue::U32(*v),
        AMQPValue::LongLongInt(v) => HeaderValue::I64(*v),
        AMQPValue::Float(v) => HeaderValue::F32(*v),
        AMQPValue::Double(v) => HeaderValue::F64(*v),
        AMQPValue::DecimalValue(v) => {
            HeaderValue::F64(f64::from(v.value) / 10f64.powi(i32::from(v.scale)))
        }
        AMQPValue::ShortString(v) => HeaderValue::String(v.as_str().to_string()),
        AMQPValue::LongString(v) => {
            HeaderValue::String(String::from_utf8_lossy(v.as_bytes()).into_owned())
        }
        AMQPValue::FieldArray(values) => {
            HeaderValue::Array(values.as_slice().iter().map(from_amqp_value).collect())
        }
        AMQPValue::Timestamp(v) => HeaderValue::Timestamp(*v),
        AMQPValue::FieldTable(table) => HeaderValue::Table(from_field_table(table)),
        AMQPValue::ByteArray(v) => HeaderValue::Bytes(v.as_slice().to_vec()),
        AMQPValue::Void => HeaderValue::Void,
    }
}
