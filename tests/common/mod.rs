#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use notify_service::{
    clients::{
        broker::{Broker, BrokerConnection, DeliveryStream},
        database::DeadLetterRepository,
        email::EmailSender,
    },
    error::{BrokerError, SendError, StoreError},
    models::{
        dead_letter::{DeadLetterRow, NewDeadLetter},
        headers::Headers,
        message::{Delivery, Message, NotificationRequest},
    },
};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Publish {
        exchange: String,
        routing_key: String,
        message: Message,
    },
    Ack(u64),
    Reject {
        delivery_tag: u64,
        requeue: bool,
    },
}

/// Broker double that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingBroker {
    calls: Mutex<Vec<BrokerCall>>,
    fail_publish: AtomicBool,
    fail_ack: AtomicBool,
    fail_reject: AtomicBool,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_publish() -> Arc<Self> {
        let broker = Self::default();
        broker.fail_publish.store(true, Ordering::SeqCst);
        Arc::new(broker)
    }

    pub fn failing_ack() -> Arc<Self> {
        let broker = Self::default();
        broker.fail_ack.store(true, Ordering::SeqCst);
        Arc::new(broker)
    }

    pub fn set_fail_reject(&self, fail: bool) {
        self.fail_reject.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, String, Message)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Publish {
                    exchange,
                    routing_key,
                    message,
                } => Some((exchange, routing_key, message)),
                _ => None,
            })
            .collect()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Ack(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn rejects(&self) -> Vec<(u64, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::Reject {
                    delivery_tag,
                    requeue,
                } => Some((delivery_tag, requeue)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BrokerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Message,
    ) -> Result<(), BrokerError> {
        self.record(BrokerCall::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message: message.clone(),
        });

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("publish", "channel closed"));
        }
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.record(BrokerCall::Ack(delivery_tag));

        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("ack", "channel closed"));
        }
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.record(BrokerCall::Reject {
            delivery_tag,
            requeue,
        });

        if self.fail_reject.load(Ordering::SeqCst) {
            return Err(BrokerError::operation("reject", "channel closed"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SendBehaviour {
    Succeed,
    Transient,
    InvalidRecipient,
    Hang,
}

/// Email sender double returning a fixed result and recording its calls.
pub struct ScriptedSender {
    behaviour: SendBehaviour,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedSender {
    pub fn new(behaviour: SendBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for ScriptedSender {
    async fn send(&self, recipient: &str, body: &str, subject: &str) -> Result<(), SendError> {
        self.calls.lock().unwrap().push((
            recipient.to_string(),
            body.to_string(),
            subject.to_string(),
        ));

        match self.behaviour {
            SendBehaviour::Succeed => Ok(()),
            SendBehaviour::Transient => Err(SendError::Transient("provider unavailable".into())),
            SendBehaviour::InvalidRecipient => Err(SendError::InvalidRecipient {
                email: recipient.to_string(),
                reason: "missing domain".to_string(),
            }),
            SendBehaviour::Hang => std::future::pending().await,
        }
    }
}

/// Dead-letter repository kept in memory, with switchable failures.
#[derive(Default)]
pub struct InMemoryRepository {
    rows: Mutex<Vec<DeadLetterRow>>,
    pub fail_insert: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, message_id: &str, headers: JsonValue, body: &[u8]) {
        self.seed_at(message_id, headers, body, Utc::now());
    }

    pub fn seed_at(
        &self,
        message_id: &str,
        headers: JsonValue,
        body: &[u8],
        received_at: DateTime<Utc>,
    ) {
        self.rows.lock().unwrap().push(DeadLetterRow {
            message_id: message_id.to_string(),
            headers,
            body: body.to_vec(),
            content_type: Some("application/json".to_string()),
            received_at,
        });
    }

    pub fn rows(&self) -> Vec<DeadLetterRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, message_id: &str) -> Option<DeadLetterRow> {
        self.rows()
            .into_iter()
            .find(|row| row.message_id == message_id)
    }

    fn unavailable(operation: &str) -> StoreError {
        StoreError::Unavailable(format!("{} failed", operation))
    }
}

#[async_trait]
impl DeadLetterRepository for InMemoryRepository {
    async fn insert(&self, record: &NewDeadLetter) -> Result<(), StoreError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Self::unavailable("insert"));
        }

        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|row| row.message_id == record.message_id) {
            return Ok(());
        }
        rows.push(DeadLetterRow {
            message_id: record.message_id.clone(),
            headers: record.headers.clone(),
            body: record.body.clone(),
            content_type: record.content_type.clone(),
            received_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<DeadLetterRow>, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .unwrap()
            .clone()
            .into_iter()
            .enumerate()
            .collect::<Vec<_>>();

        rows.sort_by(|(a_index, a), (b_index, b)| {
            b.received_at
                .cmp(&a.received_at)
                .then(b_index.cmp(a_index))
        });

        Ok(rows
            .into_iter()
            .map(|(_, row)| row)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn fetch(&self, message_id: &str) -> Result<Option<DeadLetterRow>, StoreError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::unavailable("fetch"));
        }
        Ok(self.get(message_id))
    }

    async fn delete(&self, message_id: &str) -> Result<u64, StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::unavailable("delete"));
        }

        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|row| row.message_id != message_id);
        Ok((before - rows.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Broker connection that hands out recording channels fed from
/// pre-loaded deliveries, one batch per queue.
#[derive(Default)]
pub struct FakeConnection {
    queued: Mutex<HashMap<String, Vec<Vec<Delivery>>>>,
    pub consumers: Mutex<Vec<(String, String, u16, Arc<RecordingBroker>)>>,
    pub publishers: Mutex<Vec<Arc<RecordingBroker>>>,
    pub disconnected: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next consumer opened on `queue` receives `deliveries`, then its
    /// stream closes.
    pub fn enqueue(&self, queue: &str, deliveries: Vec<Delivery>) {
        self.queued
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push(deliveries);
    }

    pub fn consumers(&self) -> Vec<(String, String, u16, Arc<RecordingBroker>)> {
        self.consumers.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<(Arc<dyn Broker>, DeliveryStream), BrokerError> {
        let deliveries = self
            .queued
            .lock()
            .unwrap()
            .get_mut(queue)
            .and_then(|batches| (!batches.is_empty()).then(|| batches.remove(0)))
            .unwrap_or_default();

        let broker = RecordingBroker::new();
        self.consumers.lock().unwrap().push((
            queue.to_string(),
            consumer_tag.to_string(),
            prefetch,
            Arc::clone(&broker),
        ));

        let channel: Arc<dyn Broker> = broker;
        let stream: DeliveryStream = stream::iter(deliveries.into_iter().map(Ok)).boxed();
        Ok((channel, stream))
    }

    async fn publisher(&self) -> Result<Arc<dyn Broker>, BrokerError> {
        let broker = RecordingBroker::new();
        self.publishers.lock().unwrap().push(Arc::clone(&broker));
        let channel: Arc<dyn Broker> = broker;
        Ok(channel)
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

pub fn notification(email: &str) -> NotificationRequest {
    NotificationRequest {
        email: email.to_string(),
        message: "hello".to_string(),
        subject: "hello world".to_string(),
    }
}

pub fn delivery_with(delivery_tag: u64, body: &[u8], headers: Headers) -> Delivery {
    Delivery::new(
        delivery_tag,
        Message::json(body.to_vec())
            .with_headers(headers)
            .with_message_id(format!("msg-{}", delivery_tag)),
    )
}

pub fn notification_delivery(delivery_tag: u64, email: &str, headers: Headers) -> Delivery {
    let body = serde_json::to_vec(&notification(email)).unwrap();
    delivery_with(delivery_tag, &body, headers)
}
