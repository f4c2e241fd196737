use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::{Deserialize, de::DeserializeOwned};

use crate::models::retry::{
    DEFAULT_RETRY_DELAYS_MS, DEFAULT_RETRY_EXCHANGE, QueueTopology, RetryTopology,
};

fn from_env<T: DeserializeOwned>(section: &str) -> Result<T, Error> {
    dotenv().ok();

    envy::from_env::<T>()
        .map_err(|e| anyhow!("Invalid or missing {} environment variable: {}", section, e))
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,

    #[serde(default = "default_main_queue_name")]
    pub main_queue_name: String,
    #[serde(default = "default_dead_letter_queue_name")]
    pub dead_letter_queue_name: String,
    #[serde(default = "default_retry_exchange_name")]
    pub retry_exchange_name: String,
    /// Comma separated, one delay queue per entry, in attempt order.
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,

    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_dead_letter_worker_concurrency")]
    pub dead_letter_worker_concurrency: usize,

    #[serde(default = "default_publish_timeout_seconds")]
    pub publish_timeout_seconds: u64,

    #[serde(default = "default_producer_port")]
    pub producer_port: u16,
    #[serde(default = "default_operator_port")]
    pub operator_port: u16,
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,
    #[serde(default = "default_inspect_limit")]
    pub inspect_limit: i64,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Clone, Deserialize, Debug)]
pub struct DatabaseConfig {
    pub database_url: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct SmtpConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_starttls")]
    pub smtp_starttls: bool,
    pub from_email: String,
    /// Unset means a send may block its worker indefinitely.
    pub send_timeout_seconds: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        let config = from_env::<Self>("broker")?;

        validate_retry_delays(&config.retry_delays_ms)?;
        if config.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be at least 1"));
        }

        Ok(config)
    }

    pub fn topology(&self) -> QueueTopology {
        QueueTopology {
            main_queue: self.main_queue_name.clone(),
            dead_letter_queue: self.dead_letter_queue_name.clone(),
            retry: RetryTopology::new(&self.retry_exchange_name, &self.retry_delays_ms),
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }
}

/// Each delay becomes its own queue, so the list must be non-empty with
/// distinct, non-zero entries.
pub fn validate_retry_delays(delays_ms: &[u64]) -> Result<(), Error> {
    if delays_ms.is_empty() {
        return Err(anyhow!("RETRY_DELAYS_MS must list at least one delay"));
    }

    for (i, delay) in delays_ms.iter().enumerate() {
        if *delay == 0 {
            return Err(anyhow!("RETRY_DELAYS_MS entries must be greater than zero"));
        }
        if delays_ms[..i].contains(delay) {
            return Err(anyhow!(
                "RETRY_DELAYS_MS lists {}ms more than once, each delay needs its own queue",
                delay
            ));
        }
    }

    Ok(())
}

impl DatabaseConfig {
    pub fn load() -> Result<Self, Error> {
        from_env("database")
    }
}

impl SmtpConfig {
    pub fn load() -> Result<Self, Error> {
        from_env("SMTP")
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_seconds.map(Duration::from_secs)
    }
}

fn default_main_queue_name() -> String {
    "notification".to_string()
}

fn default_dead_letter_queue_name() -> String {
    "dlq".to_string()
}

fn default_retry_exchange_name() -> String {
    DEFAULT_RETRY_EXCHANGE.to_string()
}

fn default_retry_delays_ms() -> Vec<u64> {
    DEFAULT_RETRY_DELAYS_MS.to_vec()
}

fn default_prefetch_count() -> u16 {
    1
}

fn default_worker_concurrency() -> usize {
    5
}

fn default_dead_letter_worker_concurrency() -> usize {
    1
}

fn default_publish_timeout_seconds() -> u64 {
    5
}

fn default_producer_port() -> u16 {
    8090
}

fn default_operator_port() -> u16 {
    8091
}

fn default_worker_port() -> u16 {
    8092
}

fn default_inspect_limit() -> i64 {
    10
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_starttls() -> bool {
    true
}
