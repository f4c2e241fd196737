use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{broker::BrokerConnection, database::DeadLetterRepository},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

/// Reports on whichever dependencies the running binary holds.
#[derive(Clone, Default)]
pub struct HealthChecker {
    broker: Option<Arc<dyn BrokerConnection>>,
    repository: Option<Arc<dyn DeadLetterRepository>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker(mut self, broker: Arc<dyn BrokerConnection>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn DeadLetterRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        if let Some(broker) = &self.broker {
            checks.insert("message_broker".to_string(), check_broker(broker.as_ref()));
        }

        if let Some(repository) = &self.repository {
            checks.insert(
                "database".to_string(),
                check_database(repository.as_ref()).await,
            );
        }

        let status = if checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }
}

fn check_broker(broker: &dyn BrokerConnection) -> ServiceHealth {
    if broker.is_connected() {
        debug!("RabbitMQ health check passed");
        ServiceHealth::healthy(0)
    } else {
        warn!("RabbitMQ connection is down");
        ServiceHealth::unhealthy("Connection is not open".to_string())
    }
}

async fn check_database(repository: &dyn DeadLetterRepository) -> ServiceHealth {
    let start = Instant::now();

    match repository.health_check().await {
        Ok(_) => {
            let elapsed = start.elapsed().as_millis() as u64;
            debug!(response_time_ms = elapsed, "Database health check passed");
            ServiceHealth::healthy(elapsed)
        }
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
        }
    }
}
