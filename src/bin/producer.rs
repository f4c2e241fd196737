use std::sync::Arc;

use anyhow::{Error, Result};
use notify_service::{
    api::{ProducerState, producer_router, serve},
    clients::{
        broker::{BrokerConnection, ExclusivePublisher},
        health::HealthChecker,
        rbmq::RabbitMqConnection,
    },
    config::Config,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(config.log_format);

    let connection = Arc::new(RabbitMqConnection::connect(&config.rabbitmq_url).await?);
    connection.declare_topology(&config.topology()).await?;

    let state = Arc::new(ProducerState {
        publisher: ExclusivePublisher::new(connection.publisher().await?),
        main_queue: config.main_queue_name.clone(),
        publish_timeout: config.publish_timeout(),
        health_checker: HealthChecker::new().with_broker(connection),
    });

    serve(producer_router(state), config.producer_port, "producer").await
}
