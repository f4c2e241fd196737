use std::sync::Arc;

use anyhow::{Error, Result};
use notify_service::{
    api::{OperatorState, operator_router, serve},
    clients::{
        broker::BrokerConnection, database::PostgresDeadLetterRepository, health::HealthChecker,
        rbmq::RabbitMqConnection,
    },
    config::{Config, DatabaseConfig},
    dead_letter::DeadLetterStore,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(config.log_format);

    let database = DatabaseConfig::load()?;

    let connection = Arc::new(RabbitMqConnection::connect(&config.rabbitmq_url).await?);
    let repository = Arc::new(PostgresDeadLetterRepository::connect(&database.database_url).await?);
    repository.migrate().await?;

    let store = Arc::new(DeadLetterStore::new(
        repository.clone(),
        connection.publisher().await?,
        &config.main_queue_name,
    ));

    let state = Arc::new(OperatorState {
        store,
        inspect_limit: config.inspect_limit,
        health_checker: HealthChecker::new()
            .with_broker(connection)
            .with_repository(repository),
    });

    serve(operator_router(state), config.operator_port, "dlq_store").await
}
