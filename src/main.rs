use std::sync::Arc;

use anyhow::{Error, Result};
use notify_service::{
    api::{health_router, serve},
    clients::{
        broker::BrokerConnection, database::PostgresDeadLetterRepository, email::SmtpEmailSender,
        health::HealthChecker, rbmq::RabbitMqConnection,
    },
    config::{Config, DatabaseConfig, SmtpConfig},
    dead_letter::DeadLetterStore,
    processor::DeliveryProcessor,
    retry::RetryRouter,
    telemetry::init_tracing,
    worker::{WorkerPool, WorkerPoolConfig},
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(config.log_format);

    let database = DatabaseConfig::load()?;
    let smtp = SmtpConfig::load()?;
    let topology = config.topology();

    let connection = Arc::new(RabbitMqConnection::connect(&config.rabbitmq_url).await?);
    connection.declare_topology(&topology).await?;

    let repository = Arc::new(PostgresDeadLetterRepository::connect(&database.database_url).await?);
    repository.migrate().await?;

    let sender = Arc::new(SmtpEmailSender::new(&smtp)?);
    let processor = Arc::new(
        DeliveryProcessor::new(sender, RetryRouter::new(topology.retry.clone()))
            .with_send_timeout(smtp.send_timeout()),
    );
    let store = Arc::new(DeadLetterStore::new(
        repository.clone(),
        connection.publisher().await?,
        &topology.main_queue,
    ));

    let pool = WorkerPool::new(
        connection.clone(),
        processor,
        store,
        WorkerPoolConfig {
            main_queue: topology.main_queue.clone(),
            dead_letter_queue: topology.dead_letter_queue.clone(),
            workers: config.worker_concurrency,
            dead_letter_workers: config.dead_letter_worker_concurrency,
            prefetch: config.prefetch_count,
        },
    );

    let health_checker = HealthChecker::new()
        .with_broker(connection)
        .with_repository(repository);

    tokio::select! {
        result = pool.run() => {
            let handled = result?;
            info!(handled, "All workers stopped");
        }
        result = serve(health_router(health_checker), config.worker_port, "worker_health") => {
            if let Err(e) = result {
                error!(error = %e, "Health server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
