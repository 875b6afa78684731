//! Orderflow server
//!
//! Webhook ingestion and at-least-once order fan-out in a single process:
//! the signed `POST /webhook` ingress records each event once, fans it out
//! to per-topic queues, and worker pools drain the queues into the order
//! store and the mail/warehouse collaborators.

mod config;
mod error;
mod health;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use orderflow_events::{EventStore, InMemoryEventStore, Topic};
use orderflow_ingest::{ingest_router, IngestState};
use orderflow_pipeline::{
    EmailDispatcher, FanoutBus, InMemoryOrderStore, InventoryReserver, LoggingMailSender,
    LoggingWarehouse, OrderProcessor, WorkerPool,
};
use orderflow_queue::TopicQueue;
use orderflow_secrets::{names, EnvSecretProvider, SecretError, SecretProvider};

use config::Config;
use error::{ServerError, ServerResult};
use health::{health_routes, HealthState};

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        stage = %config.secrets.stage,
        "Starting orderflow server"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn run(config: Config) -> ServerResult<()> {
    let secrets = EnvSecretProvider::new(&config.secrets.stage);

    let signing_secret = secrets
        .get_secret(names::WEBHOOK_SIGNING_SECRET)
        .await?
        .as_str()?
        .to_string();

    let mail_from = match secrets.get_secret(names::MAIL_FROM_ADDRESS).await {
        Ok(value) => value.as_str()?.to_string(),
        Err(SecretError::NotFound { .. }) => {
            warn!(
                target: "secrets",
                "No mail from-address configured, using placeholder sender"
            );
            "orders@localhost".to_string()
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(SecretError::NotFound { .. }) =
        secrets.get_secret(names::WAREHOUSE_API_CREDENTIAL).await
    {
        warn!(
            target: "secrets",
            "No warehouse credential configured, reservations run in log-only mode"
        );
    }

    let order_queue = Arc::new(TopicQueue::new(
        Topic::Order.as_str(),
        config.queues.order.queue_config(),
    ));
    let email_queue = Arc::new(TopicQueue::new(
        Topic::Email.as_str(),
        config.queues.email.queue_config(),
    ));
    let inventory_queue = Arc::new(TopicQueue::new(
        Topic::Inventory.as_str(),
        config.queues.inventory.queue_config(),
    ));

    let bus = Arc::new(FanoutBus::new([
        (Topic::Order, order_queue.clone()),
        (Topic::Email, email_queue.clone()),
        (Topic::Inventory, inventory_queue.clone()),
    ]));

    let event_store: Arc<InMemoryEventStore> = Arc::new(InMemoryEventStore::new());
    let order_store = Arc::new(InMemoryOrderStore::new());

    let cancel = CancellationToken::new();

    let pools = vec![
        WorkerPool::spawn(
            order_queue.clone(),
            Arc::new(OrderProcessor::new(order_store)),
            config.queues.order.concurrency,
            cancel.clone(),
            config.queues.order.poll_timeout(),
        ),
        WorkerPool::spawn(
            email_queue.clone(),
            Arc::new(EmailDispatcher::new(Arc::new(LoggingMailSender::new(
                mail_from,
            )))),
            config.queues.email.concurrency,
            cancel.clone(),
            config.queues.email.poll_timeout(),
        ),
        WorkerPool::spawn(
            inventory_queue.clone(),
            Arc::new(InventoryReserver::new(Arc::new(LoggingWarehouse))),
            config.queues.inventory.concurrency,
            cancel.clone(),
            config.queues.inventory.poll_timeout(),
        ),
    ];

    let sweeper = spawn_eviction_sweep(event_store.clone(), &config, cancel.clone());

    let ingest_state = IngestState::new(&signing_secret, event_store, bus)
        .with_tolerance(config.signature_tolerance());

    let health_state = Arc::new(HealthState {
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queues: vec![
            order_queue.clone(),
            email_queue.clone(),
            inventory_queue.clone(),
        ],
    });

    let app = ingest_router(ingest_state).merge(health_routes(health_state));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ServerError::Config(format!("Invalid listen address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!(addr = %addr, "Listening for webhooks");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The listener is down; stop accepting queue work, let in-flight
    // messages finish, then wait for the pools.
    info!("Draining worker pools");
    cancel.cancel();
    order_queue.close().await;
    email_queue.close().await;
    inventory_queue.close().await;

    for pool in pools {
        pool.join().await;
    }
    let _ = sweeper.await;

    Ok(())
}

/// Periodically evict dedupe entries older than the configured window.
fn spawn_eviction_sweep(
    store: Arc<InMemoryEventStore>,
    config: &Config,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval = config.sweep_interval();
    let window = config.dedupe_window();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cutoff = Utc::now()
                - chrono::Duration::from_std(window)
                    .unwrap_or_else(|_| chrono::Duration::hours(24));
            match store.evict_older_than(cutoff).await {
                Ok(evicted) if evicted > 0 => {
                    info!(
                        target: "event_store",
                        evicted,
                        "Evicted expired dedupe entries"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!(target: "event_store", error = %e, "Dedupe eviction failed");
                }
            }
        }
    })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
