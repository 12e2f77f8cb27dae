use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use morphd::api::{AppState, router};
use morphd::config::{Config, DeadLetterSinkKind, StorageProvider};
use morphd::deadletter::{DeadLetterSink, FjallDeadLetterStore, LoggingDeadLetterSink};
use morphd::messaging::{InMemoryBroker, MessageConsumer};
use morphd::observability::Metrics;
use morphd::storage::{HttpClient, StorageClient};
use morphd::transform::{TransformerComponent, TransformerRegistry};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run a worker node until Ctrl+C / SIGTERM
///
/// Startup order:
/// 1. Content access (storage, HTTP fetcher) and the transformer registry
/// 2. Broker and dead-letter sink
/// 3. Transformer component subscribed to the request destination
/// 4. Operator HTTP surface
///
/// On shutdown the HTTP server stops first, then the consumer finishes its
/// in-flight jobs.
pub async fn run(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    let storage = Arc::new(match config.storage.provider {
        StorageProvider::Memory => StorageClient::in_memory(),
        StorageProvider::Local => StorageClient::local(&config.storage.root)?,
    });
    let http = Arc::new(HttpClient::new(config.fetch.to_http_config())?);

    let registry = TransformerRegistry::with_builtins(storage, http);
    let transformer = registry.get(&config.worker.transformer).inspect_err(|_| {
        error!(
            transformer = %config.worker.transformer,
            available = ?registry.names(),
            "Configured transformer is not registered"
        );
    })?;

    let broker = Arc::new(InMemoryBroker::new(
        config.transport.channel_capacity,
        config.transport.max_message_bytes.as_u64(),
    ));

    let dead_letter_store = match config.dead_letter.sink {
        DeadLetterSinkKind::Fjall => {
            let store = Arc::new(FjallDeadLetterStore::open(&config.dead_letter.path)?);
            info!(path = %config.dead_letter.path.display(), "Dead letters persisted");
            Some(store)
        }
        DeadLetterSinkKind::Log => None,
    };
    let dead_letters: Arc<dyn DeadLetterSink> = match &dead_letter_store {
        Some(store) => store.clone(),
        None => Arc::new(LoggingDeadLetterSink::new()),
    };

    let component = Arc::new(TransformerComponent::new(
        transformer,
        broker.clone(),
        dead_letters.clone(),
        metrics.clone(),
    ));

    let deliveries = broker.subscribe(&config.transport.request_destination)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = MessageConsumer::new(
        component.clone(),
        dead_letters,
        metrics.clone(),
        config.worker.max_inflight_jobs,
    );
    let consumer_handle = tokio::spawn(consumer.run(deliveries, shutdown_rx));

    info!(
        node = %config.node.name,
        transformer = component.transformer_name(),
        destination = %config.transport.request_destination,
        max_inflight = config.worker.max_inflight_jobs,
        "Transformer component subscribed"
    );

    let state = AppState::new(
        config.node.name.as_str(),
        broker,
        metrics,
        dead_letter_store.clone(),
    );
    let app = router(state);

    let listener = TcpListener::bind(config.node.http_addr).await?;
    info!(address = %config.node.http_addr, "morphd node listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer_handle.await {
        error!(error = %e, "Consumer task failed");
    }

    if let Some(store) = dead_letter_store {
        store.flush()?;
    }

    info!("morphd node stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
