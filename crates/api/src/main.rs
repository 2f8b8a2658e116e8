//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config, SharedStore};
use notifications::{LogMailer, NotificationWorker, RestockDispatcher, RestockQueue};
use payments::{
    CheckoutSettings, HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway,
    SignatureVerifier,
};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn open_store(config: &Config) -> Result<SharedStore, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using Postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn payment_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match config.gateway() {
        Some(gateway) => {
            tracing::info!(base_url = %gateway.base_url, "using HTTP payment gateway");
            Arc::new(HttpPaymentGateway::new(gateway))
        }
        None => {
            tracing::warn!("payment gateway not configured, using in-memory gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Open the store and start the restock worker
    let store = open_store(&config).await?;
    let (queue, receiver) = RestockQueue::bounded(config.restock_queue_capacity);
    let dispatcher = RestockDispatcher::new(
        store.clone(),
        Arc::new(LogMailer),
        &config.public_base_url,
    );
    let worker = NotificationWorker::new(dispatcher, receiver).spawn();

    // 4. Build the application
    let state = Arc::new(AppState::new(
        store,
        Arc::new(queue),
        payment_gateway(&config),
        SignatureVerifier::new(config.webhook_secret(), config.webhook_tolerance())?,
        CheckoutSettings {
            currency: config.currency(),
            public_base_url: config.public_base_url.clone(),
        },
    ));
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last queue handle; let the worker drain what is left.
    if let Err(err) = worker.await {
        tracing::error!(error = %err, "restock worker panicked");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
