//! API server entry point.

use std::sync::Arc;

use api::Container;
use api::config::{Config, LogFormat};
use event_bus::InMemoryBus;
use saga::InMemoryInventoryGateway;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use trade_store::{InMemoryTradeRepository, PostgresTradeRepository, TradeRepository};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn describe_metrics() {
    metrics::describe_counter!("trades_created_total", "Trades persisted with items locked");
    metrics::describe_counter!(
        "trades_failed_total",
        "Trades rejected or moved to Error, by stage"
    );
    metrics::describe_counter!("trades_accepted_total", "Trades accepted by the counter-party");
    metrics::describe_counter!("trades_dispatched_total", "Trade announcements published");
    metrics::describe_counter!("dispatch_failures_total", "Trade announcements that failed");
    metrics::describe_counter!("lock_confirmations_total", "Trades moved to Pending");
    metrics::describe_counter!("trades_completed_total", "Trades whose items were exchanged");
    metrics::describe_counter!(
        "bus_messages_dead_lettered_total",
        "Deliveries given up on, by subscription"
    );
    metrics::describe_histogram!(
        "orchestrator_duration_seconds",
        metrics::Unit::Seconds,
        "Latency of orchestrator operations"
    );
}

async fn build_repository(config: &Config) -> Arc<dyn TradeRepository> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let repository = PostgresTradeRepository::new(pool);
            repository
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL trade repository");
            Arc::new(repository)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, trades are kept in memory");
            Arc::new(InMemoryTradeRepository::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    describe_metrics();

    // 3. Wire the adapters
    let repository = build_repository(&config).await;
    let bus = InMemoryBus::new();
    let addr = config.addr();
    let container = Arc::new(Container::new(
        config,
        repository,
        Arc::new(InMemoryInventoryGateway::new()),
        Arc::new(bus.clone()),
        Arc::new(bus),
    ));

    // 4. Start the dispatcher and confirmation consumers
    let shutdown = CancellationToken::new();
    let workers = container
        .start_workers(shutdown.clone())
        .await
        .expect("failed to start background workers");

    // 5. Build the application
    let app = api::create_app(container, metrics_handle);

    // 6. Start server
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop background workers
    shutdown.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "background worker panicked");
        }
    }

    tracing::info!("server shut down gracefully");
}
