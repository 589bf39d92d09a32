//! HTTP API server with observability for the trade saga service.
//!
//! Provides REST endpoints for proposing, accepting and reading trades,
//! runs the outbox dispatcher and confirmation consumers in the
//! background, and exposes structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_bus::{InMemoryBus, MessageSource, Publisher, Subscriber, SubscriptionConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    InMemoryInventoryGateway, InventoryGateway, ItemsLockCompletedEvent,
    ItemsLockCompletedHandler, ItemsTradeCompletedEvent, ItemsTradeCompletedHandler,
    OutboxDispatcher, TradeOrchestrator, topics,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trade_store::{InMemoryTradeRepository, TradeRepository};

use config::Config;

/// Repository handle shared by every component.
pub type SharedRepository = Arc<dyn TradeRepository>;

/// Orchestrator as wired by the container.
pub type Orchestrator = TradeOrchestrator<SharedRepository, Arc<dyn InventoryGateway>>;

/// Lock-confirmation subscriber as wired by the container.
pub type LockSubscriber =
    Subscriber<ItemsLockCompletedEvent, ItemsLockCompletedHandler<SharedRepository>>;

/// Exchange-confirmation subscriber as wired by the container.
pub type TradeSubscriber =
    Subscriber<ItemsTradeCompletedEvent, ItemsTradeCompletedHandler<SharedRepository>>;

/// Collaborators built once at start-up and handed to every component.
pub struct Container {
    pub config: Config,
    pub repository: SharedRepository,
    pub gateway: Arc<dyn InventoryGateway>,
    pub publisher: Arc<dyn Publisher>,
    pub source: Arc<dyn MessageSource>,
    pub orchestrator: Orchestrator,
}

impl Container {
    /// Wires the orchestrator over the given adapters.
    pub fn new(
        config: Config,
        repository: SharedRepository,
        gateway: Arc<dyn InventoryGateway>,
        publisher: Arc<dyn Publisher>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        let orchestrator = TradeOrchestrator::new(repository.clone(), gateway.clone())
            .with_call_timeout(config.call_timeout);

        Self {
            config,
            repository,
            gateway,
            publisher,
            source,
            orchestrator,
        }
    }

    /// In-memory repository, gateway and bus.
    pub fn in_memory(config: Config) -> Self {
        let bus = InMemoryBus::new();
        Self::new(
            config,
            Arc::new(InMemoryTradeRepository::new()),
            Arc::new(InMemoryInventoryGateway::new()),
            Arc::new(bus.clone()),
            Arc::new(bus),
        )
    }

    pub fn dispatcher(&self) -> OutboxDispatcher<SharedRepository, Arc<dyn Publisher>> {
        OutboxDispatcher::new(self.repository.clone(), self.publisher.clone())
            .with_topic(self.config.topics.trade_created.clone())
    }

    pub fn lock_subscriber(&self) -> LockSubscriber {
        let topic = &self.config.topics.items_lock_completed;
        Subscriber::new(
            self.subscription(topic),
            self.source.clone(),
            ItemsLockCompletedHandler::new(self.repository.clone()),
        )
    }

    pub fn trade_subscriber(&self) -> TradeSubscriber {
        let topic = &self.config.topics.items_trade_completed;
        Subscriber::new(
            self.subscription(topic),
            self.source.clone(),
            ItemsTradeCompletedHandler::new(self.repository.clone()),
        )
    }

    fn subscription(&self, topic: &str) -> SubscriptionConfig {
        SubscriptionConfig::new(topic, topics::subscription_id(topic))
            .with_max_retries(self.config.consumer_max_retries)
    }

    /// Binds both subscriptions and spawns the dispatcher and consumers.
    ///
    /// Subscriptions are bound before returning, so confirmations published
    /// afterwards are not missed. Every task stops once `shutdown` is
    /// cancelled.
    pub async fn start_workers(
        &self,
        shutdown: CancellationToken,
    ) -> event_bus::Result<Vec<JoinHandle<()>>> {
        let lock_subscriber = self.lock_subscriber();
        let trade_subscriber = self.trade_subscriber();
        lock_subscriber.subscribe().await?;
        trade_subscriber.subscribe().await?;

        let dispatcher = self.dispatcher();
        let interval = self.config.dispatch_interval;
        let dispatch_shutdown = shutdown.clone();
        let dispatch = tokio::spawn(async move {
            dispatcher.run(interval, dispatch_shutdown).await;
        });

        let lock_shutdown = shutdown.clone();
        let locks = tokio::spawn(async move {
            if let Err(e) = lock_subscriber.run(lock_shutdown).await {
                tracing::error!(error = %e, "lock confirmation consumer failed");
            }
        });

        let trades = tokio::spawn(async move {
            if let Err(e) = trade_subscriber.run(shutdown).await {
                tracing::error!(error = %e, "exchange confirmation consumer failed");
            }
        });

        Ok(vec![dispatch, locks, trades])
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(container: Arc<Container>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/trades", post(routes::trades::create))
        .route("/trades", get(routes::trades::list))
        .route("/trades/{id}", get(routes::trades::get))
        .route("/trades/{id}/accept", post(routes::trades::accept))
        .with_state(container)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
