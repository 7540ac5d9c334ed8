use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use order_pipeline::{
    setup_signal_handlers, ConsumerMetrics, ConsumptionDriver, InMemoryOrderStore,
    InMemoryProducerStatsRepository, KafkaConsumer, MetricsSink, PipelineConfig,
    PipelineShutdown, Result, Sequencer, ServiceConfig, ShutdownCoordinator, StatsAggregator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    metrics: Arc<ConsumerMetrics>,
    driver: Arc<ConsumptionDriver>,
}

pub struct OrderConsumerService {
    consumer: KafkaConsumer,
    driver: Arc<ConsumptionDriver>,
    metrics: Arc<ConsumerMetrics>,
    pipeline: PipelineConfig,
}

impl OrderConsumerService {
    pub async fn new(config: ServiceConfig, pipeline: PipelineConfig) -> Result<Self> {
        let consumer = KafkaConsumer::new(config.to_kafka_config())?;
        consumer.subscribe(&[pipeline.topic.as_str()])?;

        let metrics = Arc::new(ConsumerMetrics::new()?);
        let sink: Arc<dyn MetricsSink> = metrics.clone();

        // Persistence lives outside this service; in-memory stores stand in for it
        let orders = Arc::new(InMemoryOrderStore::new());
        let stats = Arc::new(StatsAggregator::new(Arc::new(InMemoryProducerStatsRepository::new())));

        let sequencer = Arc::new(Sequencer::start(&pipeline, orders, sink.clone()));
        let driver = Arc::new(ConsumptionDriver::new(&pipeline, sequencer, stats, sink));

        Ok(Self {
            consumer,
            driver,
            metrics,
            pipeline,
        })
    }

    pub async fn run(&self, metrics_port: u16) -> Result<()> {
        // Leave the coordinator room to report after the pipeline's own grace period
        let coordinator = ShutdownCoordinator::new(self.pipeline.shutdown_grace() + Duration::from_secs(5));
        coordinator
            .register_component(Arc::new(PipelineShutdown::new(self.driver.clone())))
            .await;
        setup_signal_handlers(coordinator.clone());

        let sweeper = self
            .driver
            .stats()
            .clone()
            .spawn_sweeper(self.pipeline.stats_sweep_interval(), coordinator.subscribe());

        let server = self.spawn_metrics_server(metrics_port, coordinator.clone()).await?;

        info!("Order Service is running on topic '{}'", self.pipeline.topic);
        let result = self.driver.run(&self.consumer, coordinator.subscribe()).await;

        info!("Order Service shutting down...");
        if let Err(e) = coordinator.shutdown().await {
            error!("Graceful shutdown incomplete: {}", e);
        }

        if let Err(e) = sweeper.await {
            error!("Stats sweeper task failed: {}", e);
        }
        if let Err(e) = server.await {
            error!("Metrics server task failed: {}", e);
        }

        result
    }

    async fn spawn_metrics_server(
        &self,
        port: u16,
        coordinator: ShutdownCoordinator,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let state = AppState {
            metrics: self.metrics.clone(),
            driver: self.driver.clone(),
        };

        let app = Router::new()
            .route("/metrics", get(metrics_endpoint))
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Metrics listening on {}", addr);

        let mut shutdown = coordinator.subscribe();
        Ok(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            });
            if let Err(e) = serve.await {
                error!("Metrics server error: {}", e);
            }
        }))
    }
}

/// Metrics endpoint for Prometheus scraping
async fn metrics_endpoint(State(state): State<AppState>) -> std::result::Result<String, StatusCode> {
    state.metrics.export().map_err(|e| {
        error!("Failed to export metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sequencer = state.driver.sequencer();
    Json(serde_json::json!({
        "status": if sequencer.is_accepting() { "healthy" } else { "draining" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "order-service",
        "active_orders": sequencer.active_keys(),
        "stats_locks": state.driver.stats().lock_count(),
    }))
}
