use crate::{ConsumptionDriver, OrderPipelineError, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<Arc<dyn ShutdownComponent + Send + Sync>>>>,
    shutdown_timeout: Duration,
}

/// Trait for components that need graceful shutdown
#[async_trait::async_trait]
pub trait ShutdownComponent {
    async fn shutdown(&self) -> Result<()>;
    fn name(&self) -> &str;
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ShutdownCoordinator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            shutdown_timeout,
        }
    }

    /// Register a component for graceful shutdown
    pub async fn register_component(&self, component: Arc<dyn ShutdownComponent + Send + Sync>) {
        let mut components = self.components.lock().await;
        info!("Registering component '{}' for graceful shutdown", component.name());
        components.push(component);
    }

    /// Get a shutdown signal receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Tell every subscriber to stop
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Shutdown signal sent with no subscribers");
        }
    }

    /// Signal subscribers, then shut down registered components within the timeout
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.trigger();

        let components = self.components.lock().await.clone();
        let mut tasks = JoinSet::new();

        for component in components {
            tasks.spawn(async move {
                let component_name = component.name().to_string();
                info!("Shutting down component '{}'", component_name);
                let result = component.shutdown().await;
                match &result {
                    Ok(()) => info!("Component '{}' shutdown successfully", component_name),
                    Err(e) => error!("Component '{}' shutdown failed: {}", component_name, e),
                }
                (component_name, result)
            });
        }

        let collect_failures = async {
            let mut failed = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((component_name, Err(_))) => failed.push(component_name),
                    Err(e) => {
                        error!("Shutdown task failed: {}", e);
                        failed.push("<panicked>".to_string());
                    }
                }
            }
            failed
        };

        match tokio::time::timeout(self.shutdown_timeout, collect_failures).await {
            Ok(failed) if failed.is_empty() => {
                info!("All components shutdown successfully");
                Ok(())
            }
            Ok(failed) => Err(OrderPipelineError::Shutdown(format!(
                "components failed to stop: {}",
                failed.join(", ")
            ))),
            Err(_) => {
                error!("Shutdown timeout exceeded after {:?}, forcing exit", self.shutdown_timeout);
                Err(OrderPipelineError::Shutdown("timeout exceeded".to_string()))
            }
        }
    }
}

/// Drains the order pipeline on shutdown
pub struct PipelineShutdown {
    driver: Arc<ConsumptionDriver>,
}

impl PipelineShutdown {
    pub fn new(driver: Arc<ConsumptionDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait::async_trait]
impl ShutdownComponent for PipelineShutdown {
    async fn shutdown(&self) -> Result<()> {
        let report = self.driver.shutdown().await;
        if report.drained {
            Ok(())
        } else {
            Err(OrderPipelineError::Shutdown(format!(
                "{} order queue(s) abandoned",
                report.abandoned.len()
            )))
        }
    }

    fn name(&self) -> &str {
        "order-pipeline"
    }
}

/// Trigger the coordinator on SIGINT or SIGTERM
pub fn setup_signal_handlers(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to setup SIGTERM handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        coordinator.trigger();
    });
}
