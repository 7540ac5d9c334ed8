use crate::{
    retry_with_backoff, EventType, MetricsSink, OrderEvent, OrderPipelineError, OrderService,
    Result, RetryPolicy,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How a single event left the applier
#[derive(Debug)]
pub enum ApplyOutcome {
    Applied,
    /// Event type we do not handle; logged and skipped.
    Skipped,
    /// Retries exhausted or a non-retryable failure; the event is gone.
    Dropped(OrderPipelineError),
}

/// Routes an event to the matching order operation, retrying on conflicts
pub struct EventApplier {
    service: Arc<dyn OrderService>,
    policy: RetryPolicy,
    metrics: Arc<dyn MetricsSink>,
}

impl EventApplier {
    pub fn new(service: Arc<dyn OrderService>, policy: RetryPolicy, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            service,
            policy,
            metrics,
        }
    }

    pub async fn apply(&self, event: &OrderEvent) -> ApplyOutcome {
        let operation_name = format!("{} order {}", event.event_type, event.order_id());
        let mut attempts = 0u32;

        // A panicking order service must not take the worker or the key down with it
        let result = AssertUnwindSafe(retry_with_backoff(&self.policy, &operation_name, || {
            if attempts > 0 {
                self.metrics.record_retry();
            }
            attempts += 1;
            self.dispatch(event)
        }))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(OrderPipelineError::ApplyPanicked(panic_message(panic.as_ref()))));

        match result {
            Ok(()) => {
                self.metrics.record_applied();
                debug!("Processed order event: {}", event.event_id);
                ApplyOutcome::Applied
            }
            Err(OrderPipelineError::UnknownEventType(event_type)) => {
                warn!(
                    "Unknown event type: {} (event {}, order {})",
                    event_type, event.event_id, event.order_id()
                );
                ApplyOutcome::Skipped
            }
            Err(e) => {
                self.metrics.record_dropped();
                error!(
                    "Dropping order event after {} attempt(s): event_id={}, order_id={}, event_type={}, error={}",
                    attempts, event.event_id, event.order_id(), event.event_type, e
                );
                ApplyOutcome::Dropped(e)
            }
        }
    }

    async fn dispatch(&self, event: &OrderEvent) -> Result<()> {
        let order_id = event.order_id();
        match &event.event_type {
            EventType::Created => self.service.apply_create(order_id, &event.order).await,
            EventType::Updated => self.service.apply_update(order_id, &event.order).await,
            EventType::Cancelled => self.service.apply_cancel(order_id, &event.order).await,
            EventType::Unknown(name) => Err(OrderPipelineError::UnknownEventType(name.clone())),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
