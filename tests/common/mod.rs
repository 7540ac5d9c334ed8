#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use order_pipeline::{
    EventType, MetricsSink, MetricsTimer, OrderEvent, OrderFields, OrderPipelineError,
    OrderService, PipelineConfig, Result,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub fn fields(order_id: i64, product_name: &str, price: i64) -> OrderFields {
    OrderFields {
        order_id,
        product_name: product_name.to_string(),
        category_name: "Electronics".to_string(),
        price: Decimal::from(price),
        quantity: 1,
        status: None,
        customer_id: Some(42),
    }
}

pub fn event(order_id: i64, event_type: EventType, product_name: &str) -> OrderEvent {
    OrderEvent::new(
        uuid::Uuid::new_v4().to_string(),
        event_type,
        fields(order_id, product_name, 100),
    )
}

pub fn fast_config(worker_count: usize) -> PipelineConfig {
    PipelineConfig {
        worker_count,
        base_delay_ms: 1,
        max_delay_ms: 10,
        shutdown_grace_secs: 5,
        poll_timeout_ms: 20,
        ..PipelineConfig::default()
    }
}

/// One apply call as seen by [`RecordingOrderService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub order_id: i64,
    pub product_name: String,
}

/// Collaborator that records every call and flags overlapping applies per order
#[derive(Default)]
pub struct RecordingOrderService {
    calls: Mutex<Vec<Call>>,
    in_flight: Mutex<HashSet<i64>>,
    overlap_detected: AtomicBool,
    apply_delay: Option<Duration>,
    /// Orders whose applies wait for a permit before completing.
    gated: DashMap<i64, Arc<Semaphore>>,
    pub entered: Notify,
    /// Remaining conflicts to report per product name before succeeding.
    conflicts: DashMap<String, u32>,
    /// Product names that always fail with a business error.
    poisoned: DashMap<String, ()>,
    /// Product names whose apply panics.
    panicking: DashMap<String, ()>,
    pub attempts: AtomicU32,
}

impl RecordingOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_delay(delay: Duration) -> Self {
        Self {
            apply_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn gate(&self, order_id: i64) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gated.insert(order_id, gate.clone());
        gate
    }

    pub fn conflict_times(&self, product_name: &str, times: u32) {
        self.conflicts.insert(product_name.to_string(), times);
    }

    pub fn poison(&self, product_name: &str) {
        self.poisoned.insert(product_name.to_string(), ());
    }

    pub fn panic_on(&self, product_name: &str) {
        self.panicking.insert(product_name.to_string(), ());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, order_id: i64) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.order_id == order_id)
            .collect()
    }

    pub fn overlap_detected(&self) -> bool {
        self.overlap_detected.load(Ordering::SeqCst)
    }

    async fn record(&self, op: &'static str, order_id: i64, fields: &OrderFields) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains_key(&fields.product_name) {
            panic!("order store blew up on {}", fields.product_name);
        }

        if !self.in_flight.lock().unwrap().insert(order_id) {
            self.overlap_detected.store(true, Ordering::SeqCst);
        }
        self.entered.notify_one();

        let result = self.apply(op, order_id, fields).await;

        self.in_flight.lock().unwrap().remove(&order_id);
        result
    }

    async fn apply(&self, op: &'static str, order_id: i64, fields: &OrderFields) -> Result<()> {
        let gate = self.gated.get(&order_id).map(|gate| gate.value().clone());
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }

        if self.poisoned.contains_key(&fields.product_name) {
            return Err(OrderPipelineError::Business(format!("rejected {}", fields.product_name)));
        }

        if let Some(mut remaining) = self.conflicts.get_mut(&fields.product_name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(OrderPipelineError::ConcurrentModification { order_id });
            }
        }

        self.calls.lock().unwrap().push(Call {
            op,
            order_id,
            product_name: fields.product_name.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl OrderService for RecordingOrderService {
    async fn apply_create(&self, order_id: i64, fields: &OrderFields) -> Result<()> {
        self.record("create", order_id, fields).await
    }

    async fn apply_update(&self, order_id: i64, fields: &OrderFields) -> Result<()> {
        self.record("update", order_id, fields).await
    }

    async fn apply_cancel(&self, order_id: i64, fields: &OrderFields) -> Result<()> {
        self.record("cancel", order_id, fields).await
    }
}

/// Metrics sink that keeps what the driver and applier reported
#[derive(Default)]
pub struct RecordingMetrics {
    successes: Mutex<Vec<(String, usize)>>,
    failures: Mutex<Vec<String>>,
    pub applied: AtomicU32,
    pub dropped: AtomicU32,
}

impl RecordingMetrics {
    pub fn successes(&self) -> Vec<(String, usize)> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_success(&self, _timer: MetricsTimer, topic: &str, payload_size: usize) {
        self.successes.lock().unwrap().push((topic.to_string(), payload_size));
    }

    fn record_failure(&self, _timer: MetricsTimer, topic: &str) {
        self.failures.lock().unwrap().push(topic.to_string());
    }

    fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::SeqCst);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
