use prometheus::{
    register_counter_with_registry, register_gauge_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, Encoder,
    Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::Result;

/// Handle returned by [`MetricsSink::start_timer`]
#[derive(Debug, Clone, Copy)]
pub struct MetricsTimer {
    started: Instant,
}

impl MetricsTimer {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Where the consumption pipeline reports timing and throughput
pub trait MetricsSink: Send + Sync {
    fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::start()
    }

    fn record_success(&self, timer: MetricsTimer, topic: &str, payload_size: usize);

    fn record_failure(&self, timer: MetricsTimer, topic: &str);

    fn record_applied(&self) {}

    fn record_dropped(&self) {}

    fn record_retry(&self) {}

    fn set_active_keys(&self, _count: usize) {}
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_success(&self, _timer: MetricsTimer, _topic: &str, _payload_size: usize) {}

    fn record_failure(&self, _timer: MetricsTimer, _topic: &str) {}
}

/// Prometheus-backed metrics for the order consumer
#[derive(Clone)]
pub struct ConsumerMetrics {
    registry: Arc<Registry>,

    // Intake metrics
    pub processing_time_global: Histogram,
    pub processing_time_success: HistogramVec,
    pub messages_total: Counter,
    pub message_size_bytes: Histogram,
    pub messages_failed: Counter,

    // Sequencer metrics
    pub events_applied: Counter,
    pub events_dropped: Counter,
    pub apply_retries: Counter,
    pub active_keys: Gauge,
}

impl ConsumerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let processing_time_global = register_histogram_with_registry!(
            HistogramOpts::new(
                "kafka_consumer_processing_time_global_seconds",
                "Total message processing time"
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            registry
        )?;

        let processing_time_success = register_histogram_vec_with_registry!(
            HistogramOpts::new(
                "kafka_consumer_processing_time_success_seconds",
                "Processing time of successfully handled messages"
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["topic"],
            registry
        )?;

        let messages_total = register_counter_with_registry!(
            Opts::new("kafka_consumer_messages_total", "Total consumed messages count"),
            registry
        )?;

        let message_size_bytes = register_histogram_with_registry!(
            HistogramOpts::new("kafka_consumer_message_size_bytes", "Message size distribution")
                .buckets(vec![64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0]),
            registry
        )?;

        let messages_failed = register_counter_with_registry!(
            Opts::new("kafka_consumer_messages_failed_total", "Messages that could not be handed off"),
            registry
        )?;

        let events_applied = register_counter_with_registry!(
            Opts::new("order_events_applied_total", "Order events applied to the order store"),
            registry
        )?;

        let events_dropped = register_counter_with_registry!(
            Opts::new("order_events_dropped_total", "Order events dropped after a failed apply"),
            registry
        )?;

        let apply_retries = register_counter_with_registry!(
            Opts::new("order_apply_retries_total", "Retries caused by concurrent modification"),
            registry
        )?;

        let active_keys = register_gauge_with_registry!(
            Opts::new("order_sequencer_active_keys", "Orders with a live per-key queue"),
            registry
        )?;

        Ok(Self {
            registry,
            processing_time_global,
            processing_time_success,
            messages_total,
            message_size_bytes,
            messages_failed,
            events_applied,
            events_dropped,
            apply_retries,
            active_keys,
        })
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsSink for ConsumerMetrics {
    fn record_success(&self, timer: MetricsTimer, topic: &str, payload_size: usize) {
        let elapsed = timer.elapsed().as_secs_f64();
        self.processing_time_success
            .with_label_values(&[topic])
            .observe(elapsed);
        self.processing_time_global.observe(elapsed);
        self.messages_total.inc();
        self.message_size_bytes.observe(payload_size as f64);
    }

    fn record_failure(&self, timer: MetricsTimer, _topic: &str) {
        self.processing_time_global.observe(timer.elapsed().as_secs_f64());
        self.messages_total.inc();
        self.messages_failed.inc();
    }

    fn record_applied(&self) {
        self.events_applied.inc();
    }

    fn record_dropped(&self) {
        self.events_dropped.inc();
    }

    fn record_retry(&self) {
        self.apply_retries.inc();
    }

    fn set_active_keys(&self, count: usize) {
        self.active_keys.set(count as f64);
    }
}
