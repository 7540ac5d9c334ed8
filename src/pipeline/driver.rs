use crate::pipeline::{DrainReport, Sequencer};
use crate::{
    ConsumerRecord, MetricsSink, OrderEvent, OrderPipelineError, PipelineConfig, RecordSource,
    Result, StatsAggregator,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pulls records off the transport and hands them to the sequencer
pub struct ConsumptionDriver {
    sequencer: Arc<Sequencer>,
    stats: Arc<StatsAggregator>,
    metrics: Arc<dyn MetricsSink>,
    poll_timeout: Duration,
    shutdown_grace: Duration,
}

impl ConsumptionDriver {
    pub fn new(
        config: &PipelineConfig,
        sequencer: Arc<Sequencer>,
        stats: Arc<StatsAggregator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            sequencer,
            stats,
            metrics,
            poll_timeout: config.poll_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub fn sequencer(&self) -> &Arc<Sequencer> {
        &self.sequencer
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Consume until a shutdown signal arrives or the transport goes away.
    ///
    /// Per-record failures are logged and never end the loop.
    pub async fn run<S>(&self, source: &S, mut shutdown: broadcast::Receiver<()>) -> Result<()>
    where
        S: RecordSource + ?Sized,
    {
        info!("Order consumption driver is running...");

        loop {
            tokio::select! {
                // Handle shutdown signal
                _ = shutdown.recv() => {
                    info!("Received shutdown signal, stopping intake");
                    break;
                }

                // Process records
                received = source.recv_record(self.poll_timeout) => {
                    match received {
                        Ok(Some(record)) => self.process(source, &record).await,
                        Ok(None) => continue,
                        Err(OrderPipelineError::TransportInterrupted) => {
                            info!("Transport interrupted, stopping intake");
                            break;
                        }
                        Err(e) => {
                            error!("Error receiving record: {}", e);
                            sleep(self.poll_timeout).await;
                        }
                    }
                }
            }
        }

        info!("Order consumption driver stopped");
        Ok(())
    }

    async fn process<S>(&self, source: &S, record: &ConsumerRecord)
    where
        S: RecordSource + ?Sized,
    {
        match self.handle_record(record).await {
            Ok(()) => {}
            // Not handed off; leave the offset for the next run
            Err(OrderPipelineError::ShuttingDown) => return,
            Err(e) => {
                error!(
                    "Failed to hand off record {}/{}@{}: {}",
                    record.topic, record.partition, record.offset, e
                );
            }
        }

        if let Err(e) = source.commit_record(record) {
            error!("Error committing record: {}", e);
        }
    }

    /// Hand one record to the pipeline and record its timing
    pub async fn handle_record(&self, record: &ConsumerRecord) -> Result<()> {
        let timer = self.metrics.start_timer();

        match self.hand_off(record).await {
            Ok(()) => {
                self.metrics.record_success(timer, &record.topic, record.payload_size());
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure(timer, &record.topic);
                Err(e)
            }
        }
    }

    /// Stop intake and wait for in-flight drains
    pub async fn shutdown(&self) -> DrainReport {
        self.sequencer.shutdown(self.shutdown_grace).await
    }

    async fn hand_off(&self, record: &ConsumerRecord) -> Result<()> {
        match &record.key {
            Some(producer_id) => {
                if let Err(e) = self.stats.record_call(producer_id, &record.topic).await {
                    warn!(
                        "Failed to record producer call for {} on {}: {}",
                        producer_id, record.topic, e
                    );
                }
            }
            None => debug!(
                "Record {}/{}@{} has no producer key; skipping stats",
                record.topic, record.partition, record.offset
            ),
        }

        let mut event: OrderEvent = record.deserialize_value()?;
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now().naive_utc());
        }

        let order_id = event.order_id();
        debug!(
            "Received order event {} ({}) for order {} from {}/{}@{}",
            event.event_id, event.event_type, order_id, record.topic, record.partition, record.offset
        );

        self.sequencer.enqueue(order_id, event)
    }
}
