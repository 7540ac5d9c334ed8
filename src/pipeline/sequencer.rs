//! Per-order sequencing on a fixed worker pool.
//!
//! Events sharing an order id are applied one at a time in arrival order;
//! different orders drain in parallel on up to `worker_count` tasks. A key is
//! put on the ready queue when its queue is created and again whenever a drain
//! yields after `drain_batch` events, so no key ever owns a task of its own.

use crate::pipeline::{AbandonedQueue, ApplyOutcome, EventApplier, KeyQueueRegistry, Pushed};
use crate::{MetricsSink, OrderEvent, OrderPipelineError, OrderService, PipelineConfig, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of [`Sequencer::shutdown`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Every per-key queue emptied before the deadline.
    pub drained: bool,
    /// Keys still holding a queue when the workers were stopped.
    pub abandoned: Vec<AbandonedQueue>,
}

struct SequencerInner {
    registry: KeyQueueRegistry,
    applier: EventApplier,
    metrics: Arc<dyn MetricsSink>,
    ready_tx: mpsc::UnboundedSender<i64>,
    drain_batch: usize,
    accepting: AtomicBool,
    idle: Notify,
}

pub struct Sequencer {
    inner: Arc<SequencerInner>,
    stop_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Sequencer {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(
        config: &PipelineConfig,
        service: Arc<dyn OrderService>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let inner = Arc::new(SequencerInner {
            registry: KeyQueueRegistry::new(config.queue_capacity),
            applier: EventApplier::new(service, config.retry_policy(), Arc::clone(&metrics)),
            metrics,
            ready_tx,
            drain_batch: config.drain_batch.max(1),
            accepting: AtomicBool::new(true),
            idle: Notify::new(),
        });

        let ready_rx = Arc::new(AsyncMutex::new(ready_rx));
        let worker_count = config.worker_count.max(1);
        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&inner),
                    Arc::clone(&ready_rx),
                    stop_rx.clone(),
                ))
            })
            .collect();

        info!("Order sequencer started with {} workers", worker_count);

        Self {
            inner,
            stop_tx,
            workers: Mutex::new(workers),
        }
    }

    /// Queue `event` behind earlier events for `key`.
    ///
    /// Never waits. Fails with `QueueOverflow` when a bounded queue is full and
    /// with `ShuttingDown` once intake has stopped.
    pub fn enqueue(&self, key: i64, event: OrderEvent) -> Result<()> {
        if !self.inner.accepting.load(Ordering::Acquire) {
            return Err(OrderPipelineError::ShuttingDown);
        }

        let event_id = event.event_id.clone();
        match self.inner.registry.push(key, event)? {
            Pushed::NewQueue => {
                self.inner.schedule(key);
                self.inner.metrics.set_active_keys(self.inner.registry.active_keys());
            }
            Pushed::Appended => {}
        }

        debug!("Queued order event {} for order {}", event_id, key);
        Ok(())
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Keys that currently own a queue
    pub fn active_keys(&self) -> usize {
        self.inner.registry.active_keys()
    }

    pub fn pending_events(&self, key: i64) -> usize {
        self.inner.registry.pending_events(key)
    }

    /// Resolves once no key owns a queue
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.registry.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Stop intake, let drains finish for up to `grace`, then stop the pool.
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.inner.accepting.store(false, Ordering::Release);
        info!(
            "Order sequencer stopping intake; waiting up to {:?} for {} active orders",
            grace,
            self.inner.registry.active_keys()
        );

        let deadline = Instant::now() + grace;
        let drained = tokio::time::timeout_at(deadline, self.wait_idle()).await.is_ok();

        let _ = self.stop_tx.send(true);
        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for worker in workers {
            if drained {
                if let Err(e) = worker.await {
                    if !e.is_cancelled() {
                        error!("Order sequencer worker failed: {}", e);
                    }
                }
            } else {
                worker.abort();
            }
        }

        // An enqueue racing the intake switch can still leave a queue behind
        let abandoned = self.inner.registry.snapshot();
        let drained = drained && abandoned.is_empty();
        if drained {
            info!("Order sequencer drained all queues");
        } else {
            error!(
                "Shutdown grace period elapsed with {} orders still queued; abandoning them",
                abandoned.len()
            );
            for queue in &abandoned {
                error!(
                    "Abandoned drain for order {} with {} unapplied event(s) (in flight: {}, queued: {})",
                    queue.order_id,
                    queue.unapplied(),
                    queue.in_flight.as_deref().unwrap_or("none"),
                    queue.pending
                );
            }
        }

        DrainReport { drained, abandoned }
    }
}

impl SequencerInner {
    fn schedule(&self, key: i64) {
        // The receiver lives as long as `Sequencer`, which owns the workers.
        if self.ready_tx.send(key).is_err() {
            warn!("Order sequencer ready queue closed; order {} not scheduled", key);
        }
    }

    async fn drain(&self, key: i64) {
        for _ in 0..self.drain_batch {
            let Some(event) = self.registry.pop_or_remove(key) else {
                self.metrics.set_active_keys(self.registry.active_keys());
                if self.registry.is_empty() {
                    self.idle.notify_waiters();
                }
                return;
            };

            let outcome = self.applier.apply(&event).await;
            self.registry.settle(key);
            if let ApplyOutcome::Dropped(_) = outcome {
                debug!("Continuing with order {} after dropped event {}", key, event.event_id);
            }
        }

        // Give other orders a turn; the entry is still ours so re-queueing keeps one drain per key
        self.schedule(key);
    }
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<SequencerInner>,
    ready_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<i64>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("Order sequencer worker {} started", worker_id);

    loop {
        let next = tokio::select! {
            key = async { ready_rx.lock().await.recv().await } => key,
            // Also fires when the `Sequencer` is dropped with the sender
            _ = stop_rx.changed() => None,
        };

        match next {
            Some(key) => inner.drain(key).await,
            None => break,
        }
    }

    debug!("Order sequencer worker {} stopped", worker_id);
}
