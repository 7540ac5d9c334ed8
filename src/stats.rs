//! Per-(producer, topic) call counting.
//!
//! Each pair gets its own async mutex so two records from the same producer
//! never both read count N and write N + 1, while unrelated pairs never
//! contend. Locks are dropped from the map as soon as nobody holds them.

use crate::{producer_topic_key, ProducerStats, ProducerStatsRepository, Result};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type PairKey = (String, String);

pub struct StatsAggregator {
    repository: Arc<dyn ProducerStatsRepository>,
    locks: DashMap<PairKey, Arc<Mutex<()>>>,
}

impl StatsAggregator {
    pub fn new(repository: Arc<dyn ProducerStatsRepository>) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
        }
    }

    /// Count one call for the pair, creating its row on first sight
    pub async fn record_call(&self, producer_id: &str, topic_name: &str) -> Result<()> {
        let key = producer_topic_key(producer_id, topic_name);
        let lock = self.lock_for(&key);

        let result = {
            let _guard = lock.lock().await;
            self.apply_call(producer_id, topic_name).await
        };

        drop(lock);
        self.release(&key);
        result
    }

    pub async fn find_all(&self) -> Result<Vec<ProducerStats>> {
        self.repository.find_all().await
    }

    /// Number of per-pair locks currently held in the map
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Drop every lock nobody is holding or waiting on. Returns how many went.
    pub fn sweep_idle_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_idle_locks();
                        if removed > 0 {
                            debug!("Reclaimed {} idle producer stats locks", removed);
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Stats lock sweeper stopped");
                        break;
                    }
                }
            }
        })
    }

    async fn apply_call(&self, producer_id: &str, topic_name: &str) -> Result<()> {
        let now = Utc::now();
        match self.repository.find(producer_id, topic_name).await? {
            Some(_) => self.repository.increment(producer_id, topic_name, now).await,
            None => {
                debug!("First call from producer {} on topic {}", producer_id, topic_name);
                self.repository
                    .insert(ProducerStats::first_call(producer_id, topic_name, now))
                    .await
            }
        }
    }

    // Cloning happens under the shard lock, so a count of 1 seen under the
    // same lock means no caller holds or is about to hold this mutex.
    fn lock_for(&self, key: &PairKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &PairKey) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
