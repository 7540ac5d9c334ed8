use crate::store::StateStore;
use crate::{ProducerStats, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage for per-(producer, topic) call counters.
///
/// `find` followed by `insert` is not atomic; callers serialise per pair.
#[async_trait]
pub trait ProducerStatsRepository: Send + Sync {
    async fn find(&self, producer_id: &str, topic_name: &str) -> Result<Option<ProducerStats>>;

    async fn increment(&self, producer_id: &str, topic_name: &str, now: DateTime<Utc>) -> Result<()>;

    async fn insert(&self, stats: ProducerStats) -> Result<()>;

    async fn find_all(&self) -> Result<Vec<ProducerStats>>;
}

#[derive(Clone, Default)]
pub struct InMemoryProducerStatsRepository {
    rows: StateStore<(String, String), ProducerStats>,
}

impl InMemoryProducerStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProducerStatsRepository for InMemoryProducerStatsRepository {
    async fn find(&self, producer_id: &str, topic_name: &str) -> Result<Option<ProducerStats>> {
        Ok(self.rows.get(&(producer_id.to_string(), topic_name.to_string())))
    }

    async fn increment(&self, producer_id: &str, topic_name: &str, now: DateTime<Utc>) -> Result<()> {
        self.rows.update(&(producer_id.to_string(), topic_name.to_string()), |stats| {
            stats.call_count += 1;
            stats.last_call_time = now;
        });
        Ok(())
    }

    async fn insert(&self, stats: ProducerStats) -> Result<()> {
        // Plain save: overwrites whatever row is there
        self.rows.put((stats.producer_id.clone(), stats.topic_name.clone()), stats);
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<ProducerStats>> {
        Ok(self.rows.values())
    }
}
