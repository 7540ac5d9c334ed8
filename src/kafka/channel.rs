use crate::{ConsumerRecord, OrderPipelineError, RecordSource, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// In-process record source fed through an mpsc channel.
///
/// Dropping every [`mpsc::Sender`] ends the stream with
/// [`OrderPipelineError::TransportInterrupted`].
pub struct ChannelRecordSource {
    receiver: Mutex<mpsc::Receiver<ConsumerRecord>>,
    committed: DashMap<(String, i32), i64>,
}

impl ChannelRecordSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<ConsumerRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let source = Self {
            receiver: Mutex::new(rx),
            committed: DashMap::new(),
        };
        (tx, source)
    }

    /// Next offset to read for a partition, as committed so far
    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.committed
            .get(&(topic.to_string(), partition))
            .map(|entry| *entry.value())
    }
}

#[async_trait]
impl RecordSource for ChannelRecordSource {
    async fn recv_record(&self, timeout_duration: Duration) -> Result<Option<ConsumerRecord>> {
        let mut receiver = self.receiver.lock().await;
        match timeout(timeout_duration, receiver.recv()).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => Err(OrderPipelineError::TransportInterrupted),
            Err(_) => Ok(None),
        }
    }

    fn commit_record(&self, record: &ConsumerRecord) -> Result<()> {
        let next = record.offset + 1;
        self.committed
            .entry((record.topic.clone(), record.partition))
            .and_modify(|offset| *offset = (*offset).max(next))
            .or_insert(next);
        Ok(())
    }
}
