use crate::{OrderPipelineError, Result};
use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, TopicPartitionList};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;

/// Anything that can hand the driver inbound records
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// `Ok(None)` means nothing arrived within `timeout_duration`.
    async fn recv_record(&self, timeout_duration: Duration) -> Result<Option<ConsumerRecord>>;

    fn commit_record(&self, record: &ConsumerRecord) -> Result<()>;
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let consumer: StreamConsumer = config.create()?;
        Ok(Self { consumer })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.consumer.subscribe(topics)?;
        Ok(())
    }
}

#[async_trait]
impl RecordSource for KafkaConsumer {
    async fn recv_record(&self, timeout_duration: Duration) -> Result<Option<ConsumerRecord>> {
        match timeout(timeout_duration, self.consumer.recv()).await {
            Ok(received) => Ok(Some(ConsumerRecord::from_message(&received?))),
            Err(_) => Ok(None),
        }
    }

    fn commit_record(&self, record: &ConsumerRecord) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&record.topic, record.partition, rdkafka::Offset::Offset(record.offset + 1))?;
        self.consumer.commit(&tpl, rdkafka::consumer::CommitMode::Async)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<String>,
}

impl ConsumerRecord {
    pub fn new(topic: &str, partition: i32, offset: i64, key: Option<&str>, payload: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.map(str::to_string),
            payload,
        }
    }

    fn from_message<M: Message>(message: &M) -> Self {
        let lossy = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(lossy),
            payload: message.payload().map(lossy),
        }
    }

    pub fn deserialize_value<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match &self.payload {
            Some(payload) => {
                let value = serde_json::from_str(payload)?;
                Ok(value)
            }
            None => Err(OrderPipelineError::InvalidArgument("Empty message payload".to_string())),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload.as_ref().map_or(0, String::len)
    }
}
