use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Call counter row for one (producer, topic) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProducerStats {
    pub producer_id: String,
    pub topic_name: String,
    pub call_count: i64,
    pub last_call_time: DateTime<Utc>,
}

impl ProducerStats {
    pub fn first_call(producer_id: &str, topic_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            producer_id: producer_id.to_string(),
            topic_name: topic_name.to_string(),
            call_count: 1,
            last_call_time: now,
        }
    }
}
