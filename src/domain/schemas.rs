// Kafka topic definitions
pub struct Topics;

impl Topics {
    pub const ORDERS: &'static str = "orders";
}

// Stats key used for the per-pair locks
pub fn producer_topic_key(producer_id: &str, topic_name: &str) -> (String, String) {
    (producer_id.to_string(), topic_name.to_string())
}
