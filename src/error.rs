use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderPipelineError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Concurrent modification of order {order_id}")]
    ConcurrentModification { order_id: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Business rule violated: {0}")]
    Business(String),

    #[error("Order queue overflow for order {order_id} (capacity {capacity})")]
    QueueOverflow { order_id: i64, capacity: usize },

    #[error("Order service panicked: {0}")]
    ApplyPanicked(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Transport interrupted")]
    TransportInterrupted,

    #[error("Pipeline is shutting down")]
    ShuttingDown,

    #[error("Shutdown incomplete: {0}")]
    Shutdown(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl OrderPipelineError {
    /// Only optimistic-locking conflicts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

pub type Result<T> = std::result::Result<T, OrderPipelineError>;
