use crate::{Result, RetryPolicy, Topics};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ssl_ca_location: Option<String>,
    pub additional_properties: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            additional_properties: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub group_id: String,
    pub kafka: KafkaConfig,
    pub auto_offset_reset: Option<String>,
}

impl ServiceConfig {
    pub fn to_kafka_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config.set("bootstrap.servers", &self.kafka.bootstrap_servers);
        config.set("group.id", &self.group_id);
        config.set(
            "auto.offset.reset",
            self.auto_offset_reset.as_deref().unwrap_or("earliest"),
        );
        // Offsets are committed once a record has been handed to the sequencer
        config.set("enable.auto.commit", "false");

        if let Some(security_protocol) = &self.kafka.security_protocol {
            config.set("security.protocol", security_protocol);
        }

        if let Some(sasl_mechanism) = &self.kafka.sasl_mechanism {
            config.set("sasl.mechanism", sasl_mechanism);
        }

        if let Some(sasl_username) = &self.kafka.sasl_username {
            config.set("sasl.username", sasl_username);
        }

        if let Some(sasl_password) = &self.kafka.sasl_password {
            config.set("sasl.password", sasl_password);
        }

        if let Some(ssl_ca_location) = &self.kafka.ssl_ca_location {
            config.set("ssl.ca.location", ssl_ca_location);
        }

        // Add additional properties
        for (key, value) in &self.kafka.additional_properties {
            config.set(key, value);
        }

        config
    }
}

/// Tuning knobs for the consumption pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub topic: String,
    pub worker_count: usize,
    /// `None` keeps per-order queues unbounded.
    pub queue_capacity: Option<usize>,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Events drained from one key before it yields to other keys.
    pub drain_batch: usize,
    pub shutdown_grace_secs: u64,
    pub stats_sweep_interval_secs: u64,
    pub poll_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topic: Topics::ORDERS.to_string(),
            worker_count: 4,
            queue_capacity: None,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            drain_batch: 64,
            shutdown_grace_secs: 30,
            stats_sweep_interval_secs: 60,
            poll_timeout_ms: 100,
        }
    }
}

impl PipelineConfig {
    pub const ENV_PREFIX: &'static str = "ORDER_PIPELINE";

    /// Load from an optional TOML file, overridden by `ORDER_PIPELINE__*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let pipeline: PipelineConfig = settings.try_deserialize()?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(crate::OrderPipelineError::InvalidArgument(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(crate::OrderPipelineError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.drain_batch == 0 {
            return Err(crate::OrderPipelineError::InvalidArgument(
                "drain_batch must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(crate::OrderPipelineError::InvalidArgument(
                "queue_capacity must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delays(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn stats_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stats_sweep_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
