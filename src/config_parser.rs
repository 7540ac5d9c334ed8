use crate::{KafkaConfig, OrderPipelineError, Result, ServiceConfig};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn read_properties(path: &Path, what: &str) -> Result<HashMap<String, String>> {
    let file = File::open(path).map_err(|e| {
        OrderPipelineError::InvalidArgument(format!("Failed to open {} file {:?}: {}", what, path, e))
    })?;

    let reader = BufReader::new(file);
    java_properties::read(reader)
        .map_err(|e| OrderPipelineError::InvalidArgument(format!("Failed to parse {}: {}", what, e)))
}

/// Parse Java properties file into ServiceConfig
pub fn parse_properties_file<P: AsRef<Path>>(path: P, default_group_id: &str) -> Result<ServiceConfig> {
    let properties = read_properties(path.as_ref(), "config")?;

    let mut kafka_config = KafkaConfig::default();
    let mut additional_properties = HashMap::new();
    let mut group_id = default_group_id.to_string();
    let mut auto_offset_reset = None;

    for (key, value) in properties {
        match key.as_str() {
            "bootstrap.servers" => kafka_config.bootstrap_servers = value,
            "group.id" => group_id = value,
            "auto.offset.reset" => auto_offset_reset = Some(value),
            "security.protocol" => kafka_config.security_protocol = Some(value),
            "sasl.mechanism" => kafka_config.sasl_mechanism = Some(value),
            "sasl.username" => kafka_config.sasl_username = Some(value),
            "sasl.password" => kafka_config.sasl_password = Some(value),
            "ssl.ca.location" => kafka_config.ssl_ca_location = Some(value),
            _ => {
                additional_properties.insert(key, value);
            }
        }
    }

    kafka_config.additional_properties = additional_properties;

    Ok(ServiceConfig {
        group_id,
        kafka: kafka_config,
        auto_offset_reset,
    })
}

/// Parse consumer-specific properties file and merge with base config
pub fn merge_consumer_properties<P: AsRef<Path>>(mut config: ServiceConfig, path: P) -> Result<ServiceConfig> {
    let properties = read_properties(path.as_ref(), "consumer properties")?;

    for (key, value) in properties {
        config.kafka.additional_properties.insert(key, value);
    }

    Ok(config)
}
