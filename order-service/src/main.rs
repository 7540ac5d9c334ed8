use clap::Parser;
use order_pipeline::{PipelineConfig, ServiceConfig};
use std::path::{Path, PathBuf};
use tracing::info;

mod service;

use service::OrderConsumerService;

#[derive(Parser, Debug)]
#[command(name = "order-service")]
#[command(about = "Consumes order lifecycle events and applies them per order")]
struct Args {
    /// Kafka client properties file
    #[arg(short = 'c', long = "config", default_value = "client.dev.properties")]
    config: PathBuf,

    /// Extra consumer properties merged over the client config
    #[arg(long = "consumer-config")]
    consumer_config: Option<PathBuf>,

    /// Pipeline tuning file (TOML); ORDER_PIPELINE__* env vars override it
    #[arg(short = 'p', long = "pipeline-config")]
    pipeline_config: Option<PathBuf>,

    /// Port for the /metrics and /health endpoints
    #[arg(short = 'm', long = "metrics-port", default_value = "9102")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    info!("Starting Order Service");
    info!("Config file: {:?}", args.config);

    // Load configuration
    let mut config = load_config(&args.config)?;

    if let Some(consumer_config_path) = args.consumer_config {
        info!("Loading consumer config from: {:?}", consumer_config_path);
        config = order_pipeline::merge_consumer_properties(config, consumer_config_path)?;
    }

    let pipeline = PipelineConfig::load(args.pipeline_config.as_deref())?;
    info!("Pipeline config: {:?}", pipeline);

    let service = OrderConsumerService::new(config, pipeline).await?;
    service.run(args.metrics_port).await?;

    Ok(())
}

fn load_config(config_path: &Path) -> order_pipeline::Result<ServiceConfig> {
    use order_pipeline::parse_properties_file;

    // Parse the Java properties file
    parse_properties_file(config_path, "order-group")
}
