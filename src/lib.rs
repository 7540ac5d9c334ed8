pub mod domain;
pub mod kafka;
pub mod error;
pub mod config;
pub mod config_parser;
pub mod retry;
pub mod metrics;
pub mod store;
pub mod stats;
pub mod pipeline;
pub mod shutdown;

pub use domain::*;
pub use error::*;
pub use self::config::*;
pub use config_parser::*;
pub use retry::*;
pub use metrics::*;
pub use store::*;
pub use stats::*;
pub use pipeline::*;
pub use shutdown::*;
pub use kafka::*;
