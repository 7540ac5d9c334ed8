pub mod order;
pub mod stats;
pub mod schemas;

pub use order::*;
pub use stats::*;
pub use schemas::*;
