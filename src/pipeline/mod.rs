pub mod registry;
pub mod dispatch;
pub mod sequencer;
pub mod driver;

pub use registry::*;
pub use dispatch::*;
pub use sequencer::*;
pub use driver::*;
