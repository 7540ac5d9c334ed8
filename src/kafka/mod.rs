pub mod consumer;
pub mod channel;

pub use consumer::*;
pub use channel::*;
